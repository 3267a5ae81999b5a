use hashbrown::HashMap;

use crate::error::{LogicError, SymbolKind};
use crate::lexer::{parse_macro_header, tokenize, Token, TokenKind};
use crate::{Expr, Game, SettingKey, Symbols};

/// Bound on nested macro expansions; cyclic macro definitions hit this
/// instead of looping.
pub const MAX_MACRO_DEPTH: usize = 32;

#[derive(Clone, Debug)]
pub struct Macro {
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
}

// Token stream over one piece of text. Argument lists are parsed through a
// sub-cursor over a slice of the same tokens, so offsets stay relative to `text`.
struct Cursor<'t> {
    text: &'t str,
    tokens: &'t [Token],
    pos: usize,
    end_offset: usize,
    depth: usize,
}

static EOF_KIND: TokenKind = TokenKind::Eof;

impl<'t> Cursor<'t> {
    fn peek(&self) -> &TokenKind {
        match self.tokens.get(self.pos) {
            Some(tok) => &tok.kind,
            None => &EOF_KIND,
        }
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        match self.tokens.get(self.pos + n) {
            Some(tok) => &tok.kind,
            None => &EOF_KIND,
        }
    }

    fn offset(&self) -> usize {
        match self.tokens.get(self.pos) {
            Some(tok) => tok.offset,
            None => self.end_offset,
        }
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn error(&self, message: impl Into<String>) -> LogicError {
        let len = self.tokens.get(self.pos).map(|t| t.len).unwrap_or(0);
        LogicError::syntax(self.text, self.offset(), len, message)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), LogicError> {
        if *self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_end(&self) -> Result<(), LogicError> {
        match self.peek() {
            TokenKind::Eof => Ok(()),
            _ => Err(self.error("unexpected trailing input")),
        }
    }

    fn sub(&self, tokens: &'t [Token]) -> Cursor<'t> {
        let end_offset = tokens.last().map(|t| t.end()).unwrap_or(self.offset());
        Cursor {
            text: self.text,
            tokens,
            pos: 0,
            end_offset,
            depth: self.depth,
        }
    }

    // With the cursor on '(', consume a parenthesized argument list and return
    // the token slice of each argument. `f()` yields no arguments.
    fn take_args(&mut self) -> Result<Vec<&'t [Token]>, LogicError> {
        self.expect(TokenKind::LParen, "'('")?;
        let tokens = self.tokens;
        let mut args: Vec<&'t [Token]> = vec![];
        let mut start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return Err(self.error("unclosed argument list")),
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth > 0 => depth -= 1,
                TokenKind::RParen | TokenKind::Comma if depth == 0 => {
                    let closing = *self.peek() == TokenKind::RParen;
                    if self.pos == start {
                        if !(closing && args.is_empty()) {
                            return Err(self.error("empty argument"));
                        }
                    } else {
                        args.push(&tokens[start..self.pos]);
                    }
                    self.advance();
                    if closing {
                        return Ok(args);
                    }
                    start = self.pos;
                    continue;
                }
                _ => {}
            }
            self.advance();
        }
    }
}

fn arg_text<'a>(text: &'a str, arg: &[Token]) -> &'a str {
    match (arg.first(), arg.last()) {
        (Some(first), Some(last)) => &text[first.offset..last.end()],
        _ => "",
    }
}

/// Compiles requirement strings of one game into `Expr` trees, expanding
/// that game's macros along the way.
pub struct ExprParser<'a> {
    game: Game,
    macros: HashMap<String, Macro>,
    symbols: &'a mut Symbols,
}

impl<'a> ExprParser<'a> {
    pub fn new(game: Game, symbols: &'a mut Symbols) -> Self {
        Self {
            game,
            macros: HashMap::new(),
            symbols,
        }
    }

    pub fn game(&self) -> Game {
        self.game
    }

    pub fn symbols_mut(&mut self) -> &mut Symbols {
        self.symbols
    }

    pub fn add_macro(&mut self, name: &str, params: Vec<String>, body: &str) -> Result<(), LogicError> {
        if self.macros.contains_key(name) {
            return Err(LogicError::DuplicateMacro(name.to_string()));
        }
        self.macros.insert(
            name.to_string(),
            Macro {
                name: name.to_string(),
                params,
                body: body.to_string(),
            },
        );
        Ok(())
    }

    /// Register a macro from a declaration header such as `can_use(item)`.
    pub fn add_macro_decl(&mut self, header: &str, body: &str) -> Result<(), LogicError> {
        let (name, params) = parse_macro_header(header)?;
        self.add_macro(&name, params, body)
    }

    pub fn parse(&mut self, text: &str) -> Result<Expr, LogicError> {
        self.parse_at_depth(text, 0)
    }

    fn parse_at_depth(&mut self, text: &str, depth: usize) -> Result<Expr, LogicError> {
        let tokens = tokenize(text)?;
        let mut c = Cursor {
            text,
            tokens: &tokens,
            pos: 0,
            end_offset: text.len(),
            depth,
        };
        let expr = self.parse_or(&mut c)?;
        c.expect_end()?;
        Ok(expr)
    }

    fn parse_or(&mut self, c: &mut Cursor) -> Result<Expr, LogicError> {
        let mut terms = vec![self.parse_and(c)?];
        while *c.peek() == TokenKind::Or {
            c.advance();
            terms.push(self.parse_and(c)?);
        }
        Ok(Expr::make_or(terms))
    }

    fn parse_and(&mut self, c: &mut Cursor) -> Result<Expr, LogicError> {
        let mut terms = vec![self.parse_unary(c)?];
        while *c.peek() == TokenKind::And {
            c.advance();
            terms.push(self.parse_unary(c)?);
        }
        Ok(Expr::make_and(terms))
    }

    fn parse_unary(&mut self, c: &mut Cursor) -> Result<Expr, LogicError> {
        if *c.peek() == TokenKind::Not {
            c.advance();
            return Ok(Expr::make_not(self.parse_unary(c)?));
        }
        self.parse_primary(c)
    }

    fn parse_primary(&mut self, c: &mut Cursor) -> Result<Expr, LogicError> {
        match c.peek().clone() {
            TokenKind::LParen => {
                c.advance();
                let expr = self.parse_or(c)?;
                c.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::Ident(name) => {
                let name_offset = c.offset();
                let call = *c.peek_at(1) == TokenKind::LParen;
                if call {
                    c.advance();
                    return self.parse_call(c, &name, name_offset);
                }
                if name == "true" || name == "false" {
                    c.advance();
                    return Ok(Expr::Const(name == "true"));
                }
                if let Some(m) = self.macros.get(&name) {
                    if !m.params.is_empty() {
                        return Err(c.error(format!(
                            "macro '{}' expects {} argument(s)",
                            name,
                            m.params.len()
                        )));
                    }
                    c.advance();
                    return self.expand_macro(c, &name, name_offset, &[]);
                }
                c.advance();
                Ok(Expr::HasItem(self.item_id(&name), 1))
            }
            TokenKind::Eof => Err(c.error("unexpected end of input")),
            _ => Err(c.error("unexpected token")),
        }
    }

    // The cursor is on the '(' following `name`.
    fn parse_call(
        &mut self,
        c: &mut Cursor,
        name: &str,
        name_offset: usize,
    ) -> Result<Expr, LogicError> {
        let call_offset = c.offset();
        let args = c.take_args()?;
        let texts: Vec<(&str, usize)> = args.iter().map(|a| (arg_text(c.text, a), a.len())).collect();
        if self.macros.contains_key(name) {
            return self.expand_macro(c, name, name_offset, &texts);
        }
        let arity_error = |expected: &str| {
            LogicError::syntax(
                c.text,
                call_offset,
                1,
                format!("'{name}' expects {expected} argument(s), got {}", args.len()),
            )
        };
        match name {
            "has" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(arity_error("1 or 2"));
                }
                let item = self.single_ident(c, args[0])?;
                let count = if args.len() == 2 {
                    self.single_number(c, args[1])?
                } else {
                    1
                };
                if count == 0 {
                    return Err(c.sub(args[1]).error("item count must be at least 1"));
                }
                Ok(Expr::HasItem(self.item_id(&item), count))
            }
            "event" => {
                if args.len() != 1 {
                    return Err(arity_error("1"));
                }
                let event = self.single_ident(c, args[0])?;
                let event_name = self.game.namespaced(&event, '_');
                Ok(Expr::HasEvent(self.symbols.event_isv.add(&event_name)))
            }
            "setting" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(arity_error("1 or 2"));
                }
                let name = self.single_ident(c, args[0])?;
                let value = if args.len() == 2 {
                    Some(arg_text(c.text, args[1]).to_string())
                } else {
                    None
                };
                if args.len() == 2 && args[1].len() != 1 {
                    return Err(c.sub(args[1]).error("expected a single setting value"));
                }
                let key = SettingKey { name, value };
                Ok(Expr::Setting(self.symbols.setting_isv.add(&key)))
            }
            "at_least" => {
                if args.len() < 2 {
                    return Err(arity_error("2 or more"));
                }
                let count = self.single_number(c, args[0])?;
                let mut exprs: Vec<Expr> = vec![];
                for arg in &args[1..] {
                    let mut sub = c.sub(arg);
                    exprs.push(self.parse_or(&mut sub)?);
                    sub.expect_end()?;
                }
                Ok(Expr::make_at_least(count, exprs))
            }
            _ => Err(LogicError::UnknownSymbol {
                kind: SymbolKind::Function,
                name: name.to_string(),
            }),
        }
    }

    fn single_ident(&self, c: &Cursor, arg: &[Token]) -> Result<String, LogicError> {
        match arg {
            [Token {
                kind: TokenKind::Ident(name),
                ..
            }] => Ok(name.clone()),
            _ => Err(c.sub(arg).error("expected a single identifier")),
        }
    }

    fn single_number(&self, c: &Cursor, arg: &[Token]) -> Result<u32, LogicError> {
        match arg {
            [Token {
                kind: TokenKind::Number(n),
                ..
            }] => Ok(*n),
            _ => Err(c.sub(arg).error("expected a number")),
        }
    }

    fn item_id(&mut self, name: &str) -> usize {
        let item_name = self.game.namespaced(name, '_');
        self.symbols.item_isv.add(&item_name)
    }

    // Substitute argument texts for parameter tokens in the macro body, then
    // parse the result one level deeper. Syntax errors inside the expansion
    // are reported at the macro name in the caller's text.
    fn expand_macro(
        &mut self,
        c: &Cursor,
        name: &str,
        name_offset: usize,
        args: &[(&str, usize)],
    ) -> Result<Expr, LogicError> {
        let at_call_site = |e: LogicError| match e {
            LogicError::Syntax { message, .. } => LogicError::syntax(
                c.text,
                name_offset,
                name.len(),
                format!("in macro '{name}': {message}"),
            ),
            e => e,
        };
        let depth = c.depth + 1;
        if depth > MAX_MACRO_DEPTH {
            return Err(LogicError::RecursiveMacro {
                name: name.to_string(),
                depth: MAX_MACRO_DEPTH,
            });
        }
        let (params, body) = match self.macros.get(name) {
            Some(m) => (m.params.clone(), m.body.clone()),
            None => {
                return Err(LogicError::UnknownSymbol {
                    kind: SymbolKind::Function,
                    name: name.to_string(),
                });
            }
        };
        if params.len() != args.len() {
            return Err(LogicError::syntax(
                c.text,
                name_offset,
                name.len(),
                format!(
                    "macro '{}' expects {} argument(s), got {}",
                    name,
                    params.len(),
                    args.len()
                ),
            ));
        }
        let body_tokens = tokenize(&body).map_err(at_call_site)?;
        let mut pieces: Vec<String> = vec![];
        for tok in &body_tokens {
            if tok.kind == TokenKind::Eof {
                break;
            }
            let param_idx = match &tok.kind {
                TokenKind::Ident(id) => params.iter().position(|p| p == id),
                _ => None,
            };
            match param_idx {
                Some(i) if args[i].1 > 1 => pieces.push(format!("({})", args[i].0)),
                Some(i) => pieces.push(args[i].0.to_string()),
                None => pieces.push(body[tok.offset..tok.end()].to_string()),
            }
        }
        let expanded = pieces.join(" ");
        self.parse_at_depth(&expanded, depth).map_err(at_call_site)
    }
}
