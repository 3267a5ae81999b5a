use crate::error::LogicError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Number(u32),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
    Eof,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize, // Byte offset into the tokenized text
    pub len: usize,
}

impl Token {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split requirement text into tokens. The returned list always ends with
/// a single `Eof` token positioned at the end of the input.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LogicError> {
    let mut tokens: Vec<Token> = vec![];
    let mut chars = input.char_indices().peekable();
    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ',' => Some(TokenKind::Comma),
            '&' => Some(TokenKind::And),
            '|' => Some(TokenKind::Or),
            '!' => Some(TokenKind::Not),
            _ => None,
        };
        if let Some(kind) = single {
            chars.next();
            tokens.push(Token {
                kind,
                offset,
                len: 1,
            });
            continue;
        }
        if !is_ident_char(c) {
            return Err(LogicError::syntax(
                input,
                offset,
                c.len_utf8(),
                format!("unexpected character '{c}'"),
            ));
        }
        let mut end = offset;
        while let Some(&(i, c)) = chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            end = i + c.len_utf8();
            chars.next();
        }
        let word = &input[offset..end];
        let kind = if word.chars().all(|c| c.is_ascii_digit()) {
            let n = word.parse::<u32>().map_err(|_| {
                LogicError::syntax(input, offset, word.len(), "number out of range")
            })?;
            TokenKind::Number(n)
        } else {
            TokenKind::Ident(word.to_string())
        };
        tokens.push(Token {
            kind,
            offset,
            len: end - offset,
        });
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: input.len(),
        len: 0,
    });
    Ok(tokens)
}

/// Parse a macro declaration header: either `name` or `name(param, ...)`.
pub fn parse_macro_header(header: &str) -> Result<(String, Vec<String>), LogicError> {
    let tokens = tokenize(header)?;
    let unexpected = |tok: &Token, what: &str| {
        LogicError::syntax(header, tok.offset, tok.len, format!("expected {what}"))
    };
    let mut it = tokens.iter();
    let first = it.next().unwrap_or(&tokens[0]);
    let name = match &first.kind {
        TokenKind::Ident(name) => name.clone(),
        _ => return Err(unexpected(first, "macro name")),
    };
    let mut params: Vec<String> = vec![];
    let next = it.next().unwrap_or(first);
    match next.kind {
        TokenKind::Eof => return Ok((name, params)),
        TokenKind::LParen => {}
        _ => return Err(unexpected(next, "'(' or end of header")),
    }
    loop {
        let tok = it.next().unwrap_or(next);
        match &tok.kind {
            TokenKind::RParen if params.is_empty() => break,
            TokenKind::Ident(p) => {
                if params.contains(p) {
                    return Err(LogicError::syntax(
                        header,
                        tok.offset,
                        tok.len,
                        format!("duplicate parameter '{p}'"),
                    ));
                }
                params.push(p.clone());
            }
            _ => return Err(unexpected(tok, "parameter name")),
        }
        let sep = it.next().unwrap_or(tok);
        match sep.kind {
            TokenKind::Comma => continue,
            TokenKind::RParen => break,
            _ => return Err(unexpected(sep, "',' or ')'")),
        }
    }
    match it.next() {
        Some(tok) if tok.kind == TokenKind::Eof => Ok((name, params)),
        Some(tok) => Err(unexpected(tok, "end of header")),
        None => Ok((name, params)),
    }
}
