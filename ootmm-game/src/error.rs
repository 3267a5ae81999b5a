use strum_macros::Display;
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolKind {
    Item,
    Event,
    Setting,
    Function,
    #[strum(serialize = "point of interest")]
    PointOfInterest,
}

/// Failures raised while compiling requirement text, building a World, or
/// validating the options of a single pathfinder run.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LogicError {
    #[error("syntax error at offset {offset} near '{fragment}' in '{input}': {message}")]
    Syntax {
        input: String,
        offset: usize,
        fragment: String,
        message: String,
    },
    #[error("unknown {kind}: {name}")]
    UnknownSymbol { kind: SymbolKind, name: String },
    #[error("expansion of macro '{name}' exceeded depth {depth}")]
    RecursiveMacro { name: String, depth: usize },
    #[error("duplicate macro definition: {0}")]
    DuplicateMacro(String),
    #[error("missing area '{name}' (referenced by {referenced_by})")]
    MissingArea { name: String, referenced_by: String },
    #[error("missing location '{name}' (referenced by area {area})")]
    MissingLocation { name: String, area: String },
    #[error("duplicate area: {0}")]
    DuplicateArea(String),
    #[error("duplicate check: {0}")]
    DuplicateCheck(String),
    #[error("duplicate point of interest: {0}")]
    DuplicateGossip(String),
    #[error("invalid check '{location}': {message}")]
    InvalidCheck { location: String, message: String },
    #[error("invalid pathfinder options: {0}")]
    InvalidOptions(String),
}

impl LogicError {
    pub fn syntax(input: &str, offset: usize, len: usize, message: impl Into<String>) -> Self {
        let fragment = if offset >= input.len() {
            "<end of input>".to_string()
        } else {
            let end = std::cmp::min(offset + len.max(1), input.len());
            input.get(offset..end).unwrap_or(&input[offset..]).to_string()
        };
        LogicError::Syntax {
            input: input.to_string(),
            offset,
            fragment,
            message: message.into(),
        }
    }
}
