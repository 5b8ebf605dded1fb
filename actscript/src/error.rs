use thiserror::Error;

use crate::ir::ast::NodeKind;
use crate::ir::token::{Token, TokenKind};
use crate::runtime::script::ScriptState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Nothing to parse")]
    Empty,

    #[error("Unexpected token '{found}'{} at line {line}, pos {column}", expected_suffix(.expected))]
    Unexpected {
        found: String,
        kind: TokenKind,
        line: usize,
        column: usize,
        expected: Vec<TokenKind>,
    },

    #[error("Unable to parse function arg, found '{found}' [{kind}] at line {line}, pos {column}")]
    InvalidArgument {
        found: String,
        kind: TokenKind,
        line: usize,
        column: usize,
    },
}

fn expected_suffix(expected: &[TokenKind]) -> String {
    if expected.is_empty() {
        return String::new();
    }
    let names: Vec<&str> = expected.iter().map(TokenKind::name).collect();
    format!(", expected {}", names.join(" or "))
}

impl ParseError {
    pub fn unexpected(token: &Token, expected: &[TokenKind]) -> Self {
        Self::Unexpected {
            found: token.display_text().to_string(),
            kind: token.kind,
            line: token.line(),
            column: token.column(),
            expected: expected.to_vec(),
        }
    }

    pub fn invalid_argument(token: &Token) -> Self {
        Self::InvalidArgument {
            found: token.display_text().to_string(),
            kind: token.kind,
            line: token.line(),
            column: token.column(),
        }
    }

    /// (line, column) проблемного токена.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Self::Empty => None,
            Self::Unexpected { line, column, .. } | Self::InvalidArgument { line, column, .. } => {
                Some((*line, *column))
            }
        }
    }

    pub fn expected(&self) -> &[TokenKind] {
        match self {
            Self::Unexpected { expected, .. } => expected,
            _ => &[],
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("Function {0} already exists")]
    DuplicateFunction(String),

    #[error("Variable {0} already exists")]
    DuplicateVariable(String),
}

/// Ошибка, которую сообщает сама реализация функции из start/resume.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FunctionError {
    pub message: String,
}

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn missing_argument(name: &str) -> Self {
        Self::new(format!("missing argument '{name}'"))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Unknown function '{name}' at node {node}")]
    UnknownFunction { node: usize, name: String },

    #[error("Unknown variable '{name}' at node {node}")]
    UnknownVariable { node: usize, name: String },

    #[error("Unknown resource '{name}' at node {node}")]
    UnknownResource { node: usize, name: String },

    #[error("Function '{name}' failed at node {node}: {source}")]
    FunctionFailed {
        node: usize,
        name: String,
        #[source]
        source: FunctionError,
    },

    #[error("Node {node} of kind {kind} cannot be executed")]
    InvalidNode { node: usize, kind: NodeKind },

    #[error("Argument '{name}' given twice at node {node}")]
    DuplicateArgument { node: usize, name: String },

    #[error("Function '{name}' nested too deep at node {node}")]
    RecursionLimit { node: usize, name: String },

    #[error("Cannot {action} a script in state {state}")]
    InvalidState {
        action: &'static str,
        state: ScriptState,
    },
}

impl RuntimeError {
    /// Узел, на котором произошел сбой.
    pub fn node(&self) -> Option<usize> {
        match self {
            Self::UnknownFunction { node, .. }
            | Self::UnknownVariable { node, .. }
            | Self::UnknownResource { node, .. }
            | Self::FunctionFailed { node, .. }
            | Self::InvalidNode { node, .. }
            | Self::DuplicateArgument { node, .. }
            | Self::RecursionLimit { node, .. } => Some(*node),
            Self::InvalidState { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}
