use std::fmt;

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Значение токена конца ввода.
pub const EOF_TEXT: &str = "\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    #[serde(rename = "TokenIllegal")]
    Illegal,
    #[serde(rename = "TokenEOF")]
    Eof,
    #[serde(rename = "TokenNewLine")]
    Newline,
    #[serde(rename = "TokenWhitespace")]
    Whitespace,
    #[serde(rename = "TokenComment")]
    Comment,
    #[serde(rename = "TokenOpenBracket")]
    LParen,        // (
    #[serde(rename = "TokenCloseBracket")]
    RParen,        // )
    #[serde(rename = "TokenEquals")]
    Equals,        // =
    #[serde(rename = "TokenComma")]
    Comma,         // ,
    #[serde(rename = "TokenColon")]
    Colon,         // :
    #[serde(rename = "TokenIdentifier")]
    Identifier,
    #[serde(rename = "TokenVariable")]
    Variable,      // &name
    #[serde(rename = "TokenResource")]
    Resource,      // @name
    #[serde(rename = "TokenText")]
    Text,          // 'text'
    #[serde(rename = "TokenNumber")]
    Number,        // 1, 1.2
    #[serde(rename = "TokenDuration")]
    Duration,      // 1d2h3m4s
    #[serde(rename = "TokenOperator")]
    Operator,      // + - * / % < >
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Illegal => "TokenIllegal",
            Self::Eof => "TokenEOF",
            Self::Newline => "TokenNewLine",
            Self::Whitespace => "TokenWhitespace",
            Self::Comment => "TokenComment",
            Self::LParen => "TokenOpenBracket",
            Self::RParen => "TokenCloseBracket",
            Self::Equals => "TokenEquals",
            Self::Comma => "TokenComma",
            Self::Colon => "TokenColon",
            Self::Identifier => "TokenIdentifier",
            Self::Variable => "TokenVariable",
            Self::Resource => "TokenResource",
            Self::Text => "TokenText",
            Self::Number => "TokenNumber",
            Self::Duration => "TokenDuration",
            Self::Operator => "TokenOperator",
        }
    }

    /// Токены, которые парсер пропускает между значимыми.
    pub fn is_trivia(&self) -> bool {
        matches!(self, Self::Whitespace | Self::Comment)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TokenRepr", from = "TokenRepr")]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self { kind, text: text.into(), span }
    }

    pub fn line(&self) -> usize {
        self.span.line
    }

    pub fn column(&self) -> usize {
        self.span.column
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Текст для сообщений об ошибках: конец ввода печатается как `<EOF>`.
    pub fn display_text(&self) -> &str {
        match self.kind {
            TokenKind::Eof => "<EOF>",
            _ => &self.text,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` [{}]", self.text, self.kind)
    }
}

// Wire shape: { "type", "value", "lineNum", "linePos" }
#[derive(Serialize, Deserialize)]
struct TokenRepr {
    #[serde(rename = "type")]
    kind: TokenKind,
    value: String,
    #[serde(rename = "lineNum")]
    line_num: usize,
    #[serde(rename = "linePos")]
    line_pos: usize,
}

impl From<Token> for TokenRepr {
    fn from(token: Token) -> Self {
        Self {
            kind: token.kind,
            line_num: token.span.line,
            line_pos: token.span.column,
            value: token.text,
        }
    }
}

impl From<TokenRepr> for Token {
    fn from(repr: TokenRepr) -> Self {
        let span = Span::new(repr.line_num, repr.line_pos, 0, 0);
        Self { kind: repr.kind, text: repr.value, span }
    }
}
