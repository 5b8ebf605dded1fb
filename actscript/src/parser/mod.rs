pub mod lexer;
pub mod parser;

use crate::error::ParseError;
use crate::ir::ast::Node;

pub use parser::{ParseResult, Parser};

/// Главная функция парсера - из текста в AST
pub fn parse(source: &str) -> Result<Vec<Node>, ParseError> {
    Parser::new(source).parse().clone().into_result()
}
