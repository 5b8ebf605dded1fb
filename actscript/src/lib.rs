pub mod error;
pub mod ir;
pub mod parser;
pub mod runtime;
pub mod span;

use std::sync::Arc;

pub use error::{FunctionError, ParseError, RuntimeError, ScriptError, TableError};
pub use ir::ast::{Node, NodeKind};
pub use ir::token::{Token, TokenKind};
pub use parser::{ParseResult, Parser, parse};
pub use runtime::{FunctionTable, Script, ScriptState, VariableTable};

/// Разбирает исходник и готовит скрипт к запуску с данной таблицей функций.
pub fn load(source: &str, functions: Arc<FunctionTable>) -> Result<Script, ScriptError> {
    let nodes = parse(source)?;
    Ok(Script::new(nodes).with_functions(functions))
}
