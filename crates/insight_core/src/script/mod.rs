//! Restricted chart-script interpreter.
//!
//! Model-generated code is never handed to a real language runtime. It is
//! parsed and evaluated here against a fixed set of context bindings (`df`,
//! `chart`, `table`, `show`) plus locals the script itself assigns. There is
//! no way to reach the filesystem, network, environment, or any host state
//! from inside a script, and evaluation carries a step budget and a nesting
//! limit.

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use eval::{execute, ExecutionContext, ExecutionReport, Limits};
pub use value::Value;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("name '{0}' is not defined")]
    NameNotDefined(String),

    #[error("unknown method '{method}' on {type_name}")]
    UnknownMethod { type_name: &'static str, method: String },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("bad arguments to {call}: {message}")]
    Arguments { call: String, message: String },

    #[error("execution budget of {0} steps exhausted")]
    Budget(usize),

    #[error("nesting exceeds depth limit of {0}")]
    Depth(usize),
}
