pub mod ast;
pub mod dump;
pub mod lexer;
pub mod macros;
pub mod parser;
pub mod resolver;
pub mod token;

pub use ast::{Ast, AstKind, Node};
