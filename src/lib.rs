pub mod codegen;
pub mod compiler;
pub mod error;
pub mod options;
pub mod tpl;

pub use compiler::{Compiler, GeneratedUnit};
pub use error::{CompileError, Result};
pub use options::CompileOptions;
