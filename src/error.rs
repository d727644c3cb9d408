use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A position inside a template source file. Line and column are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Lex Error: {location}: {message}")]
    Lex { location: Location, message: String },
    #[error("Parse Error: {}{message}", format_location(.location))]
    Parse {
        location: Option<Location>,
        message: String,
    },
    #[error("Resolution Error: {}: {message}", .path.display())]
    Resolution { path: PathBuf, message: String },
    #[error("IO Error: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Generate Error: {0}")]
    Generate(String),
}

fn format_location(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!("{}: ", loc),
        None => String::new(),
    }
}

impl CompileError {
    pub fn lex(location: Location, message: impl Into<String>) -> Self {
        CompileError::Lex {
            location,
            message: message.into(),
        }
    }

    pub fn parse(location: Option<Location>, message: impl Into<String>) -> Self {
        CompileError::Parse {
            location,
            message: message.into(),
        }
    }

    pub fn resolution(path: &Path, message: impl Into<String>) -> Self {
        CompileError::Resolution {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        CompileError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
