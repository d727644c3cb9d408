use std::fmt;

use serde::Serialize;

/// The lifecycle hooks a raw code section can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    Init,
    Deinit,
    Prerender,
    Postrender,
}

impl Hook {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "init" => Some(Hook::Init),
            "deinit" => Some(Hook::Deinit),
            "prerender" => Some(Hook::Prerender),
            "postrender" => Some(Hook::Postrender),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Init => "init",
            Hook::Deinit => "deinit",
            Hook::Prerender => "prerender",
            Hook::Postrender => "postrender",
        }
    }

    /// `true` when `word` closes a section opened by this hook.
    pub fn is_terminator(&self, word: &str) -> bool {
        word == "endcode" || word.strip_prefix("end") == Some(self.as_str())
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Text(String),
    Expression(String),
    Comment(String),
    For { variable: String, source: String },
    EndFor,
    If(String),
    Elif(String),
    Else,
    EndIf,
    Block(String),
    EndBlock,
    ParentCall,
    Variable { name: String, accessor: String, ty: String },
    Param { name: String, ty: String },
    Extends(String),
    Namespace(String),
    IncludeHeader(String),
    IncludeImpl(String),
    Code { hook: Hook, code: String },
}

impl TokenKind {
    /// Short name used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Text(_) => "text",
            TokenKind::Expression(_) => "expression",
            TokenKind::Comment(_) => "comment",
            TokenKind::For { .. } => "for",
            TokenKind::EndFor => "endfor",
            TokenKind::If(_) => "if",
            TokenKind::Elif(_) => "elif",
            TokenKind::Else => "else",
            TokenKind::EndIf => "endif",
            TokenKind::Block(_) => "block",
            TokenKind::EndBlock => "endblock",
            TokenKind::ParentCall => "parent()",
            TokenKind::Variable { .. } => "variable",
            TokenKind::Param { .. } => "param",
            TokenKind::Extends(_) => "extends",
            TokenKind::Namespace(_) => "namespace",
            TokenKind::IncludeHeader(_) => "#include",
            TokenKind::IncludeImpl(_) => "#include_impl",
            TokenKind::Code { .. } => "code section",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}
