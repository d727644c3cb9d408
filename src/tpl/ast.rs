use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::tpl::token::Hook;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Node {
    /// Literal text, appended verbatim.
    AppendString(String),
    /// Opaque C++ expression whose value is appended.
    Expression(String),
    ForEachLoop {
        source: String,
        variable: String,
        nodes: Vec<Node>,
    },
    Conditional {
        /// `(condition, body)` pairs: the `if` followed by every `elif`.
        branches: Vec<(String, Vec<Node>)>,
        else_nodes: Option<Vec<Node>>,
    },
    /// Virtual dispatch into the named block's render method.
    BlockCall(String),
    /// Static call of the nearest ancestor's version of the named block.
    BlockParentCall(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub name: String,
    pub nodes: Vec<Node>,
}

/// A stored field with a generated getter and setter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub accessor: String,
    pub ty: String,
}

/// A render-time input, bound by reference from the parameter record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeBlock {
    pub hook: Hook,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AstKind {
    /// A template with its own page layout.
    Base { nodes: Vec<Node> },
    /// A template that only overrides blocks of `base_template`.
    Extending {
        base_template: String,
        /// Filled in by the resolver.
        base: Option<Box<Ast>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ast {
    pub filename: PathBuf,
    pub class_name: String,
    /// `::`-delimited namespace path, if declared.
    pub namespace: Option<String>,
    pub variables: Vec<Variable>,
    pub parameters: Vec<Parameter>,
    pub blocks: Vec<Block>,
    pub code_blocks: Vec<CodeBlock>,
    pub header_includes: BTreeSet<String>,
    pub impl_includes: BTreeSet<String>,
    /// Some expression in this template calls the `strlocaltime` helper.
    pub uses_clock_helper: bool,
    pub kind: AstKind,
}

impl Ast {
    pub fn new(filename: impl Into<PathBuf>, class_name: impl Into<String>, kind: AstKind) -> Self {
        Self {
            filename: filename.into(),
            class_name: class_name.into(),
            namespace: None,
            variables: Vec::new(),
            parameters: Vec::new(),
            blocks: Vec::new(),
            code_blocks: Vec::new(),
            header_includes: BTreeSet::new(),
            impl_includes: BTreeSet::new(),
            uses_clock_helper: false,
            kind,
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self.kind, AstKind::Base { .. })
    }

    /// The root render body. Empty for extending templates.
    pub fn nodes(&self) -> &[Node] {
        match &self.kind {
            AstKind::Base { nodes } => nodes,
            AstKind::Extending { .. } => &[],
        }
    }

    pub fn base_template(&self) -> Option<&str> {
        match &self.kind {
            AstKind::Base { .. } => None,
            AstKind::Extending { base_template, .. } => Some(base_template),
        }
    }

    /// The resolved immediate ancestor.
    pub fn base(&self) -> Option<&Ast> {
        match &self.kind {
            AstKind::Base { .. } => None,
            AstKind::Extending { base, .. } => base.as_deref(),
        }
    }

    /// This template followed by every resolved ancestor, leaf first.
    pub fn chain(&self) -> impl Iterator<Item = &Ast> {
        std::iter::successors(Some(self), |ast| ast.base())
    }

    /// The template at the top of the resolved chain.
    pub fn root(&self) -> &Ast {
        self.chain().last().unwrap_or(self)
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// The first template, starting here and walking up, that defines `name`.
    pub fn block_owner(&self, name: &str) -> Option<&Ast> {
        self.chain().find(|ast| ast.block(name).is_some())
    }

    pub fn code_block(&self, hook: Hook) -> Option<&CodeBlock> {
        self.code_blocks.iter().find(|c| c.hook == hook)
    }

    pub fn namespace_segments(&self) -> Vec<&str> {
        self.namespace
            .as_deref()
            .map(|ns| ns.split("::").filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}
