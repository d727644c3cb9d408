use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::debug;

use crate::Result;
use crate::error::CompileError;
use crate::options::CompileOptions;
use crate::tpl::ast::{Ast, AstKind};
use crate::tpl::{lexer, parser};

/// Loads templates and eagerly attaches every `extends` target as the base
/// AST, recursing up the chain.
pub struct Resolver<'o> {
    options: &'o CompileOptions,
    /// Shared by every template of the chain.
    now: DateTime<Local>,
    /// Canonical paths of the templates currently being resolved, outermost
    /// first.
    resolving: Vec<PathBuf>,
}

impl<'o> Resolver<'o> {
    pub fn new(options: &'o CompileOptions) -> Self {
        Self {
            options,
            now: options.timestamp(),
            resolving: Vec::new(),
        }
    }

    /// Reads, parses and resolves the template at `path`.
    pub fn load(&mut self, path: &Path) -> Result<Ast> {
        let canonical = fs::canonicalize(path).map_err(|e| CompileError::io(path, e))?;
        let source = fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
        self.enter(canonical, path, &source)
    }

    /// Parses `source` as if it had been read from `path`. Relative `extends`
    /// targets resolve against the directory of `path`, which need not exist.
    pub fn load_source(&mut self, source: &str, path: &Path) -> Result<Ast> {
        match fs::canonicalize(path) {
            Ok(canonical) => self.enter(canonical, path, source),
            Err(_) => self.build(source, path),
        }
    }

    fn load_base(&mut self, path: &Path) -> Result<Ast> {
        let canonical = fs::canonicalize(path).map_err(|e| {
            CompileError::resolution(path, format!("cannot resolve extends target: {e}"))
        })?;
        let source = fs::read_to_string(path).map_err(|e| {
            CompileError::resolution(path, format!("cannot read extends target: {e}"))
        })?;
        self.enter(canonical, path, &source)
    }

    fn enter(&mut self, canonical: PathBuf, path: &Path, source: &str) -> Result<Ast> {
        if self.resolving.contains(&canonical) {
            let cycle = self
                .resolving
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(CompileError::resolution(
                path,
                format!("cyclic extends chain: {cycle}"),
            ));
        }

        self.resolving.push(canonical);
        let result = self.build(source, path);
        self.resolving.pop();
        result
    }

    fn build(&mut self, source: &str, path: &Path) -> Result<Ast> {
        let class_name = parser::class_name_for(path)?;
        let tokens = lexer::lex(source, path, self.options.trims_command_lines())?;
        let mut ast = parser::parse_tokens(&tokens, path, &class_name, self.now)?;
        self.resolve_base(&mut ast)?;
        Ok(ast)
    }

    fn resolve_base(&mut self, ast: &mut Ast) -> Result<()> {
        let AstKind::Extending {
            base_template,
            base,
        } = &mut ast.kind
        else {
            return Ok(());
        };

        let target = target_path(&ast.filename, base_template);
        debug!(
            "Resolve: file={}, extends={}, target={}",
            ast.filename.display(),
            base_template,
            target.display()
        );
        *base = Some(Box::new(self.load_base(&target)?));
        Ok(())
    }
}

/// Relative targets are taken from the directory of the extending file.
fn target_path(from: &Path, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match from.parent() {
        Some(dir) => dir.join(target),
        None => target.to_path_buf(),
    }
}
