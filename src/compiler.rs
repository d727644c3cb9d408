use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::Result;
use crate::codegen;
pub use crate::codegen::GeneratedUnit;
use crate::error::CompileError;
use crate::options::CompileOptions;
use crate::tpl::ast::Ast;
use crate::tpl::resolver::Resolver;

/// Entry point for turning template files into C++ classes.
///
/// A compilation runs the lexer and parser over the requested template,
/// resolves its `extends` chain from disk and generates the header and
/// implementation. Nothing is cached between calls.
///
/// ```no_run
/// use std::path::Path;
/// use tplc::{CompileOptions, Compiler};
///
/// let compiler = Compiler::new(CompileOptions::new());
/// let unit = compiler.compile_file(Path::new("views/page.tpl"))?;
/// compiler.write_unit(&unit, Path::new("out/page"))?;
/// # Ok::<(), tplc::CompileError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Parses the template at `path` and resolves its base chain.
    pub fn parse_file(&self, path: &Path) -> Result<Ast> {
        Resolver::new(&self.options).load(path)
    }

    /// Parses in-memory source. `path` names the template and anchors
    /// relative `extends` targets.
    pub fn parse_str(&self, source: &str, path: &Path) -> Result<Ast> {
        Resolver::new(&self.options).load_source(source, path)
    }

    pub fn generate(&self, ast: &Ast) -> Result<GeneratedUnit> {
        codegen::generate(ast)
    }

    pub fn compile_file(&self, path: &Path) -> Result<GeneratedUnit> {
        let ast = self.parse_file(path)?;
        self.generate(&ast)
    }

    pub fn compile_str(&self, source: &str, path: &Path) -> Result<GeneratedUnit> {
        let ast = self.parse_str(source, path)?;
        self.generate(&ast)
    }

    /// Writes `<base>.h` and `<base>.cpp`, creating missing directories.
    /// When the second file cannot be written the first one is removed again.
    pub fn write_unit(&self, unit: &GeneratedUnit, base: &Path) -> Result<(PathBuf, PathBuf)> {
        let (header_path, source_path) = output_paths(base);
        if let Some(dir) = base.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| CompileError::io(dir, e))?;
        }

        fs::write(&header_path, &unit.header).map_err(|e| CompileError::io(&header_path, e))?;
        if let Err(e) = fs::write(&source_path, &unit.source) {
            if let Err(cleanup) = fs::remove_file(&header_path) {
                debug!(
                    "Write: could not remove partial output {}: {}",
                    header_path.display(),
                    cleanup
                );
            }
            return Err(CompileError::io(&source_path, e));
        }

        info!(
            "Write: class={}, header={}, source={}",
            unit.class_name,
            header_path.display(),
            source_path.display()
        );
        Ok((header_path, source_path))
    }
}

/// The two artifact paths for an output base; extensions are appended, not
/// substituted.
pub fn output_paths(base: &Path) -> (PathBuf, PathBuf) {
    let with_ext = |ext: &str| {
        let mut path = OsString::from(base.as_os_str());
        path.push(ext);
        PathBuf::from(path)
    };
    (with_ext(".h"), with_ext(".cpp"))
}

/// Artifacts land next to the template, named after the class.
pub fn default_output_base(template: &Path, class_name: &str) -> PathBuf {
    match template.parent() {
        Some(dir) => dir.join(class_name),
        None => PathBuf::from(class_name),
    }
}
