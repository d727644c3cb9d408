//! C++ emission for resolved template ASTs.
//!
//! Every template becomes one class. A base template produces the root of a
//! hierarchy that owns the render entry points and the parameter record, an
//! extending template produces a subclass overriding `renderBlock_<name>`.

mod header;
mod render;
mod source;

use log::{debug, warn};

use crate::Result;
use crate::error::CompileError;
use crate::tpl::ast::{Ast, AstKind, Parameter};

pub use header::generate_header;
pub use source::generate_source;

/// The declaration and definition emitted for one template.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedUnit {
    pub class_name: String,
    pub header: String,
    pub source: String,
}

/// One template seen as a class, together with its resolved base.
pub(crate) struct Class<'a> {
    pub ast: &'a Ast,
    pub base: Option<&'a Ast>,
    /// This class declares and defines `strlocaltime`.
    pub emits_clock_helper: bool,
}

impl<'a> Class<'a> {
    pub fn new(ast: &'a Ast) -> Result<Self> {
        let base = match &ast.kind {
            AstKind::Base { .. } => None,
            AstKind::Extending {
                base_template,
                base,
            } => Some(base.as_deref().ok_or_else(|| {
                CompileError::Generate(format!(
                    "base template '{base_template}' of '{}' has not been resolved",
                    ast.class_name
                ))
            })?),
        };
        // The topmost user of a clock macro owns the helper.
        let helper_owner = ast.chain().filter(|a| a.uses_clock_helper).last();
        Ok(Self {
            ast,
            base,
            emits_clock_helper: helper_owner.is_some_and(|owner| std::ptr::eq(owner, ast)),
        })
    }

    pub fn name(&self) -> &'a str {
        &self.ast.class_name
    }

    pub fn is_root(&self) -> bool {
        self.base.is_none()
    }

    /// How this class refers to `other`: bare when both share a namespace,
    /// fully qualified otherwise.
    pub fn qualify(&self, other: &Ast) -> String {
        if other.namespace == self.ast.namespace {
            return other.class_name.clone();
        }
        match &other.namespace {
            Some(ns) => format!("::{ns}::{}", other.class_name),
            None => format!("::{}", other.class_name),
        }
    }

    /// Parameters of the whole chain, root first. A name redeclared further
    /// down shadows the ancestor's field.
    pub fn chain_parameters(&self) -> Vec<&'a Parameter> {
        let mut seen: Vec<&str> = Vec::new();
        let mut params = Vec::new();
        for ast in self.ast.chain() {
            for param in ast.parameters.iter().rev() {
                if !seen.contains(&param.name.as_str()) {
                    seen.push(&param.name);
                    params.push(param);
                }
            }
        }
        params.reverse();
        params
    }

    fn warn_unreachable_blocks(&self) {
        let Some(base) = self.base else {
            return;
        };
        for block in &self.ast.blocks {
            if base.block_owner(&block.name).is_none() {
                warn!(
                    "{}: block '{}' is not declared by any base template and is never rendered",
                    self.ast.filename.display(),
                    block.name
                );
            }
        }
    }
}

/// Generates header and implementation for `ast`, whose base chain must be
/// resolved.
pub fn generate(ast: &Ast) -> Result<GeneratedUnit> {
    let class = Class::new(ast)?;
    class.warn_unreachable_blocks();

    let header = header::emit(&class);
    let source = source::emit(&class)?;
    debug!(
        "Generate: class={}, base={}, header={} bytes, source={} bytes",
        class.name(),
        class.base.map(|b| b.class_name.as_str()).unwrap_or("-"),
        header.len(),
        source.len()
    );
    Ok(GeneratedUnit {
        class_name: class.name().to_string(),
        header,
        source,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{extend, parse};
    use super::*;

    #[test]
    fn test_unresolved_base_is_an_error() {
        let leaf = parse("leaf.tpl", "{% extends base.tpl %}\n");
        match generate(&leaf) {
            Err(CompileError::Generate(message)) => {
                assert!(message.contains("base.tpl"), "{}", message)
            }
            other => panic!("Expected Generate error, got {:?}", other),
        }
    }

    #[test]
    fn test_clock_helper_owned_by_topmost_user() {
        let root = parse("root.tpl", "{{ __current_time__ }}\n");
        let leaf = extend(
            parse("leaf.tpl", "{% extends root.tpl %}\n{% block a %}{{ __current_date__ }}{% endblock %}\n"),
            root.clone(),
        );
        assert!(Class::new(&root).unwrap().emits_clock_helper);
        assert!(!Class::new(&leaf).unwrap().emits_clock_helper);

        let plain_root = parse("root.tpl", "{% block a %}{% endblock %}\n");
        let leaf = extend(
            parse("leaf.tpl", "{% extends root.tpl %}\n{% block a %}{{ __current_date__ }}{% endblock %}\n"),
            plain_root,
        );
        assert!(Class::new(&leaf).unwrap().emits_clock_helper);
    }

    #[test]
    fn test_chain_parameters_root_first() {
        let root = parse("root.tpl", "{% param title std::string %}\n{% param user User %}\n");
        let leaf = extend(
            parse("leaf.tpl", "{% extends root.tpl %}\n{% param items std::vector<int> %}\n{% param title const char* %}\n"),
            root,
        );
        let class = Class::new(&leaf).unwrap();
        let names: Vec<(&str, &str)> = class
            .chain_parameters()
            .iter()
            .map(|p| (p.name.as_str(), p.ty.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("user", "User"),
                ("items", "std::vector<int>"),
                ("title", "const char*"),
            ]
        );
    }

    #[test]
    fn test_qualify_across_namespaces() {
        let mut root = parse("root.tpl", "x\n");
        root.namespace = Some("web::layout".to_string());
        let mut leaf = extend(parse("leaf.tpl", "{% extends root.tpl %}\n"), root);
        leaf.namespace = Some("web::views".to_string());
        let class = Class::new(&leaf).unwrap();
        assert_eq!(class.qualify(class.base.unwrap()), "::web::layout::root");
        assert_eq!(class.qualify(&leaf), "leaf");
    }
}
