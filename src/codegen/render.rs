use crate::Result;
use crate::codegen::Class;
use crate::error::CompileError;
use crate::tpl::ast::Node;

/// Line-oriented output buffer with tab indentation.
#[derive(Debug, Default)]
pub(crate) struct CodeWriter {
    out: String,
    indent: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `text` at the current indentation, followed by a newline.
    /// Empty lines carry no indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.out.push('\t');
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Writes verbatim text without touching indentation.
    pub fn raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Writes each line of a user code section one level deeper.
    pub fn code_lines(&mut self, code: &str) {
        self.indent();
        for line in code.lines() {
            self.line(line.trim_end());
        }
        self.dedent();
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Escapes text for use inside a C++ string literal.
pub(crate) fn escape(text: &str) -> String {
    let mut res = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => res.push_str("\\'"),
            '"' => res.push_str("\\\""),
            '\\' => res.push_str("\\\\"),
            '\n' => res.push_str("\\n"),
            '\r' => res.push_str("\\r"),
            _ => res.push(c),
        }
    }
    res
}

/// Emits the statements that append `nodes` to the `str` buffer.
pub(crate) fn render_nodes(w: &mut CodeWriter, nodes: &[Node], class: &Class) -> Result<()> {
    for node in nodes {
        match node {
            Node::AppendString(data) => w.line(format!("str.append(\"{}\");", escape(data))),
            Node::Expression(code) => w.line(format!("str.append({code});")),
            Node::ForEachLoop {
                source,
                variable,
                nodes,
            } => {
                w.line(format!("for(auto& {variable} : {source}) {{"));
                w.indent();
                render_nodes(w, nodes, class)?;
                w.dedent();
                w.line("}");
            }
            Node::Conditional {
                branches,
                else_nodes,
            } => {
                for (idx, (condition, nodes)) in branches.iter().enumerate() {
                    if idx == 0 {
                        w.line(format!("if ({condition}) {{"));
                    } else {
                        w.line(format!("}} else if ({condition}) {{"));
                    }
                    w.indent();
                    render_nodes(w, nodes, class)?;
                    w.dedent();
                }
                if let Some(nodes) = else_nodes {
                    w.line("} else {");
                    w.indent();
                    render_nodes(w, nodes, class)?;
                    w.dedent();
                }
                w.line("}");
            }
            Node::BlockCall(name) => w.line(format!("this->renderBlock_{name}(str, p);")),
            Node::BlockParentCall(name) => {
                let owner = class.base.and_then(|base| base.block_owner(name)).ok_or_else(|| {
                    CompileError::Generate(format!(
                        "parent() in block '{name}' of '{}', but no base template defines that block",
                        class.name()
                    ))
                })?;
                w.line(format!("{}::renderBlock_{name}(str, p);", class.qualify(owner)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::test_support::{extend, parse};

    fn render(class: &Class, nodes: &[Node]) -> String {
        let mut w = CodeWriter::new();
        w.indent();
        render_nodes(&mut w, nodes, class).unwrap();
        w.finish()
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a\"b'c\\d\ne\rf\tg"), "a\\\"b\\'c\\\\d\\ne\\rf\tg");
    }

    #[test]
    fn test_hello_appends_in_order() {
        let ast = parse("page.tpl", "Hello {{ name }}!\n");
        let class = Class::new(&ast).unwrap();
        assert_eq!(
            render(&class, ast.nodes()),
            "\tstr.append(\"Hello \");\n\tstr.append(name);\n\tstr.append(\"!\\n\");\n"
        );
    }

    #[test]
    fn test_for_loop() {
        let ast = parse("page.tpl", "{% for item in items %}{{ item }}{% endfor %}\n");
        let class = Class::new(&ast).unwrap();
        assert_eq!(
            render(&class, ast.nodes()),
            "\tfor(auto& item : items) {\n\t\tstr.append(item);\n\t}\n"
        );
    }

    #[test]
    fn test_conditional_chain() {
        let ast = parse("page.tpl", "{% if a %}A{% elif b %}B{% else %}C{% endif %}\n");
        let class = Class::new(&ast).unwrap();
        let expected = "\
\tif (a) {
\t\tstr.append(\"A\");
\t} else if (b) {
\t\tstr.append(\"B\");
\t} else {
\t\tstr.append(\"C\");
\t}
";
        assert_eq!(render(&class, ast.nodes()), expected);
    }

    #[test]
    fn test_parent_call_uses_nearest_owner() {
        let root = parse("root.tpl", "{% block title %}R{% endblock %}{% block body %}{% endblock %}\n");
        let middle = extend(
            parse("middle.tpl", "{% extends root.tpl %}\n{% block title %}M{% endblock %}\n"),
            root,
        );
        let leaf = extend(
            parse(
                "leaf.tpl",
                "{% extends middle.tpl %}\n{% block title %}{% parent() %}{% endblock %}\n{% block body %}{% parent() %}{% endblock %}\n",
            ),
            middle,
        );
        let class = Class::new(&leaf).unwrap();
        assert_eq!(
            render(&class, &leaf.block("title").unwrap().nodes),
            "\tmiddle::renderBlock_title(str, p);\n"
        );
        assert_eq!(
            render(&class, &leaf.block("body").unwrap().nodes),
            "\troot::renderBlock_body(str, p);\n"
        );
    }

    #[test]
    fn test_parent_call_without_owner_fails() {
        let root = parse("root.tpl", "body\n");
        let leaf = extend(
            parse("leaf.tpl", "{% extends root.tpl %}\n{% block extra %}{% parent() %}{% endblock %}\n"),
            root,
        );
        let class = Class::new(&leaf).unwrap();
        let mut w = CodeWriter::new();
        match render_nodes(&mut w, &leaf.block("extra").unwrap().nodes, &class) {
            Err(CompileError::Generate(message)) => assert!(message.contains("extra"), "{}", message),
            other => panic!("Expected Generate error, got {:?}", other),
        }
    }

    #[test]
    fn test_code_lines_are_reindented() {
        let mut w = CodeWriter::new();
        w.code_lines("a();\n\n  b();\n");
        assert_eq!(w.finish(), "\ta();\n\n\t  b();\n");
    }
}
