use std::path::Path;

use chrono::{DateTime, Local};
use log::{debug, warn};

use crate::Result;
use crate::error::{CompileError, Location};
use crate::tpl::ast::{Ast, AstKind, Block, CodeBlock, Node, Parameter, Variable};
use crate::tpl::macros::{self, MacroContext};
use crate::tpl::token::{Token, TokenKind};

/// Where a node is being parsed. Decides whether `parent()` is legal.
#[derive(Debug, Clone, Copy)]
enum Scope<'s> {
    Root,
    Block {
        name: &'s str,
        /// Only blocks of extending templates have an ancestor to call.
        has_ancestor: bool,
    },
}

/// Open/close counters for one scope of the balance check.
#[derive(Default)]
struct Counts {
    fors: usize,
    endfors: usize,
    ifs: usize,
    endifs: usize,
}

impl Counts {
    fn verify(&self, scope: Option<&str>) -> Result<()> {
        let place = match scope {
            Some(name) => format!("block '{name}'"),
            None => "template body".to_string(),
        };
        if self.fors != self.endfors {
            return Err(CompileError::parse(
                None,
                format!(
                    "unbalanced for/endfor in {place}: {} opened, {} closed",
                    self.fors, self.endfors
                ),
            ));
        }
        if self.ifs != self.endifs {
            return Err(CompileError::parse(
                None,
                format!(
                    "unbalanced if/endif in {place}: {} opened, {} closed",
                    self.ifs, self.endifs
                ),
            ));
        }
        Ok(())
    }
}

/// A recursive-descent parser over the compacted token stream.
///
/// Top-level declarations attach to the AST being built. Everything else is
/// turned into [`Node`]s, with `for` and `if` recursing until their closing
/// tag. A closing tag is only accepted by the construct it closes, so a stray
/// `endfor`/`endif`/`endblock` is always an error.
struct Parser<'a> {
    file: &'a Path,
    tokens: &'a [Token],
    /// Index of the next token to consume.
    pos: usize,
    macros: MacroContext<'a>,
    uses_clock_helper: bool,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], file: &'a Path, class_name: &'a str, now: DateTime<Local>) -> Self {
        Self {
            file,
            tokens,
            pos: 0,
            macros: MacroContext { class_name, now },
            uses_clock_helper: false,
        }
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn at(&self, token: &Token) -> Option<Location> {
        Some(Location::new(self.file, token.line, token.column))
    }

    fn error(&self, token: &Token, message: impl Into<String>) -> CompileError {
        CompileError::parse(self.at(token), message)
    }

    /// Compares opened and closed `for`/`if` tags, separately for the
    /// template body and for every block body.
    fn check_balance(&self) -> Result<()> {
        let mut scopes: Vec<(Option<&str>, Counts)> = vec![(None, Counts::default())];
        for token in self.tokens {
            match &token.kind {
                TokenKind::Block(name) => scopes.push((Some(name.as_str()), Counts::default())),
                TokenKind::EndBlock if scopes.len() > 1 => {
                    if let Some((name, counts)) = scopes.pop() {
                        counts.verify(name)?;
                    }
                }
                kind => {
                    if let Some((_, counts)) = scopes.last_mut() {
                        match kind {
                            TokenKind::For { .. } => counts.fors += 1,
                            TokenKind::EndFor => counts.endfors += 1,
                            TokenKind::If(_) => counts.ifs += 1,
                            TokenKind::EndIf => counts.endifs += 1,
                            _ => {}
                        }
                    }
                }
            }
        }
        for (name, counts) in scopes.iter().rev() {
            counts.verify(*name)?;
        }
        Ok(())
    }

    fn parse(mut self) -> Result<Ast> {
        self.check_balance()?;

        let mut extends = self.tokens.iter().filter_map(|t| match &t.kind {
            TokenKind::Extends(path) => Some((t, path)),
            _ => None,
        });
        let kind = match extends.next() {
            Some((_, path)) => AstKind::Extending {
                base_template: path.clone(),
                base: None,
            },
            None => AstKind::Base { nodes: Vec::new() },
        };
        for (token, path) in extends {
            warn!(
                "{}:{}: ignoring additional 'extends {}'",
                self.file.display(),
                token.line,
                path
            );
        }

        let mut ast = Ast::new(self.file, self.macros.class_name, kind);
        let has_ancestor = !ast.is_base();

        while let Some(token) = self.next() {
            match &token.kind {
                TokenKind::Block(name) => {
                    if ast.block(name).is_some() {
                        return Err(self.error(token, format!("block '{name}' is defined twice")));
                    }
                    let nodes = self.parse_block_body(token, name, has_ancestor)?;
                    if let AstKind::Base { nodes: root } = &mut ast.kind {
                        root.push(Node::BlockCall(name.clone()));
                    }
                    ast.blocks.push(Block {
                        name: name.clone(),
                        nodes,
                    });
                }
                TokenKind::Extends(_) => {}
                TokenKind::Namespace(ns) => ast.namespace = Some(ns.clone()),
                TokenKind::Variable { name, accessor, ty } => ast.variables.push(Variable {
                    name: name.clone(),
                    accessor: accessor.clone(),
                    ty: ty.clone(),
                }),
                TokenKind::Param { name, ty } => ast.parameters.push(Parameter {
                    name: name.clone(),
                    ty: ty.clone(),
                }),
                TokenKind::IncludeHeader(target) => {
                    ast.header_includes.insert(target.clone());
                }
                TokenKind::IncludeImpl(target) => {
                    ast.impl_includes.insert(target.clone());
                }
                TokenKind::Code { hook, code } => {
                    if ast.code_block(*hook).is_some() {
                        return Err(self.error(token, format!("duplicate '{hook}' section")));
                    }
                    ast.code_blocks.push(CodeBlock {
                        hook: *hook,
                        code: code.clone(),
                    });
                }
                TokenKind::Text(text) if has_ancestor && text.trim().is_empty() => {}
                _ if has_ancestor => {
                    return Err(self.error(
                        token,
                        format!(
                            "derived templates must not have free-standing content, found {}",
                            token.kind.describe()
                        ),
                    ));
                }
                _ => {
                    let node = self.parse_node(token, Scope::Root)?;
                    if let AstKind::Base { nodes } = &mut ast.kind {
                        push_node(nodes, node);
                    }
                }
            }
        }

        ast.uses_clock_helper = self.uses_clock_helper;
        debug!(
            "Parse: file={}, class={}, kind={}, blocks={}, params={}",
            self.file.display(),
            ast.class_name,
            if ast.is_base() { "base" } else { "extending" },
            ast.blocks.len(),
            ast.parameters.len()
        );
        Ok(ast)
    }

    fn parse_block_body(&mut self, opener: &Token, name: &'a str, has_ancestor: bool) -> Result<Vec<Node>> {
        let scope = Scope::Block { name, has_ancestor };
        let mut nodes = Vec::new();
        loop {
            let Some(token) = self.next() else {
                return Err(self.error(opener, format!("block '{name}' is missing {{% endblock %}}")));
            };
            match &token.kind {
                TokenKind::EndBlock => return Ok(nodes),
                TokenKind::Block(inner) => {
                    return Err(self.error(
                        token,
                        format!("block '{inner}' cannot be nested inside block '{name}'"),
                    ));
                }
                _ => push_node(&mut nodes, self.parse_node(token, scope)?),
            }
        }
    }

    fn parse_node(&mut self, token: &'a Token, scope: Scope<'a>) -> Result<Node> {
        match &token.kind {
            TokenKind::Text(text) => Ok(Node::AppendString(text.clone())),
            TokenKind::Expression(code) => Ok(self.expression(code)),
            TokenKind::For { variable, source } => self.parse_for(token, variable, source, scope),
            TokenKind::If(condition) => self.parse_if(token, condition, scope),
            TokenKind::ParentCall => match scope {
                Scope::Block {
                    name,
                    has_ancestor: true,
                } => Ok(Node::BlockParentCall(name.to_string())),
                Scope::Block {
                    has_ancestor: false,
                    ..
                } => Err(self.error(
                    token,
                    "parent() needs an ancestor, but this template does not extend another",
                )),
                Scope::Root => Err(self.error(token, "parent() is only allowed inside a block")),
            },
            TokenKind::Elif(_) | TokenKind::Else => Err(self.error(
                token,
                format!("'{}' without a preceding 'if'", token.kind.describe()),
            )),
            TokenKind::EndFor | TokenKind::EndIf | TokenKind::EndBlock => Err(self.error(
                token,
                format!("unexpected '{}'", token.kind.describe()),
            )),
            TokenKind::Block(name) => Err(self.error(
                token,
                format!("block '{name}' must be defined at the top level"),
            )),
            other => Err(self.error(
                token,
                format!("'{}' must appear at the top level", other.describe()),
            )),
        }
    }

    fn parse_for(&mut self, opener: &Token, variable: &str, source: &str, scope: Scope<'a>) -> Result<Node> {
        let mut nodes = Vec::new();
        loop {
            let Some(token) = self.next() else {
                return Err(self.error(opener, "'for' is missing {% endfor %}"));
            };
            match token.kind {
                TokenKind::EndFor => break,
                _ => push_node(&mut nodes, self.parse_node(token, scope)?),
            }
        }
        Ok(Node::ForEachLoop {
            source: source.to_string(),
            variable: variable.to_string(),
            nodes,
        })
    }

    fn parse_if(&mut self, opener: &Token, condition: &str, scope: Scope<'a>) -> Result<Node> {
        let mut branches = Vec::new();
        // `None` once the `else` branch has started.
        let mut condition = Some(condition.to_string());
        let mut nodes = Vec::new();
        loop {
            let Some(token) = self.next() else {
                return Err(self.error(opener, "'if' is missing {% endif %}"));
            };
            match &token.kind {
                TokenKind::EndIf => break,
                TokenKind::Elif(next) => {
                    let Some(current) = condition.take() else {
                        return Err(self.error(token, "'elif' after 'else'"));
                    };
                    branches.push((current, std::mem::take(&mut nodes)));
                    condition = Some(next.clone());
                }
                TokenKind::Else => {
                    let Some(current) = condition.take() else {
                        return Err(self.error(token, "'else' after 'else'"));
                    };
                    branches.push((current, std::mem::take(&mut nodes)));
                }
                _ => push_node(&mut nodes, self.parse_node(token, scope)?),
            }
        }

        let else_nodes = match condition {
            Some(current) => {
                branches.push((current, nodes));
                None
            }
            None => Some(nodes),
        };
        Ok(Node::Conditional {
            branches,
            else_nodes,
        })
    }

    fn expression(&mut self, code: &str) -> Node {
        let expansion = macros::expand(code, &self.macros);
        if expansion.helper.is_some() {
            self.uses_clock_helper = true;
        }
        expansion.node
    }
}

/// Appends `node`, folding consecutive literals into one.
fn push_node(nodes: &mut Vec<Node>, node: Node) {
    if let Node::AppendString(text) = &node
        && let Some(Node::AppendString(last)) = nodes.last_mut()
    {
        last.push_str(text);
        return;
    }
    nodes.push(node);
}

/// Derives the generated class name from a template path: the file name up
/// to its first dot.
pub fn class_name_for(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        return Err(CompileError::parse(
            None,
            format!("cannot derive a class name from '{}'", path.display()),
        ));
    }
    Ok(stem.to_string())
}

/// Builds the AST of one template. An extending template comes back with its
/// base unresolved; see [`crate::tpl::resolver`].
pub fn parse_tokens(tokens: &[Token], file: &Path, class_name: &str, now: DateTime<Local>) -> Result<Ast> {
    Parser::new(tokens, file, class_name, now).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tpl::lexer;

    fn parse(source: &str) -> Result<Ast> {
        let file = Path::new("views/page.tpl");
        let tokens = lexer::lex(source, file, true)?;
        parse_tokens(&tokens, file, "page", Local::now())
    }

    fn assert_parse_error(source: &str, fragment: &str) {
        match parse(source) {
            Err(CompileError::Parse { message, .. }) => {
                assert!(message.contains(fragment), "'{}' not in '{}'", fragment, message)
            }
            other => panic!("Expected Parse error for {:?}, got {:?}", source, other),
        }
    }

    #[test]
    fn test_parse_simple_text() {
        let ast = parse("Hello {{ name }}!\n").unwrap();
        assert!(ast.is_base());
        assert_eq!(
            ast.nodes(),
            &[
                Node::AppendString("Hello ".to_string()),
                Node::Expression("name".to_string()),
                Node::AppendString("!\n".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_for_loop() {
        let ast = parse("{% for item in items %}{{ item }}{% endfor %}\n").unwrap();
        assert_eq!(
            ast.nodes(),
            &[Node::ForEachLoop {
                source: "items".to_string(),
                variable: "item".to_string(),
                nodes: vec![Node::Expression("item".to_string())],
            }]
        );
    }

    #[test]
    fn test_parse_conditional_branches() {
        let source = "{% if a %}A{% elif b %}B{% else %}C{% endif %}\n";
        let ast = parse(source).unwrap();
        match &ast.nodes()[0] {
            Node::Conditional {
                branches,
                else_nodes,
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[0].0, "a");
                assert_eq!(branches[1].0, "b");
                assert_eq!(branches[1].1, vec![Node::AppendString("B".to_string())]);
                assert_eq!(
                    else_nodes.as_deref(),
                    Some(&[Node::AppendString("C".to_string())][..])
                );
            }
            other => panic!("Expected Conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_nested() {
        let source = "{% for row in rows %}\n{% if row.visible %}\n{{ row.name }}\n{% endif %}\n{% endfor %}\n";
        let ast = parse(source).unwrap();
        match &ast.nodes()[0] {
            Node::ForEachLoop { nodes, .. } => match &nodes[0] {
                Node::Conditional { branches, .. } => {
                    assert_eq!(
                        branches[0].1,
                        vec![
                            Node::Expression("row.name".to_string()),
                            Node::AppendString("\n".to_string()),
                        ]
                    );
                }
                other => panic!("Expected Conditional, got {:?}", other),
            },
            other => panic!("Expected ForEachLoop, got {:?}", other),
        }
    }

    #[test]
    fn test_base_block_leaves_call_in_body() {
        let ast = parse("<h1>\n{% block title %}\nDefault\n{% endblock %}\n</h1>\n").unwrap();
        assert_eq!(
            ast.nodes(),
            &[
                Node::AppendString("<h1>\n".to_string()),
                Node::BlockCall("title".to_string()),
                Node::AppendString("</h1>\n".to_string()),
            ]
        );
        assert_eq!(
            ast.block("title").unwrap().nodes,
            vec![Node::AppendString("Default\n".to_string())]
        );
    }

    #[test]
    fn test_declarations_attach_to_ast() {
        let source = "\
{% namespace web::views %}
{% #include <vector> %}
{% #include <vector> %}
{% #include_impl \"helpers.h\" %}
{% variable items_ Items std::vector<int> %}
{% param title std::string %}
{% init %}
items_.reserve(4);
{% endinit %}
";
        let ast = parse(source).unwrap();
        assert_eq!(ast.namespace.as_deref(), Some("web::views"));
        assert_eq!(ast.header_includes.len(), 1);
        assert!(ast.impl_includes.contains("\"helpers.h\""));
        assert_eq!(ast.variables[0].ty, "std::vector<int>");
        assert_eq!(ast.parameters[0].name, "title");
        assert_eq!(ast.code_blocks[0].code, "items_.reserve(4);\n");
        assert!(ast.nodes().is_empty());
    }

    #[test]
    fn test_extending_template() {
        let source = "{% extends base.tpl %}\n\n{% block title %}\nX {% parent() %}\n{% endblock %}\n";
        let ast = parse(source).unwrap();
        assert!(!ast.is_base());
        assert_eq!(ast.base_template(), Some("base.tpl"));
        assert!(ast.base().is_none());
        assert_eq!(
            ast.block("title").unwrap().nodes,
            vec![
                Node::AppendString("X ".to_string()),
                Node::BlockParentCall("title".to_string()),
            ]
        );
    }

    #[test]
    fn test_classname_macro_is_literal() {
        let ast = parse("<{{ __classname__ }}>\n").unwrap();
        assert_eq!(ast.nodes(), &[Node::AppendString("<page>\n".to_string())]);
    }

    #[test]
    fn test_clock_macro_marks_helper() {
        assert!(!parse("{{ __date__ }}\n").unwrap().uses_clock_helper);
        assert!(parse("{{ __current_time__ }}\n").unwrap().uses_clock_helper);
    }

    #[test]
    fn test_unbalanced_for_is_rejected() {
        assert_parse_error(
            "{% for a in x %}{% for b in y %}{% for c in z %}{% endfor %}{% endfor %}\n",
            "3 opened, 2 closed",
        );
    }

    #[test]
    fn test_unbalanced_if_in_block_is_rejected() {
        let err = parse("{% block b %}{% if x %}{% endblock %}\n").unwrap_err();
        match err {
            CompileError::Parse { location, message } => {
                assert!(location.is_none());
                assert!(message.contains("block 'b'"), "{}", message);
            }
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_interleaved_closers_are_rejected() {
        assert_parse_error("{% for a in x %}{% if y %}{% endfor %}{% endif %}\n", "unexpected 'endfor'");
    }

    #[test]
    fn test_parent_outside_block_is_rejected() {
        assert_parse_error("{% parent() %}\n", "only allowed inside a block");
    }

    #[test]
    fn test_parent_in_base_block_is_rejected() {
        assert_parse_error("{% block a %}{% parent() %}{% endblock %}\n", "does not extend");
    }

    #[test]
    fn test_free_standing_content_in_derived_is_rejected() {
        assert_parse_error(
            "{% extends base.tpl %}\nstray text\n{% block a %}{% endblock %}\n",
            "free-standing content",
        );
        assert_parse_error("{% extends base.tpl %}\n{{ x }}\n", "free-standing content");
    }

    #[test]
    fn test_else_without_if_is_rejected() {
        assert_parse_error("{% else %}\n", "without a preceding 'if'");
        assert_parse_error("{% if a %}{% else %}{% elif b %}{% endif %}\n", "'elif' after 'else'");
    }

    #[test]
    fn test_block_structure_errors() {
        assert_parse_error("{% block a %}x\n", "missing {% endblock %}");
        assert_parse_error("{% block a %}{% block b %}{% endblock %}{% endblock %}\n", "cannot be nested");
        assert_parse_error("{% block a %}{% endblock %}{% block a %}{% endblock %}\n", "defined twice");
        assert_parse_error("{% endblock %}\n", "unexpected 'endblock'");
    }

    #[test]
    fn test_nested_declaration_is_rejected() {
        assert_parse_error("{% if a %}{% param x int %}{% endif %}\n", "must appear at the top level");
    }

    #[test]
    fn test_class_name_for() {
        assert_eq!(class_name_for(Path::new("a/b/Page.html.tpl")).unwrap(), "Page");
        assert_eq!(class_name_for(Path::new("Layout")).unwrap(), "Layout");
        assert!(class_name_for(Path::new("dir/.hidden")).is_err());
    }
}
