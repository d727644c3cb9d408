//! Human and machine readable views of a parsed template, used by `--dump`.

use crate::Result;
use crate::error::CompileError;
use crate::tpl::ast::{Ast, Node};

fn dump_nodes(out: &mut String, nodes: &[Node], indent: usize) {
    for node in nodes {
        dump_node(out, node, indent);
    }
}

fn dump_node(out: &mut String, node: &Node, indent: usize) {
    let tabs = "\t".repeat(indent);
    match node {
        Node::AppendString(data) => {
            out.push_str(&format!("{tabs}|- AppendString ({} bytes)\n", data.len()))
        }
        Node::Expression(code) => {
            out.push_str(&format!("{tabs}|- Expression ({} bytes code)\n", code.len()))
        }
        Node::BlockCall(name) => out.push_str(&format!("{tabs}|- BlockCall {name}\n")),
        Node::BlockParentCall(name) => {
            out.push_str(&format!("{tabs}|- BlockParentCall {name}\n"))
        }
        Node::ForEachLoop {
            source,
            variable,
            nodes,
        } => {
            out.push_str(&format!("{tabs}|- ForEachLoop {variable} in {source}\n"));
            dump_nodes(out, nodes, indent + 1);
        }
        Node::Conditional {
            branches,
            else_nodes,
        } => {
            out.push_str(&format!("{tabs}|- ConditionNode\n"));
            for (condition, nodes) in branches {
                out.push_str(&format!("{tabs}\tif {condition}\n"));
                dump_nodes(out, nodes, indent + 1);
            }
            if let Some(nodes) = else_nodes {
                out.push_str(&format!("{tabs}\telse\n"));
                dump_nodes(out, nodes, indent + 1);
            }
        }
    }
}

fn dump_one(out: &mut String, ast: &Ast) {
    out.push_str(&format!("Filename:     {}\n", ast.filename.display()));
    let kind = if ast.is_base() { "Base" } else { "Extending" };
    out.push_str(&format!("Type:         {kind}\n"));
    if let Some(base) = ast.base_template() {
        out.push_str(&format!("Basetemplate: {base}\n"));
    }
    out.push_str(&format!(
        "Namespace:    {}\n",
        ast.namespace.as_deref().unwrap_or("")
    ));
    out.push_str(&format!("Classname:    {}\n", ast.class_name));

    out.push_str("Includes (Header):\n");
    for include in &ast.header_includes {
        out.push_str(&format!("\t{include}\n"));
    }
    out.push_str("Includes (Implementation):\n");
    for include in &ast.impl_includes {
        out.push_str(&format!("\t{include}\n"));
    }
    out.push_str("Codeblocks:\n");
    for block in &ast.code_blocks {
        out.push_str(&format!("\t{} {} bytes\n", block.hook, block.code.len()));
    }
    out.push_str("Variables:\n");
    for var in &ast.variables {
        out.push_str(&format!("\t{} ({}) {}\n", var.name, var.accessor, var.ty));
    }
    out.push_str("Parameters:\n");
    for param in &ast.parameters {
        out.push_str(&format!("\t{} {}\n", param.name, param.ty));
    }
    out.push_str("Blocks:\n");
    for block in &ast.blocks {
        out.push_str(&format!("\t{}\n", block.name));
        dump_nodes(out, &block.nodes, 2);
    }
    if ast.is_base() {
        out.push_str("Base block:\n");
        dump_nodes(out, ast.nodes(), 1);
    }
}

/// Text dump of `ast` followed by each resolved ancestor.
pub fn to_text(ast: &Ast) -> String {
    let mut out = String::new();
    for (idx, template) in ast.chain().enumerate() {
        if idx > 0 {
            out.push_str("\n--- base template ---\n");
        }
        dump_one(&mut out, template);
    }
    out
}

/// The whole resolved AST as pretty-printed JSON.
pub fn to_json(ast: &Ast) -> Result<String> {
    serde_json::to_string_pretty(ast)
        .map_err(|e| CompileError::Generate(format!("cannot serialize AST: {e}")))
}
