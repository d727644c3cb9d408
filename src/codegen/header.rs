use crate::Result;
use crate::codegen::Class;
use crate::codegen::render::CodeWriter;
use crate::tpl::ast::Ast;

/// Emits the class declaration (`.h`) of `ast`.
pub fn generate_header(ast: &Ast) -> Result<String> {
    Ok(emit(&Class::new(ast)?))
}

pub(crate) fn emit(class: &Class) -> String {
    let ast = class.ast;
    let name = class.name();
    let mut w = CodeWriter::new();

    w.line("#pragma once");
    if let Some(base) = class.base {
        w.line(format!("#include \"{}.h\"", base.class_name));
    }
    for include in &ast.header_includes {
        w.line(format!("#include {include}"));
    }
    let mut implied = vec!["<string>"];
    if class.is_root() {
        implied.extend(["<typeinfo>", "<ctime>"]);
    }
    for include in implied {
        if !ast.header_includes.contains(include) {
            w.line(format!("#include {include}"));
        }
    }

    let namespaces = ast.namespace_segments();
    for ns in &namespaces {
        w.line(format!("namespace {ns} {{"));
    }

    let base_ref = class.base.map(|base| class.qualify(base));
    match &base_ref {
        Some(base) => w.line(format!("class {name} : public {base}")),
        None => w.line(format!("class {name}")),
    }
    w.line("{");
    w.indent();
    w.line("public:");
    w.indent();

    match &base_ref {
        Some(base) if ast.parameters.is_empty() => {
            w.line(format!("typedef {base}::params params;"));
        }
        _ => {
            w.line("struct params");
            if let Some(base) = &base_ref {
                w.line(format!("\t: {base}::params"));
            }
            w.line("{");
            w.indent();
            if class.is_root() {
                w.line("virtual ~params() {}");
            }
            for param in &ast.parameters {
                w.line(format!("{} {};", param.ty, param.name));
            }
            w.dedent();
            w.line("};");
        }
    }
    if class.is_root() {
        w.line("typedef struct params base_params;");
    }
    w.blank();

    w.line(format!("{name}();"));
    w.line(format!("virtual ~{name}();"));
    if class.is_root() {
        w.line("std::string render(base_params& p) const;");
        w.line("void render(std::string& str, base_params& p) const;");
    }
    w.blank();

    for var in &ast.variables {
        w.line(format!(
            "void set{}({} {}) {{ this->{} = {}; }}",
            var.accessor, var.ty, var.name, var.name, var.name
        ));
        w.line(format!(
            "{} get{}() const {{ return this->{}; }}",
            var.ty, var.accessor, var.name
        ));
    }

    w.dedent();
    w.line("protected:");
    w.indent();
    for var in &ast.variables {
        w.line(format!("{} {}; // {}", var.ty, var.name, var.accessor));
    }
    w.blank();

    w.line("virtual const std::type_info& get_param_type() const;");
    w.line("virtual void prerender(base_params& p) const;");
    w.line("virtual void postrender(base_params& p) const;");
    for block in &ast.blocks {
        w.line(format!(
            "virtual void renderBlock_{}(std::string& str, base_params& p) const;",
            block.name
        ));
    }
    if class.emits_clock_helper {
        w.line("static std::string strlocaltime(time_t time, const char* fmt);");
    }

    w.dedent();
    w.dedent();
    w.line("};");
    for ns in namespaces.iter().rev() {
        w.line(format!("}} // namespace {ns}"));
    }
    w.finish()
}
