use crate::Result;
use crate::codegen::Class;
use crate::codegen::render::{CodeWriter, render_nodes};
use crate::tpl::ast::Ast;
use crate::tpl::token::Hook;

const CLOCK_HELPER_BODY: &str = "\
\tstruct tm t;
\tstd::string s;
#ifdef _WIN32
\tlocaltime_s(&t, &time);
#else
\tlocaltime_r(&time, &t);
#endif
\ts.resize(80);
\ts.resize(std::strftime((char*)s.data(), s.size(), fmt, &t));
\treturn s;
";

/// Emits the class definition (`.cpp`) of `ast`.
pub fn generate_source(ast: &Ast) -> Result<String> {
    emit(&Class::new(ast)?)
}

fn hook_body(w: &mut CodeWriter, class: &Class, hook: Hook) {
    if let Some(block) = class.ast.code_block(hook) {
        w.code_lines(&block.code);
    }
}

/// Opens a member definition body.
fn open_method(w: &mut CodeWriter, signature: String) {
    w.line(signature);
    w.line("{");
    w.indent();
}

fn close_method(w: &mut CodeWriter) {
    w.dedent();
    w.line("}");
    w.blank();
}

pub(crate) fn emit(class: &Class) -> Result<String> {
    let ast = class.ast;
    let name = class.name();
    let mut w = CodeWriter::new();

    w.line(format!("#include \"{name}.h\""));
    for include in &ast.impl_includes {
        w.line(format!("#include {include}"));
    }
    let mut implied = Vec::new();
    if ast.uses_clock_helper || class.emits_clock_helper {
        implied.push("<chrono>");
    }
    implied.extend(["<typeinfo>", "<stdexcept>"]);
    for include in implied {
        if !ast.impl_includes.contains(include) {
            w.line(format!("#include {include}"));
        }
    }

    let namespaces = ast.namespace_segments();
    for ns in &namespaces {
        w.line(format!("namespace {ns} {{"));
    }
    w.blank();

    w.line(format!("{name}::{name}()"));
    w.line("{");
    hook_body(&mut w, class, Hook::Init);
    w.line("}");
    w.blank();

    w.line(format!("{name}::~{name}()"));
    w.line("{");
    hook_body(&mut w, class, Hook::Deinit);
    w.line("}");
    w.blank();

    if class.is_root() {
        open_method(&mut w, format!("std::string {name}::render(base_params& p) const"));
        w.line("std::string res;");
        w.line("this->render(res, p);");
        w.line("return res;");
        close_method(&mut w);

        open_method(
            &mut w,
            format!("void {name}::render(std::string& str, base_params& p) const"),
        );
        w.line("if(typeid(p) != get_param_type()) throw std::invalid_argument(\"invalid param struct\");");
        for param in &ast.parameters {
            w.line(format!("auto& {0} = p.{0};", param.name));
        }
        w.line("this->prerender(p);");
        render_nodes(&mut w, ast.nodes(), class)?;
        w.line("this->postrender(p);");
        close_method(&mut w);
    }

    open_method(&mut w, format!("const std::type_info& {name}::get_param_type() const"));
    w.line(format!("return typeid({name}::params);"));
    close_method(&mut w);

    for hook in [Hook::Prerender, Hook::Postrender] {
        w.line(format!("void {name}::{hook}(base_params& p) const"));
        w.line("{");
        match (ast.code_block(hook), class.base) {
            (Some(_), _) => hook_body(&mut w, class, hook),
            // Keep the ancestor's hook running when this class adds none.
            (None, Some(base)) => w.line(format!("\t{}::{hook}(p);", class.qualify(base))),
            (None, None) => {}
        }
        w.line("}");
        w.blank();
    }

    for block in &ast.blocks {
        open_method(
            &mut w,
            format!(
                "void {name}::renderBlock_{}(std::string& str, base_params& p) const",
                block.name
            ),
        );
        if class.is_root() {
            for param in &ast.parameters {
                w.line(format!("auto& {0} = p.{0};", param.name));
            }
        } else {
            let params = class.chain_parameters();
            if !params.is_empty() {
                w.line("auto& derived_p = dynamic_cast<params&>(p);");
            }
            for param in params {
                w.line(format!("auto& {0} = derived_p.{0};", param.name));
            }
        }
        render_nodes(&mut w, &block.nodes, class)?;
        close_method(&mut w);
    }

    if class.emits_clock_helper {
        w.line(format!(
            "std::string {name}::strlocaltime(time_t time, const char* fmt) {{"
        ));
        w.raw(CLOCK_HELPER_BODY);
        w.line("}");
    }

    for ns in namespaces.iter().rev() {
        w.line(format!("}} // namespace {ns}"));
    }
    Ok(w.finish())
}
