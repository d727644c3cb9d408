//! Compile-time rewriting of the magic `{{ __name__ }}` expressions.

use chrono::{DateTime, Local};

use crate::tpl::ast::Node;

const TIME_FORMAT: &str = "%X";
const DATE_FORMAT: &str = "%b %d %Y";
const DATETIME_FORMAT: &str = "%b %d %Y %X";

/// Generated support code an expression depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Helper {
    /// `static std::string strlocaltime(time_t, const char*)`
    ClockFormat,
}

/// What an expression becomes, plus any helper the result needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub node: Node,
    pub helper: Option<Helper>,
}

impl Expansion {
    fn plain(node: Node) -> Self {
        Self { node, helper: None }
    }
}

/// Inputs that are frozen for one compilation.
#[derive(Debug, Clone)]
pub struct MacroContext<'a> {
    pub class_name: &'a str,
    pub now: DateTime<Local>,
}

fn clock_call(format: &str) -> Expansion {
    Expansion {
        node: Node::Expression(format!(
            "strlocaltime(std::chrono::system_clock::to_time_t(std::chrono::system_clock::now()), \"{format}\")"
        )),
        helper: Some(Helper::ClockFormat),
    }
}

/// Rewrites one expression. Unknown code passes through unchanged.
pub fn expand(code: &str, ctx: &MacroContext) -> Expansion {
    let frozen = |format: &str| Expansion::plain(Node::AppendString(ctx.now.format(format).to_string()));

    match code.trim() {
        "__compile_time__" => frozen(TIME_FORMAT),
        "__compile_date__" => frozen(DATE_FORMAT),
        "__compile_datetime__" => frozen(DATETIME_FORMAT),
        "__date__" => Expansion::plain(Node::Expression("__DATE__".to_string())),
        "__time__" => Expansion::plain(Node::Expression("__TIME__".to_string())),
        "__datetime__" => Expansion::plain(Node::Expression(
            "std::string(__DATE__) + \" \" + __TIME__".to_string(),
        )),
        "__current_time__" => clock_call(TIME_FORMAT),
        "__current_date__" => clock_call(DATE_FORMAT),
        "__current_datetime__" => clock_call(DATETIME_FORMAT),
        "__classname__" => Expansion::plain(Node::AppendString(ctx.class_name.to_string())),
        _ => Expansion::plain(Node::Expression(code.to_string())),
    }
}
