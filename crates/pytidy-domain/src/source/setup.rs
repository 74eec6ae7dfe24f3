use rustpython_parser::ast::{self, Constant, Expr, Stmt};
use tracing::warn;

use super::visitor::{parse_module, statement_call, walk_statements, StatementSink};

/// Collects string arguments out of the build-setup call's keyword lists.
struct SetupCallSink<'a> {
    keyword: &'a str,
    values: Vec<String>,
}

impl StatementSink for SetupCallSink<'_> {
    fn on_statement(&mut self, stmt: &Stmt) {
        let Some(call) = statement_call(stmt) else {
            return;
        };
        if !is_setup_call(call) {
            return;
        }
        for keyword in &call.keywords {
            if keyword.arg.as_ref().map(ast::Identifier::as_str) != Some(self.keyword) {
                continue;
            }
            match &keyword.value {
                Expr::List(list) => {
                    self.values.extend(list.elts.iter().filter_map(string_literal));
                }
                other => {
                    if let Some(value) = string_literal(other) {
                        self.values.push(value);
                    }
                }
            }
        }
    }
}

/// The entry point is either a plain `setup(...)` call or an attribute
/// call like `setuptools.setup(...)`.
fn is_setup_call(call: &ast::ExprCall) -> bool {
    match call.func.as_ref() {
        Expr::Name(name) => name.id.as_str() == "setup",
        Expr::Attribute(attr) => attr.attr.as_str() == "setup",
        _ => false,
    }
}

fn string_literal(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Constant(constant) => match &constant.value {
            Constant::Str(value) => Some(value.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn setup_keyword_strings(source: &str, label: &str, keyword: &str) -> Vec<String> {
    let body = match parse_module(source, label) {
        Ok(body) => body,
        Err(err) => {
            warn!(file = label, %err, "could not parse build script");
            return Vec::new();
        }
    };
    let mut sink = SetupCallSink {
        keyword,
        values: Vec::new(),
    };
    walk_statements(&body, &mut sink);
    sink.values
}

/// The raw dependency strings declared by a build script's
/// `install_requires` keyword. Malformed scripts log a warning and yield
/// nothing.
#[must_use]
pub fn install_requires(source: &str, label: &str) -> Vec<String> {
    setup_keyword_strings(source, label, "install_requires")
}

/// The project name declared by a build script's `name` keyword, if any.
#[must_use]
pub fn project_name(source: &str, label: &str) -> Option<String> {
    setup_keyword_strings(source, label, "name").into_iter().next()
}
