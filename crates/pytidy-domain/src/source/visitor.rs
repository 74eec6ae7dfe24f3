use rustpython_parser::ast::{self, ExceptHandler, Stmt};
use rustpython_parser::{parse, Mode, ParseError};

/// Pluggable handler invoked once per statement while walking a module's
/// syntax tree. The walker owns the recursion; sinks only inspect.
pub trait StatementSink {
    fn on_statement(&mut self, stmt: &Stmt);
}

/// Parse `source` as a module and return its top-level statement list.
///
/// # Errors
///
/// Returns the parser's error when the source is not valid Python.
pub fn parse_module(source: &str, label: &str) -> Result<Vec<Stmt>, ParseError> {
    match parse(source, Mode::Module, label)? {
        ast::Mod::Module(module) => Ok(module.body),
        _ => Ok(Vec::new()),
    }
}

/// Walk every statement in `body`, depth first, feeding each one to
/// `sink`. Compound statements (functions, classes, conditionals, loops,
/// try blocks, with blocks, match arms) are entered so nested imports and
/// calls are seen too.
pub fn walk_statements(body: &[Stmt], sink: &mut dyn StatementSink) {
    for stmt in body {
        visit(stmt, sink);
    }
}

fn visit(stmt: &Stmt, sink: &mut dyn StatementSink) {
    sink.on_statement(stmt);

    match stmt {
        Stmt::FunctionDef(inner) => walk_statements(&inner.body, sink),
        Stmt::AsyncFunctionDef(inner) => walk_statements(&inner.body, sink),
        Stmt::ClassDef(inner) => walk_statements(&inner.body, sink),
        Stmt::If(inner) => {
            walk_statements(&inner.body, sink);
            walk_statements(&inner.orelse, sink);
        }
        Stmt::While(inner) => {
            walk_statements(&inner.body, sink);
            walk_statements(&inner.orelse, sink);
        }
        Stmt::For(inner) => {
            walk_statements(&inner.body, sink);
            walk_statements(&inner.orelse, sink);
        }
        Stmt::AsyncFor(inner) => {
            walk_statements(&inner.body, sink);
            walk_statements(&inner.orelse, sink);
        }
        Stmt::With(inner) => walk_statements(&inner.body, sink),
        Stmt::AsyncWith(inner) => walk_statements(&inner.body, sink),
        Stmt::Try(inner) => {
            walk_statements(&inner.body, sink);
            for handler in &inner.handlers {
                let ExceptHandler::ExceptHandler(handler) = handler;
                walk_statements(&handler.body, sink);
            }
            walk_statements(&inner.orelse, sink);
            walk_statements(&inner.finalbody, sink);
        }
        Stmt::TryStar(inner) => {
            walk_statements(&inner.body, sink);
            for handler in &inner.handlers {
                let ExceptHandler::ExceptHandler(handler) = handler;
                walk_statements(&handler.body, sink);
            }
            walk_statements(&inner.orelse, sink);
            walk_statements(&inner.finalbody, sink);
        }
        Stmt::Match(inner) => {
            for case in &inner.cases {
                walk_statements(&case.body, sink);
            }
        }
        _ => {}
    }
}

/// The call expression carried by a statement, if it carries one in a
/// position that matters for build-script scanning: a bare expression
/// statement, an assignment's right-hand side, or a return value.
#[must_use]
pub fn statement_call(stmt: &Stmt) -> Option<&ast::ExprCall> {
    let expr = match stmt {
        Stmt::Expr(inner) => inner.value.as_ref(),
        Stmt::Assign(inner) => inner.value.as_ref(),
        Stmt::Return(inner) => inner.value.as_deref()?,
        _ => return None,
    };
    match expr {
        ast::Expr::Call(call) => Some(call),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        imports: usize,
        calls: usize,
    }

    impl StatementSink for Counter {
        fn on_statement(&mut self, stmt: &Stmt) {
            if matches!(stmt, Stmt::Import(_) | Stmt::ImportFrom(_)) {
                self.imports += 1;
            }
            if statement_call(stmt).is_some() {
                self.calls += 1;
            }
        }
    }

    #[test]
    fn walker_enters_nested_bodies() {
        let source = r#"
import os

def fetch():
    import requests
    try:
        return requests.get("x")
    except Exception:
        import urllib.request

class Client:
    if True:
        from json import loads
"#;
        let body = parse_module(source, "<test>").unwrap();
        let mut counter = Counter {
            imports: 0,
            calls: 0,
        };
        walk_statements(&body, &mut counter);
        assert_eq!(counter.imports, 4);
        assert_eq!(counter.calls, 1);
    }
}
