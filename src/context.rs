//! The legacy calling convention: failures come back as `None` and the error
//! is parked on the context until the next call.
use crate::{
    compiler::{opcode::Scope, options::CompileFlags},
    error::Error,
    lexer::Token,
    parser::ast::Node,
};

/// One template together with the error of the last failing operation on it
#[derive(Debug, Clone, Default)]
pub struct Context {
    template: String,
    last_error: Option<Error>,
}

impl Context {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            last_error: None,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// The error of the most recent call, `None` if it succeeded
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    fn record<T>(&mut self, result: Result<T, Error>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            }
            Err(err) => {
                log::debug!("{} recorded on context: {err}", err.kind());
                self.last_error = Some(err);
                None
            }
        }
    }

    pub fn lex(&mut self) -> Vec<Token> {
        self.last_error = None;
        crate::lex(&self.template)
    }

    pub fn lex_print(&mut self) -> String {
        self.last_error = None;
        crate::lex_print(&self.template)
    }

    pub fn parse(&mut self) -> Option<Node> {
        let result = crate::parse(&self.template);
        self.record(result)
    }

    pub fn parse_print(&mut self) -> Option<String> {
        let result = crate::parse_print(&self.template);
        self.record(result)
    }

    pub fn compile(&mut self, flags: CompileFlags, known_helpers: &[&str]) -> Option<Scope> {
        let result = crate::compile(&self.template, flags, known_helpers);
        self.record(result)
    }

    pub fn compile_print(&mut self, flags: CompileFlags, known_helpers: &[&str]) -> Option<String> {
        let result = crate::compile_print(&self.template, flags, known_helpers);
        self.record(result)
    }
}

#[cfg(test)]
mod tests {
    use super::Context;
    use crate::{compiler::options::CompileFlags, error::ErrorKind};
    use assert2::{check, let_assert};

    #[test]
    fn failure_parks_the_error() {
        let mut ctx = Context::new("{{#each items}}x");
        check!(ctx.parse().is_none());
        let_assert!(Some(err) = ctx.last_error());
        check!(err.kind() == ErrorKind::ParseError);
        check!(ctx.compile(CompileFlags::ALL, &[]).is_none());
        check!(ctx.last_error().is_some());
    }

    #[test]
    fn success_clears_the_error() {
        let mut ctx = Context::new("{{helper a}}");
        check!(ctx.compile(CompileFlags::KNOWN_HELPERS_ONLY, &[]).is_none());
        let_assert!(Some(err) = ctx.last_error());
        check!(err.kind() == ErrorKind::CompileError);
        check!(err.code() == 1);

        let_assert!(Some(printed) = ctx.compile_print(CompileFlags::KNOWN_HELPERS_ONLY, &["helper"]));
        check!(printed.contains("invokeKnownHelper"));
        check!(ctx.last_error().is_none());
    }

    #[test]
    fn contexts_are_independent() {
        let mut bad = Context::new("{{/foo}}");
        let mut good = Context::new("abc");
        check!(bad.parse_print().is_none());
        check!(good.parse_print().as_deref() == Some("CONTENT[ 'abc' ]\n"));
        check!(bad.last_error().is_some());
        check!(good.last_error().is_none());
        check!(good.lex_print() == "CONTENT [abc]");
        check!(good.lex().len() == 1);
    }
}
