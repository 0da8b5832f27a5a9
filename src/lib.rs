//! Compiles Handlebars templates down to the opcode stream a Handlebars
//! runtime executes, one program scope at a time.
//!
//! ```
//! use hbsc::{compile_print, CompileFlags};
//!
//! let printed = compile_print("{{name}}", CompileFlags::NONE, &[]).unwrap();
//! assert!(printed.starts_with("getContext[LONG:0]"));
//! ```
pub mod compiler;
pub mod context;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod printer;

pub use compiler::{
    opcode::{Depths, Opcode, OpcodeKind, Operand, Scope},
    options::{CompileFlags, CompileOptions, KnownHelpers, BUILTIN_HELPERS},
};
pub use context::Context;
pub use error::{CompileError, CompileErrorCode, Error, ErrorKind, LexError, ParseError};
pub use lexer::{Span, Token, TokenKind};
pub use parser::ast::{Node, NodeKind, Strip};

pub fn lex(template: &str) -> Vec<Token> {
    lexer::lex(template)
}

pub fn lex_print(template: &str) -> String {
    printer::print_tokens(&lex(template))
}

pub fn parse(template: &str) -> Result<Node, Error> {
    parser::parse(template)
}

pub fn parse_print(template: &str) -> Result<String, Error> {
    parse(template).map(|program| printer::print_ast(&program))
}

pub fn compile(template: &str, flags: CompileFlags, known_helpers: &[&str]) -> Result<Scope, Error> {
    let program = parse(template)?;
    let options = CompileOptions::new(flags).with_known_helpers(known_helpers.iter().copied());
    Ok(compiler::compile(&program, &options)?)
}

pub fn compile_print(
    template: &str,
    flags: CompileFlags,
    known_helpers: &[&str],
) -> Result<String, Error> {
    compile(template, flags, known_helpers).map(|scope| printer::print_scope(&scope))
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
