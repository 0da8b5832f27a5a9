//! Human readable renderings of tokens, trees and compiled scopes.
//!
//! The output is stable, which makes it usable for golden files.
use crate::{
    compiler::opcode::Scope,
    lexer::Token,
    parser::ast::{part_names, Node, NodeKind, NodeVisitor},
};

/// Control characters show up as their escapes
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => escaped.push_str(r"\n"),
            '\r' => escaped.push_str(r"\r"),
            '\t' => escaped.push_str(r"\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// `NAME [text]` per token, separated by spaces
pub fn print_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| format!("{} [{}]", token.kind, escape(&token.text)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One line per statement, nested programs indented by two spaces
pub fn print_ast(node: &Node) -> String {
    let mut printer = AstPrinter::default();
    printer.visit_node(node);
    printer.out
}

#[derive(Default)]
struct AstPrinter {
    out: String,
    depth: usize,
}

impl AstPrinter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, header: &str, program: &Node) {
        self.line(header);
        self.depth += 1;
        self.visit_node(program);
        self.depth -= 1;
    }
}

impl NodeVisitor for AstPrinter {
    fn visit_mustache(&mut self, sexpr: &Node, unescaped: bool) {
        _ = unescaped;
        self.line(&format!("{{{{ {} }}}}", expression(sexpr)));
    }

    fn visit_block(&mut self, mustache: &Node, program: Option<&Node>, inverse: Option<&Node>) {
        self.line("BLOCK:");
        self.depth += 1;
        self.visit_node(mustache);
        if let Some(program) = program {
            self.nested("PROGRAM:", program);
        }
        if let Some(inverse) = inverse {
            self.nested("{{^}}", inverse);
        }
        self.depth -= 1;
    }

    fn visit_partial(&mut self, name: &Node, context: Option<&Node>, hash: Option<&Node>) {
        let mut content = expression(name);
        for extra in [context, hash].into_iter().flatten() {
            content.push(' ');
            content.push_str(&expression(extra));
        }
        self.line(&format!("{{{{> {content} }}}}"));
    }

    fn visit_content(&mut self, string: &str) {
        self.line(&format!("CONTENT[ '{}' ]", escape(string)));
    }

    fn visit_comment(&mut self, value: &str) {
        self.line(&format!("{{{{! '{}' }}}}", escape(value)));
    }
}

/// The inline form of anything that can appear inside a mustache
fn expression(node: &Node) -> String {
    match &node.kind {
        NodeKind::Sexpr { id, params, hash } => {
            let params = params.iter().map(expression).collect::<Vec<_>>().join(", ");
            let hash = hash
                .as_ref()
                .map(|hash| format!(" {}", expression(hash)))
                .unwrap_or_default();
            format!("{} [{params}]{hash}", expression(id))
        }
        NodeKind::Hash { segments } => {
            let pairs = segments.iter().map(expression).collect::<Vec<_>>().join(", ");
            format!("HASH{{{pairs}}}")
        }
        NodeKind::HashSegment { key, value } => format!("{key}={}", expression(value)),
        NodeKind::Id { parts, .. } => {
            let path = part_names(parts).join("/");
            if parts.len() > 1 {
                format!("PATH:{path}")
            } else {
                format!("ID:{path}")
            }
        }
        NodeKind::PartialName { name } => {
            format!("PARTIAL:{}", name.original().unwrap_or_default())
        }
        NodeKind::Data { id } => format!("@{}", expression(id)),
        NodeKind::String { value } => format!("\"{}\"", escape(value)),
        NodeKind::Number { value } => format!("NUMBER{{{value}}}"),
        NodeKind::Boolean { value } => format!("BOOLEAN{{{value}}}"),
        NodeKind::Mustache { sexpr, .. } => expression(sexpr),
        kind => kind.name().to_uppercase(),
    }
}

/// One opcode per line, children after their parent's opcodes
pub fn print_scope(scope: &Scope) -> String {
    let mut out = String::new();
    write_scope(&mut out, scope, 0);
    out
}

fn write_scope(out: &mut String, scope: &Scope, depth: usize) {
    let indent = "  ".repeat(depth);
    for opcode in &scope.opcodes {
        out.push_str(&format!("{indent}{opcode}\n"));
    }
    for (idx, child) in scope.children.iter().enumerate() {
        out.push_str(&format!("{indent}child {idx}:"));
        if !child.depths.is_empty() {
            let depths = child
                .depths
                .iter()
                .map(|depth| depth.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(" (depths: {depths})"));
        }
        out.push('\n');
        write_scope(out, child, depth + 1);
    }
}
