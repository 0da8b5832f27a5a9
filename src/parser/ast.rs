//! The abstract syntax tree the parser produces and the compiler consumes.
//!
//! Every node owns its children. Derived facts about paths and expressions
//! (depth, simplicity, helper eligibility) are computed once while the tree is
//! built, so later passes never need to look at the token stream again.
use core::mem;

use crate::lexer::Span;

bitflags::bitflags! {
    /// Whitespace control facts about a node
    ///
    /// `LEFT`/`RIGHT` come from explicit `~` markers, the standalone flags are
    /// candidacies that the parent program confirms, and the `*_STRIPPED`
    /// flags record that a content node already lost whitespace on that side.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Strip: u8 {
        const LEFT = 1;
        const RIGHT = 1 << 1;
        const OPEN_STANDALONE = 1 << 2;
        const CLOSE_STANDALONE = 1 << 3;
        const INLINE_STANDALONE = 1 << 4;
        const LEFT_STRIPPED = 1 << 5;
        const RIGHT_STRIPPED = 1 << 6;
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum NodeKind {
    Program {
        statements: Vec<Node>,
    },
    Mustache {
        sexpr: Box<Node>,
        unescaped: bool,
    },
    /// An id followed by positional params and an optional hash
    Sexpr {
        id: Box<Node>,
        params: Vec<Node>,
        hash: Option<Box<Node>>,
    },
    Partial {
        partial_name: Box<Node>,
        context: Option<Box<Node>>,
        hash: Option<Box<Node>>,
        /// Whitespace in front of a standalone partial
        indent: String,
    },
    RawBlock {
        mustache: Box<Node>,
        program: Box<Node>,
        close: String,
    },
    /// For inverted blocks (`{{^foo}}`) the main body is stored as `inverse`
    /// and the else section (if any) as `program`.
    Block {
        mustache: Box<Node>,
        program: Option<Box<Node>>,
        inverse: Option<Box<Node>>,
        close: Option<Box<Node>>,
        inverted: bool,
    },
    /// `string` is what remains after whitespace control, `original` is untouched
    Content {
        string: String,
        original: String,
    },
    Hash {
        segments: Vec<Node>,
    },
    HashSegment {
        key: String,
        value: Box<Node>,
    },
    Id {
        parts: Vec<Node>,
        depth: usize,
        is_simple: bool,
        is_scoped: bool,
        id_name: String,
        string: String,
        original: String,
    },
    PartialName {
        name: Box<Node>,
    },
    Data {
        id: Box<Node>,
    },
    String {
        value: String,
    },
    Number {
        value: String,
    },
    Boolean {
        value: bool,
    },
    Comment {
        value: String,
    },
    PathSegment {
        separator: Option<String>,
        part: String,
    },
    InverseAndProgram {
        program: Box<Node>,
    },
    #[default]
    Nil,
}

impl NodeKind {
    /// Name of the variant as the compiler reports it (and as string params
    /// carry it at runtime)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Program { .. } => "program",
            Self::Mustache { .. } => "mustache",
            Self::Sexpr { .. } => "sexpr",
            Self::Partial { .. } => "partial",
            Self::RawBlock { .. } => "raw_block",
            Self::Block { .. } => "block",
            Self::Content { .. } => "content",
            Self::Hash { .. } => "hash",
            Self::HashSegment { .. } => "hash_segment",
            Self::Id { .. } => "ID",
            Self::PartialName { .. } => "partial_name",
            Self::Data { .. } => "DATA",
            Self::String { .. } => "STRING",
            Self::Number { .. } => "NUMBER",
            Self::Boolean { .. } => "BOOLEAN",
            Self::Comment { .. } => "comment",
            Self::PathSegment { .. } => "path_segment",
            Self::InverseAndProgram { .. } => "inverse_and_program",
            Self::Nil => "nil",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub strip: Strip,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            strip: Strip::empty(),
            span,
        }
    }

    pub fn with_strip(mut self, strip: Strip) -> Self {
        self.strip = strip;
        self
    }

    pub fn program(statements: Vec<Node>, span: Span) -> Self {
        Self::new(NodeKind::Program { statements }, span)
    }

    pub fn content(text: &str, span: Span) -> Self {
        Self::new(
            NodeKind::Content {
                string: text.to_string(),
                original: text.to_string(),
            },
            span,
        )
    }

    /// Build an id out of `PathSegment` nodes.
    ///
    /// `..`, `.` and `this` only make sense in front of the named segments,
    /// anywhere else the path is rejected with an `Invalid path` message.
    pub fn id(segments: Vec<Node>, span: Span) -> Result<Self, String> {
        let segment_count = segments.len();
        let mut original = String::new();
        let mut parts = Vec::with_capacity(segment_count);
        let mut depth = 0;
        let mut depth_string = String::new();
        let mut is_scoped = false;

        for segment in segments {
            let NodeKind::PathSegment { separator, part } = &segment.kind else {
                return Err(format!(
                    "Invalid path segment: {}",
                    segment.kind.name()
                ));
            };
            if let Some(separator) = separator {
                original.push_str(separator);
            }
            original.push_str(part);

            let parent = part == "..";
            let special = parent || part == "." || part == "this";
            if !special {
                parts.push(segment);
            } else if !parts.is_empty() {
                return Err(format!("Invalid path: {original}"));
            } else if parent {
                depth += 1;
                depth_string.push_str("../");
            } else {
                is_scoped = true;
            }
        }

        let string = part_names(&parts).join(".");
        Ok(Self::new(
            NodeKind::Id {
                is_simple: segment_count == 1 && !is_scoped && depth == 0,
                id_name: format!("{depth_string}{string}"),
                parts,
                depth,
                is_scoped,
                string,
                original,
            },
            span,
        ))
    }

    /// Move this node out, leaving a [`NodeKind::Nil`] in its place
    pub fn take(&mut self) -> Node {
        let nil = Node::new(NodeKind::Nil, self.span.clone());
        mem::replace(self, nil)
    }

    /// The source text of an id or literal, as a partial name uses it
    pub fn original(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Id { original, .. } => Some(original),
            NodeKind::String { value } | NodeKind::Number { value } => Some(value),
            NodeKind::PartialName { name } => name.original(),
            _ => None,
        }
    }

    /// Path depth of ids and data references, 0 for everything else
    pub fn depth(&self) -> usize {
        match &self.kind {
            NodeKind::Id { depth, .. } => *depth,
            NodeKind::Data { id } => id.depth(),
            _ => 0,
        }
    }

    pub fn is_simple_id(&self) -> bool {
        matches!(self.kind, NodeKind::Id { is_simple: true, .. })
    }

    /// A sexpr is definitely a helper call if it passes anything
    pub fn is_helper(&self) -> bool {
        match &self.kind {
            NodeKind::Sexpr { params, hash, .. } => !params.is_empty() || hash.is_some(),
            _ => false,
        }
    }

    /// A sexpr may be a helper call if it is one, or if its id is a bare name
    pub fn is_eligible_helper(&self) -> bool {
        match &self.kind {
            NodeKind::Sexpr { id, .. } => self.is_helper() || id.is_simple_id(),
            _ => false,
        }
    }

    pub fn statements(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Program { statements } => statements,
            _ => &[],
        }
    }

    pub fn statements_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.kind {
            NodeKind::Program { statements } => Some(statements),
            _ => None,
        }
    }
}

pub(crate) fn part_names(parts: &[Node]) -> Vec<String> {
    parts
        .iter()
        .filter_map(|part| match &part.kind {
            NodeKind::PathSegment { part, .. } => Some(part.clone()),
            _ => None,
        })
        .collect()
}

/// Walks a tree of [`Node`]s, with a method per variant that does nothing by
/// default.
pub trait NodeVisitor {
    fn visit_node(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Program { statements } => self.visit_program(node, statements),
            NodeKind::Mustache { sexpr, unescaped } => self.visit_mustache(sexpr, *unescaped),
            NodeKind::Sexpr { id, params, hash } => {
                self.visit_sexpr(id, params, hash.as_deref())
            }
            NodeKind::Partial {
                partial_name,
                context,
                hash,
                ..
            } => self.visit_partial(partial_name, context.as_deref(), hash.as_deref()),
            NodeKind::RawBlock {
                mustache, program, ..
            } => self.visit_block(mustache, Some(program), None),
            NodeKind::Block {
                mustache,
                program,
                inverse,
                ..
            } => self.visit_block(mustache, program.as_deref(), inverse.as_deref()),
            NodeKind::Content { string, .. } => self.visit_content(string),
            NodeKind::Hash { segments } => self.visit_hash(segments),
            NodeKind::HashSegment { key, value } => self.visit_hash_segment(key, value),
            NodeKind::Id { parts, .. } => self.visit_id(node, parts),
            NodeKind::PartialName { name } => self.visit_partial_name(name),
            NodeKind::Data { id } => self.visit_data(id),
            NodeKind::String { value } => self.visit_string(value),
            NodeKind::Number { value } => self.visit_number(value),
            NodeKind::Boolean { value } => self.visit_boolean(*value),
            NodeKind::Comment { value } => self.visit_comment(value),
            NodeKind::PathSegment { part, .. } => self.visit_path_segment(part),
            NodeKind::InverseAndProgram { program } => self.visit_node(program),
            NodeKind::Nil => {}
        }
    }

    fn visit_program(&mut self, program: &Node, statements: &[Node]) {
        _ = program;
        for statement in statements {
            self.visit_node(statement);
        }
    }

    fn visit_mustache(&mut self, sexpr: &Node, unescaped: bool) {
        _ = sexpr;
        _ = unescaped;
    }

    fn visit_sexpr(&mut self, id: &Node, params: &[Node], hash: Option<&Node>) {
        _ = id;
        _ = params;
        _ = hash;
    }

    fn visit_partial(&mut self, name: &Node, context: Option<&Node>, hash: Option<&Node>) {
        _ = name;
        _ = context;
        _ = hash;
    }

    fn visit_block(&mut self, mustache: &Node, program: Option<&Node>, inverse: Option<&Node>) {
        _ = mustache;
        _ = program;
        _ = inverse;
    }

    fn visit_content(&mut self, string: &str) {
        _ = string;
    }

    fn visit_hash(&mut self, segments: &[Node]) {
        _ = segments;
    }

    fn visit_hash_segment(&mut self, key: &str, value: &Node) {
        _ = key;
        _ = value;
    }

    fn visit_id(&mut self, id: &Node, parts: &[Node]) {
        _ = id;
        _ = parts;
    }

    fn visit_partial_name(&mut self, name: &Node) {
        _ = name;
    }

    fn visit_data(&mut self, id: &Node) {
        _ = id;
    }

    fn visit_string(&mut self, value: &str) {
        _ = value;
    }

    fn visit_number(&mut self, value: &str) {
        _ = value;
    }

    fn visit_boolean(&mut self, value: bool) {
        _ = value;
    }

    fn visit_comment(&mut self, value: &str) {
        _ = value;
    }

    fn visit_path_segment(&mut self, part: &str) {
        _ = part;
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, NodeKind, NodeVisitor};
    use assert2::{check, let_assert};

    fn path(segments: &[(Option<&str>, &str)]) -> Result<Node, String> {
        let segments = segments
            .iter()
            .map(|(separator, part)| {
                Node::new(
                    NodeKind::PathSegment {
                        separator: separator.map(str::to_string),
                        part: part.to_string(),
                    },
                    0..0,
                )
            })
            .collect();
        Node::id(segments, 0..0)
    }

    #[test]
    fn simple_ids() {
        let_assert!(Ok(id) = path(&[(None, "foo")]));
        let_assert!(
            NodeKind::Id {
                depth: 0,
                is_simple: true,
                is_scoped: false,
                string,
                original,
                id_name,
                parts,
            } = &id.kind
        );
        check!(parts.len() == 1);
        check!(string == "foo");
        check!(original == "foo");
        check!(id_name == "foo");
    }

    #[test]
    fn scoped_and_parent_ids() {
        let_assert!(Ok(id) = path(&[(None, ".."), (Some("/"), ".."), (Some("/"), "foo"), (Some("."), "bar")]));
        let_assert!(NodeKind::Id { depth, is_simple, string, original, id_name, .. } = &id.kind);
        check!(*depth == 2);
        check!(!is_simple);
        check!(string == "foo.bar");
        check!(original == "../../foo.bar");
        check!(id_name == "../../foo.bar");

        let_assert!(Ok(id) = path(&[(None, "this")]));
        let_assert!(NodeKind::Id { is_scoped: true, is_simple: false, parts, .. } = &id.kind);
        check!(parts.is_empty());
    }

    #[test]
    fn invalid_paths() {
        check!(path(&[(None, "foo"), (Some("/"), "..")]) == Err("Invalid path: foo/..".to_string()));
        check!(path(&[(None, "foo"), (Some("."), "this")]) == Err("Invalid path: foo.this".to_string()));
    }

    #[test]
    fn helper_eligibility() {
        let_assert!(Ok(simple) = path(&[(None, "foo")]));
        let_assert!(Ok(complex) = path(&[(None, "foo"), (Some("."), "bar")]));
        let sexpr = |id: Node, params: Vec<Node>| {
            Node::new(
                NodeKind::Sexpr {
                    id: Box::new(id),
                    params,
                    hash: None,
                },
                0..0,
            )
        };
        let param = Node::new(NodeKind::Number { value: "1".into() }, 0..0);

        check!(!sexpr(simple.clone(), vec![]).is_helper());
        check!(sexpr(simple.clone(), vec![]).is_eligible_helper());
        check!(!sexpr(complex.clone(), vec![]).is_eligible_helper());
        check!(sexpr(complex, vec![param.clone()]).is_helper());
        check!(sexpr(simple, vec![param]).is_eligible_helper());
    }

    #[test]
    fn take_leaves_nil() {
        let mut node = Node::content("x", 3..4);
        let taken = node.take();
        check!(node.kind == NodeKind::Nil);
        check!(node.span == (3..4));
        check!(taken == Node::content("x", 3..4));
    }

    #[test]
    fn default_visitor_walks_programs() {
        struct Counter(usize);
        impl NodeVisitor for Counter {
            fn visit_content(&mut self, string: &str) {
                self.0 += string.len();
            }
        }

        let program = Node::program(vec![Node::content("ab", 0..2), Node::content("c", 2..3)], 0..3);
        let mut counter = Counter(0);
        counter.visit_node(&program);
        check!(counter.0 == 3);
    }
}
