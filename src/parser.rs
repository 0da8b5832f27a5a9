//! Parsing starts where the lexer dropped off, and assembles the token stream
//! into a tree of [`Node`]s rooted at a `Program`.
//!
//! The grammar is small enough for plain recursive descent. The only place
//! that needs more than one token of lookahead is telling a hash pair
//! (`key=value`) apart from a positional path param, which takes two.
//!
//! Whitespace control runs as each program is finished (see [`whitespace`]),
//! so a successful parse always returns a tree with its strip flags applied.
use std::collections::VecDeque;

use crate::{
    error::{Error, LexError, Location, ParseError},
    lexer::{Lexer, Span, Token, TokenKind},
};

pub mod ast;
pub mod whitespace;

use ast::{Node, NodeKind, Strip};
use whitespace::{prepare_block, prepare_program, strip_comment, strip_flags};

/// Tokens that can begin a statement
const STATEMENT_START: &[TokenKind] = &[
    TokenKind::Content,
    TokenKind::Comment,
    TokenKind::Open,
    TokenKind::OpenUnescaped,
    TokenKind::OpenBlock,
    TokenKind::OpenInverse,
    TokenKind::OpenRawBlock,
    TokenKind::OpenPartial,
];

/// Tokens that can begin a param
const PARAM_START: &[TokenKind] = &[
    TokenKind::Id,
    TokenKind::String,
    TokenKind::Number,
    TokenKind::Boolean,
    TokenKind::Data,
    TokenKind::OpenSexpr,
];

pub struct Parser<'src> {
    source: &'src str,
    tokens: Lexer<'src>,
    lookahead: VecDeque<Token>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            tokens: Lexer::new(source),
            lookahead: VecDeque::with_capacity(2),
        }
    }

    /// Parse the whole template into its root `Program`
    pub fn parse(mut self) -> Result<Node, Error> {
        let mut program = self.program()?;
        if let Some(token) = self.next() {
            let mut expected = vec![TokenKind::Content];
            expected.extend_from_slice(&STATEMENT_START[1..]);
            return Err(self.unexpected(Some(token), "'EOF'", &expected));
        }

        if let Some(statements) = program.statements_mut() {
            prepare_program(statements, true);
        }
        program.span = 0..self.source.len();
        log::debug!(
            "parsed {} top level statement(s)",
            program.statements().len()
        );
        Ok(program)
    }

    fn peek_nth(&mut self, n: usize) -> Option<&Token> {
        while self.lookahead.len() <= n {
            let token = self.tokens.next()?;
            self.lookahead.push_back(token);
        }
        self.lookahead.get(n)
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.peek_nth(0).map(|token| token.kind)
    }

    fn next(&mut self) -> Option<Token> {
        match self.lookahead.pop_front() {
            Some(token) => Some(token),
            None => self.tokens.next(),
        }
    }

    fn eof_span(&self) -> Span {
        self.source.len()..self.source.len()
    }

    /// The error for finding `found` where one of `expected` should have been.
    ///
    /// Invalid tokens are reported as what they are, a lexical problem.
    fn unexpected(&self, found: Option<Token>, leading: &str, expected: &[TokenKind]) -> Error {
        let mut names: Vec<String> = Vec::with_capacity(expected.len() + 1);
        if !leading.is_empty() {
            names.push(leading.to_string());
        }
        names.extend(expected.iter().map(|kind| format!("'{}'", kind.name())));
        let names = names.join(", ");

        match found {
            Some(Token {
                kind: TokenKind::Invalid(kind),
                text,
                span,
            }) => Error::Lex(LexError {
                kind,
                text,
                location: Location::of(self.source, span.start),
                span,
            }),
            Some(token) => Error::Parse(ParseError::new(
                format!("Expecting {names}, got '{}'", token.kind.name()),
                token.span,
                self.source,
            )),
            None => Error::Parse(ParseError::new(
                format!("Expecting {names}, got 'EOF'"),
                self.eof_span(),
                self.source,
            )),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, Error> {
        match self.next() {
            Some(token) if token.kind == kind => Ok(token),
            found => Err(self.unexpected(found, "", &[kind])),
        }
    }

    fn program(&mut self) -> Result<Node, Error> {
        let mut statements = vec![];
        while let Some(kind) = self.peek_kind() {
            if !STATEMENT_START.contains(&kind) {
                break;
            }
            statements.push(self.statement()?);
        }

        let start = statements.first().map_or(0, |node| node.span.start);
        let end = statements.last().map_or(start, |node| node.span.end);
        prepare_program(&mut statements, false);
        Ok(Node::program(statements, start..end))
    }

    fn statement(&mut self) -> Result<Node, Error> {
        let Some(token) = self.next() else {
            return Err(self.unexpected(None, "", STATEMENT_START));
        };

        match token.kind {
            TokenKind::Content => Ok(Node::content(&token.text, token.span)),
            TokenKind::Comment => Ok(Node::new(
                NodeKind::Comment {
                    value: strip_comment(&token.text),
                },
                token.span,
            )
            .with_strip(strip_flags(&token.text, &token.text) | Strip::INLINE_STANDALONE)),
            TokenKind::Open | TokenKind::OpenUnescaped => self.mustache(token),
            TokenKind::OpenBlock | TokenKind::OpenInverse => self.block(token),
            TokenKind::OpenRawBlock => self.raw_block(token),
            TokenKind::OpenPartial => self.partial(token),
            _ => Err(self.unexpected(Some(token), "", STATEMENT_START)),
        }
    }

    fn mustache(&mut self, open: Token) -> Result<Node, Error> {
        let sexpr = self.sexpr()?;
        let close_kind = match open.kind {
            TokenKind::OpenUnescaped => TokenKind::CloseUnescaped,
            _ => TokenKind::Close,
        };
        let close = self.expect(close_kind)?;

        let unescaped = open.text.len() > 2 && (open.text.ends_with('{') || open.text.ends_with('&'));
        Ok(Node::new(
            NodeKind::Mustache {
                sexpr: Box::new(sexpr),
                unescaped,
            },
            open.span.start..close.span.end,
        )
        .with_strip(strip_flags(&open.text, &close.text)))
    }

    fn block(&mut self, open: Token) -> Result<Node, Error> {
        let inverted = open.kind == TokenKind::OpenInverse;
        let sexpr = self.sexpr()?;
        let open_close = self.expect(TokenKind::Close)?;
        let open_strip = strip_flags(&open.text, &open_close.text);
        let name = sexpr_name(&sexpr);
        let mustache = Node::new(
            NodeKind::Mustache {
                sexpr: Box::new(sexpr),
                unescaped: false,
            },
            open.span.start..open_close.span.end,
        )
        .with_strip(open_strip);

        let mut program = self.program()?;
        let mut inverse_and_program = match self.peek_kind() {
            Some(TokenKind::Inverse) => {
                let inverse = self.next().ok_or_else(|| self.unexpected(None, "", &[TokenKind::Inverse]))?;
                let program = self.program()?;
                Some(
                    Node::new(
                        NodeKind::InverseAndProgram {
                            program: Box::new(program),
                        },
                        inverse.span.start..self.lookahead_start(),
                    )
                    .with_strip(strip_flags(&inverse.text, &inverse.text)),
                )
            }
            _ => None,
        };

        let end_open = match self.next() {
            Some(token) if token.kind == TokenKind::OpenEndBlock => token,
            found => {
                return Err(self.unexpected(
                    found,
                    "",
                    &[TokenKind::Inverse, TokenKind::OpenEndBlock],
                ))
            }
        };
        let close_path = self.path()?;
        let end_close = self.expect(TokenKind::Close)?;
        let close_strip = strip_flags(&end_open.text, &end_close.text);

        let close_name = close_path.original().unwrap_or_default();
        if name != close_name {
            return Err(Error::Parse(ParseError::new(
                format!("{name} doesn't match {close_name}"),
                end_open.span.start..end_close.span.end,
                self.source,
            )));
        }

        let mut inverse = None;
        let mut inverse_strip = Strip::empty();
        if let Some(inverse_and_program) = &mut inverse_and_program {
            inverse_strip = inverse_and_program.strip;
            if let NodeKind::InverseAndProgram { program } = &mut inverse_and_program.kind {
                inverse = Some(program.take());
            }
        }

        let strip = prepare_block(
            &mut program,
            inverse.as_mut(),
            open_strip,
            inverse_strip,
            close_strip,
        );

        let (program, inverse) = if inverted {
            (inverse, Some(program))
        } else {
            (Some(program), inverse)
        };
        Ok(Node::new(
            NodeKind::Block {
                mustache: Box::new(mustache),
                program: program.map(Box::new),
                inverse: inverse.map(Box::new),
                close: Some(Box::new(close_path)),
                inverted,
            },
            open.span.start..end_close.span.end,
        )
        .with_strip(strip))
    }

    /// Where the next token starts, or the end of the source
    fn lookahead_start(&mut self) -> usize {
        let end = self.source.len();
        self.peek_nth(0).map_or(end, |token| token.span.start)
    }

    fn raw_block(&mut self, open: Token) -> Result<Node, Error> {
        let sexpr = self.sexpr()?;
        let open_close = self.expect(TokenKind::CloseRawBlock)?;
        let name = sexpr_name(&sexpr);

        let mut statements = vec![];
        if self.peek_kind() == Some(TokenKind::Content) {
            if let Some(content) = self.next() {
                statements.push(Node::content(&content.text, content.span));
            }
        }
        let end = match self.next() {
            Some(token) if token.kind == TokenKind::EndRawBlock => token,
            found => {
                return Err(self.unexpected(
                    found,
                    "",
                    &[TokenKind::Content, TokenKind::EndRawBlock],
                ))
            }
        };

        if name != *end.text {
            return Err(Error::Parse(ParseError::new(
                format!("{name} doesn't match {}", end.text),
                end.span,
                self.source,
            )));
        }

        let body_span = open_close.span.end..end.span.start;
        let mustache = Node::new(
            NodeKind::Mustache {
                sexpr: Box::new(sexpr),
                unescaped: false,
            },
            open.span.start..open_close.span.end,
        );
        Ok(Node::new(
            NodeKind::RawBlock {
                mustache: Box::new(mustache),
                program: Box::new(Node::program(statements, body_span)),
                close: end.text.to_string(),
            },
            open.span.start..end.span.end,
        ))
    }

    fn partial(&mut self, open: Token) -> Result<Node, Error> {
        let partial_name = self.partial_name()?;

        let context = match self.peek_kind() {
            Some(kind) if PARAM_START.contains(&kind) && !self.at_hash() => {
                Some(Box::new(self.param()?))
            }
            _ => None,
        };
        let hash = if self.at_hash() {
            Some(Box::new(self.hash()?))
        } else {
            None
        };
        let close = self.expect(TokenKind::Close)?;

        Ok(Node::new(
            NodeKind::Partial {
                partial_name: Box::new(partial_name),
                context,
                hash,
                indent: String::new(),
            },
            open.span.start..close.span.end,
        )
        .with_strip(strip_flags(&open.text, &close.text) | Strip::INLINE_STANDALONE))
    }

    fn partial_name(&mut self) -> Result<Node, Error> {
        let name = match self.peek_kind() {
            Some(TokenKind::Id) => self.path()?,
            Some(TokenKind::String | TokenKind::Number) => self.param()?,
            _ => {
                let found = self.next();
                return Err(self.unexpected(
                    found,
                    "",
                    &[TokenKind::Id, TokenKind::String, TokenKind::Number],
                ));
            }
        };
        let span = name.span.clone();
        Ok(Node::new(
            NodeKind::PartialName {
                name: Box::new(name),
            },
            span,
        ))
    }

    /// `ID EQUALS` starts a hash rather than a path param
    fn at_hash(&mut self) -> bool {
        self.peek_kind() == Some(TokenKind::Id)
            && self.peek_nth(1).map(|token| token.kind) == Some(TokenKind::Equals)
    }

    fn sexpr(&mut self) -> Result<Node, Error> {
        let id = match self.peek_kind() {
            Some(TokenKind::Data) => {
                let data = self.data_name()?;
                let span = data.span.clone();
                return Ok(Node::new(
                    NodeKind::Sexpr {
                        id: Box::new(data),
                        params: vec![],
                        hash: None,
                    },
                    span,
                ));
            }
            Some(TokenKind::Id) => self.path()?,
            _ => {
                let found = self.next();
                return Err(self.unexpected(found, "", &[TokenKind::Id, TokenKind::Data]));
            }
        };

        let mut params = vec![];
        while let Some(kind) = self.peek_kind() {
            if !PARAM_START.contains(&kind) || self.at_hash() {
                break;
            }
            params.push(self.param()?);
        }
        let hash = if self.at_hash() {
            Some(Box::new(self.hash()?))
        } else {
            None
        };

        let end = hash
            .as_ref()
            .map(|hash| hash.span.end)
            .or_else(|| params.last().map(|param| param.span.end))
            .unwrap_or(id.span.end);
        let span = id.span.start..end;
        Ok(Node::new(
            NodeKind::Sexpr {
                id: Box::new(id),
                params,
                hash,
            },
            span,
        ))
    }

    fn param(&mut self) -> Result<Node, Error> {
        let Some(kind) = self.peek_kind() else {
            return Err(self.unexpected(None, "", PARAM_START));
        };
        match kind {
            TokenKind::Id => self.path(),
            TokenKind::Data => self.data_name(),
            TokenKind::OpenSexpr => {
                let open = self.expect(TokenKind::OpenSexpr)?;
                let mut sexpr = self.sexpr()?;
                let close = self.expect(TokenKind::CloseSexpr)?;
                sexpr.span = open.span.start..close.span.end;
                Ok(sexpr)
            }
            TokenKind::String | TokenKind::Number | TokenKind::Boolean => {
                let token = self.expect(kind)?;
                let value = token.text.to_string();
                let kind = match kind {
                    TokenKind::String => NodeKind::String { value },
                    TokenKind::Number => NodeKind::Number { value },
                    _ => NodeKind::Boolean {
                        value: value == "true",
                    },
                };
                Ok(Node::new(kind, token.span))
            }
            _ => {
                let found = self.next();
                Err(self.unexpected(found, "", PARAM_START))
            }
        }
    }

    fn hash(&mut self) -> Result<Node, Error> {
        let mut segments = vec![];
        while self.at_hash() {
            let key = self.expect(TokenKind::Id)?;
            self.expect(TokenKind::Equals)?;
            let value = self.param()?;
            let span = key.span.start..value.span.end;
            segments.push(Node::new(
                NodeKind::HashSegment {
                    key: key.text.to_string(),
                    value: Box::new(value),
                },
                span,
            ));
        }

        let start = segments.first().map_or(0, |segment| segment.span.start);
        let end = segments.last().map_or(start, |segment| segment.span.end);
        Ok(Node::new(NodeKind::Hash { segments }, start..end))
    }

    fn data_name(&mut self) -> Result<Node, Error> {
        let at = self.expect(TokenKind::Data)?;
        let id = self.path()?;
        let span = at.span.start..id.span.end;
        Ok(Node::new(NodeKind::Data { id: Box::new(id) }, span))
    }

    fn path(&mut self) -> Result<Node, Error> {
        let first = self.expect(TokenKind::Id)?;
        let start = first.span.start;
        let mut end = first.span.end;
        let mut segments = vec![Node::new(
            NodeKind::PathSegment {
                separator: None,
                part: first.text.to_string(),
            },
            first.span,
        )];

        while self.peek_kind() == Some(TokenKind::Sep) {
            let separator = self.expect(TokenKind::Sep)?;
            let part = self.expect(TokenKind::Id)?;
            end = part.span.end;
            segments.push(Node::new(
                NodeKind::PathSegment {
                    separator: Some(separator.text.to_string()),
                    part: part.text.to_string(),
                },
                separator.span.start..part.span.end,
            ));
        }

        Node::id(segments, start..end)
            .map_err(|message| Error::Parse(ParseError::new(message, start..end, self.source)))
    }
}

/// The name a block must be closed with
fn sexpr_name(sexpr: &Node) -> String {
    let NodeKind::Sexpr { id, .. } = &sexpr.kind else {
        return String::new();
    };
    match &id.kind {
        NodeKind::Data { id } => format!("@{}", id.original().unwrap_or_default()),
        _ => id.original().unwrap_or_default().to_string(),
    }
}

/// Parse a template into its root `Program` node
pub fn parse(source: &str) -> Result<Node, Error> {
    Parser::new(source).parse()
}
