//! Turns template source into a flat stream of [`Token`]s.
//!
//! Handlebars is modal: outside of a mustache everything is literal content,
//! inside of one there is a small expression language. Content (and raw block
//! bodies) are scanned by hand, mustache openers are matched by prefix, and the
//! expression tokens in between come from the [`MustacheToken`] logos lexer.
//!
//! The lexer never fails. Anything it cannot make sense of becomes an
//! [`TokenKind::Invalid`] token and it is up to the parser to report it.
use core::fmt;

pub use logos::Span;
use logos::{Lexer as LogosLexer, Logos};

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub enum LexErrorKind {
    #[default]
    #[error("invalid token encountered")]
    Invalid,
    #[error("unterminated comment")]
    UnterminatedComment,
}

/// Characters that may follow an identifier (or a lone `.`)
fn is_lookahead(c: char) -> bool {
    matches!(c, '=' | '~' | '}' | '/' | '.' | ')') || c.is_whitespace()
}

/// Characters that may follow a number or boolean literal
fn is_literal_lookahead(c: char) -> bool {
    matches!(c, '~' | '}' | ')') || c.is_whitespace()
}

/// Characters that can never be part of an identifier
fn is_id_char(c: char) -> bool {
    !(c.is_whitespace()
        || matches!(
            c,
            '!' | '"' | '#' | '%'..=',' | '.' | '/' | ';'..='>' | '@' | '['..='^' | '`' | '{'..='~'
        ))
}

fn unquote(lex: &mut LogosLexer<MustacheToken>, quote: char) -> Box<str> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let escaped = format!("\\{quote}");
    Box::from(inner.replace(&escaped, &quote.to_string()).as_str())
}

fn bracketed(lex: &mut LogosLexer<MustacheToken>) -> Box<str> {
    let slice = lex.slice();
    Box::from(&slice[1..slice.len() - 1])
}

fn number_fraction(lex: &mut LogosLexer<MustacheToken>) {
    // `1.5` is a number, `1.foo` is the start of a path
    if let Some(fraction) = lex.remainder().strip_prefix('.') {
        let digits = fraction.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            lex.bump(1 + digits);
        }
    }
}

/// Tokens found between the opening and closing delimiters of a mustache.
///
/// Openers are not part of this enum, the [`Lexer`] matches those itself.
#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(error = LexErrorKind)]
#[logos(skip r"\s+")]
pub enum MustacheToken {
    #[regex(r"~?\}\}")]
    Close,
    #[regex(r"\}~?\}\}")]
    CloseUnescaped,
    #[token("}}}}")]
    CloseRawBlock,
    #[token("(")]
    OpenSexpr,
    #[token(")")]
    CloseSexpr,
    #[token("=")]
    Equals,
    #[token("@")]
    Data,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("/")]
    Slash,
    #[regex(r#""(\\"|[^"])*""#, |l| unquote(l, '"'))]
    #[regex(r#"'(\\'|[^'])*'"#, |l| unquote(l, '\''))]
    String(Box<str>),
    #[regex(r"-?[0-9]+", number_fraction, priority = 3)]
    Number,
    #[token("true")]
    #[token("false")]
    Boolean,
    #[regex(r##"[^\s!"#%-,\./;->@\[-\^`\{-~]+"##)]
    Identifier,
    #[regex(r"\[[^\]]*\]", bracketed)]
    LiteralIdentifier(Box<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Content,
    Comment,
    Open,
    OpenBlock,
    OpenEndBlock,
    OpenInverse,
    Inverse,
    OpenUnescaped,
    OpenPartial,
    OpenRawBlock,
    CloseRawBlock,
    EndRawBlock,
    OpenSexpr,
    CloseSexpr,
    Close,
    CloseUnescaped,
    Id,
    Sep,
    Equals,
    Data,
    String,
    Number,
    Boolean,
    Invalid(LexErrorKind),
}

impl TokenKind {
    /// The name used by the token printer and in parse errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::Content => "CONTENT",
            Self::Comment => "COMMENT",
            Self::Open => "OPEN",
            Self::OpenBlock => "OPEN_BLOCK",
            Self::OpenEndBlock => "OPEN_ENDBLOCK",
            Self::OpenInverse => "OPEN_INVERSE",
            Self::Inverse => "INVERSE",
            Self::OpenUnescaped => "OPEN_UNESCAPED",
            Self::OpenPartial => "OPEN_PARTIAL",
            Self::OpenRawBlock => "OPEN_RAW_BLOCK",
            Self::CloseRawBlock => "CLOSE_RAW_BLOCK",
            Self::EndRawBlock => "END_RAW_BLOCK",
            Self::OpenSexpr => "OPEN_SEXPR",
            Self::CloseSexpr => "CLOSE_SEXPR",
            Self::Close => "CLOSE",
            Self::CloseUnescaped => "CLOSE_UNESCAPED",
            Self::Id => "ID",
            Self::Sep => "SEP",
            Self::Equals => "EQUALS",
            Self::Data => "DATA",
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Boolean => "BOOLEAN",
            Self::Invalid(_) => "INVALID",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tokens own their text, as escapes inside strings (and escaped mustaches)
/// mean it is not always a slice of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: Box<str>,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, text: &str, span: Span) -> Self {
        Self {
            kind,
            text: Box::from(text),
            span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Content,
    /// The content right after a `\{{`, which is literal up to the next mustache
    Escaped,
    Mustache,
    Raw,
}

/// A single pass over some template source.
///
/// Iterating yields every token up to the end of input, there is no explicit
/// EOF token.
pub struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    mode: Mode,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            src,
            pos: 0,
            mode: Mode::Content,
        }
    }

    pub fn source(&self) -> &'src str {
        self.src
    }

    fn rest(&self) -> &'src str {
        &self.src[self.pos..]
    }

    fn emit(&mut self, kind: TokenKind, text: &str, len: usize) -> Token {
        let span = self.pos..self.pos + len;
        self.pos += len;
        Token::new(kind, text, span)
    }

    fn content(&mut self) -> Option<Token> {
        let rest = self.rest();
        if rest.is_empty() {
            return None;
        }

        let Some(idx) = rest.find("{{") else {
            return Some(self.emit(TokenKind::Content, rest, rest.len()));
        };

        // `\{{` escapes a mustache, `\\{{` escapes the backslash instead
        let text = &rest[..idx];
        let text = if text.ends_with(r"\\") {
            self.mode = Mode::Mustache;
            &text[..text.len() - 1]
        } else if let Some(text) = text.strip_suffix('\\') {
            self.mode = Mode::Escaped;
            text
        } else {
            self.mode = Mode::Mustache;
            text
        };

        if text.is_empty() {
            self.pos += idx;
            return match self.mode {
                Mode::Escaped => self.escaped(),
                _ => self.mustache(),
            };
        }
        let span = self.pos..self.pos + idx;
        self.pos += idx;
        Some(Token::new(TokenKind::Content, text, span))
    }

    fn escaped(&mut self) -> Option<Token> {
        self.mode = Mode::Content;
        let rest = self.rest();
        // at least the `{{` itself is taken, then everything up to the next
        // mustache (escaped or not)
        let mut end = rest.len();
        for (idx, _) in rest.char_indices().skip(2) {
            let tail = &rest[idx..];
            if tail.starts_with("{{") || tail.starts_with(r"\{{") || tail.starts_with(r"\\{{") {
                end = idx;
                break;
            }
        }
        if end == 0 {
            return None;
        }
        Some(self.emit(TokenKind::Content, &rest[..end], end))
    }

    fn raw(&mut self) -> Option<Token> {
        let rest = self.rest();
        if rest.is_empty() {
            return None;
        }

        let mut search = 0;
        while let Some(found) = rest[search..].find("{{{{/") {
            let start = search + found;
            let name_start = start + 5;
            let name_len = rest[name_start..]
                .char_indices()
                .find(|(_, c)| !is_id_char(*c))
                .map_or(rest.len() - name_start, |(idx, _)| idx);
            let close = name_start + name_len;
            if name_len > 0 && rest[close..].starts_with("}}}}") {
                if start > 0 {
                    // hand out the body first, the closer comes on the next call
                    return Some(self.emit(TokenKind::Content, &rest[..start], start));
                }
                self.mode = Mode::Content;
                let name = &rest[name_start..close];
                return Some(self.emit(TokenKind::EndRawBlock, name, close + 4));
            }
            search = name_start;
        }

        Some(self.emit(TokenKind::Content, rest, rest.len()))
    }

    fn opener(&mut self) -> Option<Token> {
        let rest = self.rest();
        if rest.starts_with("{{{{") {
            return Some(self.emit(TokenKind::OpenRawBlock, "{{{{", 4));
        }

        let body = rest.strip_prefix("{{")?;
        let head = 2 + usize::from(body.starts_with('~'));
        let after = &rest[head..];

        if let Some(len) = standalone_inverse_len(after) {
            self.mode = Mode::Content;
            let len = head + len;
            return Some(self.emit(TokenKind::Inverse, &rest[..len], len));
        }

        let (kind, len) = match after.chars().next() {
            Some('>') => (TokenKind::OpenPartial, head + 1),
            Some('#') => (TokenKind::OpenBlock, head + 1),
            Some('/') => (TokenKind::OpenEndBlock, head + 1),
            Some('^') => (TokenKind::OpenInverse, head + 1),
            Some('{') => (TokenKind::OpenUnescaped, head + 1),
            Some('&') => (TokenKind::Open, head + 1),
            Some('!') => return Some(self.comment(head + 1)),
            _ => (TokenKind::Open, head),
        };
        Some(self.emit(kind, &rest[..len], len))
    }

    fn comment(&mut self, head: usize) -> Token {
        let rest = self.rest();
        let body = &rest[head..];
        let end = if body.starts_with("--") {
            long_comment_end(body)
        } else {
            body.find("}}").map(|idx| idx + 2)
        };

        match end {
            Some(end) => {
                self.mode = Mode::Content;
                let len = head + end;
                self.emit(TokenKind::Comment, &rest[..len], len)
            }
            None => self.emit(
                TokenKind::Invalid(LexErrorKind::UnterminatedComment),
                rest,
                rest.len(),
            ),
        }
    }

    fn mustache(&mut self) -> Option<Token> {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with("{{") {
            return self.opener();
        }

        let mut lexer = MustacheToken::lexer(trimmed);
        let token = lexer.next()?;
        let span = lexer.span();
        let slice = lexer.slice();
        let follows = trimmed[span.end..].chars().next();
        let followed_by = |check: fn(char) -> bool| follows.is_some_and(check);

        let kind = match &token {
            Ok(MustacheToken::Close) => {
                self.mode = Mode::Content;
                TokenKind::Close
            }
            Ok(MustacheToken::CloseUnescaped) => {
                self.mode = Mode::Content;
                TokenKind::CloseUnescaped
            }
            Ok(MustacheToken::CloseRawBlock) => {
                self.mode = Mode::Raw;
                TokenKind::CloseRawBlock
            }
            Ok(MustacheToken::OpenSexpr) => TokenKind::OpenSexpr,
            Ok(MustacheToken::CloseSexpr) => TokenKind::CloseSexpr,
            Ok(MustacheToken::Equals) => TokenKind::Equals,
            Ok(MustacheToken::Data) => TokenKind::Data,
            Ok(MustacheToken::DotDot) => TokenKind::Id,
            Ok(MustacheToken::Dot) if followed_by(is_lookahead) => TokenKind::Id,
            Ok(MustacheToken::Dot | MustacheToken::Slash) => TokenKind::Sep,
            Ok(MustacheToken::String(text)) => {
                let text = text.clone();
                return Some(self.emit(TokenKind::String, &text, span.end));
            }
            Ok(MustacheToken::LiteralIdentifier(text)) => {
                let text = text.clone();
                return Some(self.emit(TokenKind::Id, &text, span.end));
            }
            Ok(MustacheToken::Number) if followed_by(is_literal_lookahead) => TokenKind::Number,
            Ok(MustacheToken::Number) if slice.contains('.') => {
                // `1.5x` is the path `1`, `5x`
                let whole = slice.split_once('.').map_or(slice, |(whole, _)| whole);
                return Some(self.emit(TokenKind::Id, whole, span.start + whole.len()));
            }
            Ok(MustacheToken::Boolean) if followed_by(is_literal_lookahead) => TokenKind::Boolean,
            Ok(MustacheToken::Identifier | MustacheToken::Number | MustacheToken::Boolean)
                if followed_by(is_lookahead) =>
            {
                TokenKind::Id
            }
            Ok(MustacheToken::Identifier | MustacheToken::Number | MustacheToken::Boolean) => {
                TokenKind::Invalid(LexErrorKind::Invalid)
            }
            Err(err) => TokenKind::Invalid(*err),
        };

        Some(self.emit(kind, slice, span.end))
    }
}

/// Length of a `^}}` or `else }}` tail (after the `{{~?`), if `after` is one
fn standalone_inverse_len(after: &str) -> Option<usize> {
    let (body, lead) = match after.strip_prefix('^') {
        Some(body) => (body, 1),
        None => {
            let trimmed = after.trim_start();
            let ws = after.len() - trimmed.len();
            (trimmed.strip_prefix("else")?, ws + 4)
        }
    };
    let trimmed = body.trim_start();
    let len = lead + body.len() - trimmed.len();
    let (trimmed, len) = match trimmed.strip_prefix('~') {
        Some(trimmed) => (trimmed, len + 1),
        None => (trimmed, len),
    };
    trimmed.starts_with("}}").then_some(len + 2)
}

/// Finds the end of a `{{!-- ... --}}` comment, `body` starts at the dashes.
fn long_comment_end(body: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(idx) = body[offset..].find("--") {
        let dashes_end = offset + idx + 2;
        let tail = &body[dashes_end..];
        if tail.starts_with("}}") {
            return Some(dashes_end + 2);
        }
        if tail.starts_with("~}}") {
            return Some(dashes_end + 3);
        }
        offset += idx + 1;
    }
    None
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = match self.mode {
            Mode::Content => self.content(),
            Mode::Escaped => self.escaped(),
            Mode::Mustache => self.mustache(),
            Mode::Raw => self.raw(),
        }?;
        log::trace!("lexed {} [{}] at {:?}", token.kind, token.text, token.span);
        Some(token)
    }
}

/// Lex an entire template
pub fn lex(src: &str) -> Vec<Token> {
    Lexer::new(src).collect()
}

#[cfg(test)]
mod tests {
    use super::{lex, LexErrorKind, MustacheToken, TokenKind};
    use arbtest::arbtest;
    use assert2::{check, let_assert};
    use logos::Logos;

    fn tokens(src: &str) -> Vec<(&'static str, String)> {
        lex(src)
            .into_iter()
            .map(|tok| (tok.kind.name(), tok.text.to_string()))
            .collect()
    }

    macro_rules! expect_tokens {
        ($source:expr => [$($kind:literal $text:literal),* $(,)?]) => {{
            let expected: Vec<(&'static str, String)> = vec![$(($kind, $text.to_string())),*];
            check!(tokens($source) == expected);
        }};
    }

    #[test]
    fn simple_mustache() {
        expect_tokens!("{{foo}}" => ["OPEN" "{{", "ID" "foo", "CLOSE" "}}"]);
        expect_tokens!("{{&bar}}" => ["OPEN" "{{&", "ID" "bar", "CLOSE" "}}"]);
        expect_tokens!("{{{bar}}}" => ["OPEN_UNESCAPED" "{{{", "ID" "bar", "CLOSE_UNESCAPED" "}}}"]);
        expect_tokens!("{{~foo~}}" => ["OPEN" "{{~", "ID" "foo", "CLOSE" "~}}"]);
        expect_tokens!("{{~{foo}~}}" => ["OPEN_UNESCAPED" "{{~{", "ID" "foo", "CLOSE_UNESCAPED" "}~}}"]);
    }

    #[test]
    fn paths() {
        expect_tokens!("{{foo.bar}}" => ["OPEN" "{{", "ID" "foo", "SEP" ".", "ID" "bar", "CLOSE" "}}"]);
        expect_tokens!("{{foo/bar}}" => ["OPEN" "{{", "ID" "foo", "SEP" "/", "ID" "bar", "CLOSE" "}}"]);
        expect_tokens!("{{../foo}}" => ["OPEN" "{{", "ID" "..", "SEP" "/", "ID" "foo", "CLOSE" "}}"]);
        expect_tokens!("{{.}}" => ["OPEN" "{{", "ID" ".", "CLOSE" "}}"]);
        expect_tokens!("{{./foo}}" => ["OPEN" "{{", "ID" ".", "SEP" "/", "ID" "foo", "CLOSE" "}}"]);
        expect_tokens!("{{this/foo}}" => ["OPEN" "{{", "ID" "this", "SEP" "/", "ID" "foo", "CLOSE" "}}"]);
        expect_tokens!("{{[foo bar]}}" => ["OPEN" "{{", "ID" "foo bar", "CLOSE" "}}"]);
    }

    #[test]
    fn escaped_mustaches() {
        expect_tokens!(r"{{foo}} \{{bar}} {{baz}}" => [
            "OPEN" "{{", "ID" "foo", "CLOSE" "}}",
            "CONTENT" " ",
            "CONTENT" "{{bar}} ",
            "OPEN" "{{", "ID" "baz", "CLOSE" "}}",
        ]);
        expect_tokens!(r"{{foo}} \\{{bar}} {{baz}}" => [
            "OPEN" "{{", "ID" "foo", "CLOSE" "}}",
            "CONTENT" r" \",
            "OPEN" "{{", "ID" "bar", "CLOSE" "}}",
            "CONTENT" " ",
            "OPEN" "{{", "ID" "baz", "CLOSE" "}}",
        ]);
        expect_tokens!(r"\{{foo}}" => ["CONTENT" "{{foo}}"]);
    }

    #[test]
    fn blocks_and_inverses() {
        expect_tokens!("{{#foo}}content{{/foo}}" => [
            "OPEN_BLOCK" "{{#", "ID" "foo", "CLOSE" "}}",
            "CONTENT" "content",
            "OPEN_ENDBLOCK" "{{/", "ID" "foo", "CLOSE" "}}",
        ]);
        expect_tokens!("{{^}}" => ["INVERSE" "{{^}}"]);
        expect_tokens!("{{else}}" => ["INVERSE" "{{else}}"]);
        expect_tokens!("{{ else ~}}" => ["INVERSE" "{{ else ~}}"]);
        expect_tokens!("{{^foo}}" => ["OPEN_INVERSE" "{{^", "ID" "foo", "CLOSE" "}}"]);
        expect_tokens!("{{elsewhere}}" => ["OPEN" "{{", "ID" "elsewhere", "CLOSE" "}}"]);
    }

    #[test]
    fn comments() {
        expect_tokens!("foo {{! this is a comment }} bar" => [
            "CONTENT" "foo ",
            "COMMENT" "{{! this is a comment }}",
            "CONTENT" " bar",
        ]);
        expect_tokens!("{{!-- a {{foo}} --}}" => ["COMMENT" "{{!-- a {{foo}} --}}"]);
        expect_tokens!("{{!--}}" => ["COMMENT" "{{!--}}"]);
        expect_tokens!("{{~!-- x --~}}" => ["COMMENT" "{{~!-- x --~}}"]);

        let tokens = lex("{{!-- never closed");
        let_assert!([token] = tokens.as_slice());
        check!(token.kind == TokenKind::Invalid(LexErrorKind::UnterminatedComment));
    }

    #[test]
    fn partials() {
        expect_tokens!("{{> foo}}" => ["OPEN_PARTIAL" "{{>", "ID" "foo", "CLOSE" "}}"]);
        expect_tokens!("{{> foo bar }}" => ["OPEN_PARTIAL" "{{>", "ID" "foo", "ID" "bar", "CLOSE" "}}"]);
    }

    #[test]
    fn params_and_literals() {
        expect_tokens!(r#"{{ foo "bar\"baz" 'qux' }}"# => [
            "OPEN" "{{", "ID" "foo", "STRING" "bar\"baz", "STRING" "qux", "CLOSE" "}}",
        ]);
        expect_tokens!("{{ foo 1 -1 1.5 true false }}" => [
            "OPEN" "{{", "ID" "foo", "NUMBER" "1", "NUMBER" "-1", "NUMBER" "1.5",
            "BOOLEAN" "true", "BOOLEAN" "false", "CLOSE" "}}",
        ]);
        expect_tokens!("{{ foo 1.bar trueish }}" => [
            "OPEN" "{{", "ID" "foo", "ID" "1", "SEP" ".", "ID" "bar", "ID" "trueish", "CLOSE" "}}",
        ]);
        expect_tokens!("{{foo 1.5x}}" => [
            "OPEN" "{{", "ID" "foo", "ID" "1", "SEP" ".", "ID" "5x", "CLOSE" "}}",
        ]);
        expect_tokens!("{{foo 1.5.bar}}" => [
            "OPEN" "{{", "ID" "foo", "ID" "1", "SEP" ".", "ID" "5", "SEP" ".", "ID" "bar", "CLOSE" "}}",
        ]);
        expect_tokens!("{{foo bar=baz}}" => [
            "OPEN" "{{", "ID" "foo", "ID" "bar", "EQUALS" "=", "ID" "baz", "CLOSE" "}}",
        ]);
        expect_tokens!("{{foo @bar}}" => [
            "OPEN" "{{", "ID" "foo", "DATA" "@", "ID" "bar", "CLOSE" "}}",
        ]);
        expect_tokens!("{{foo (bar 1)}}" => [
            "OPEN" "{{", "ID" "foo", "OPEN_SEXPR" "(", "ID" "bar", "NUMBER" "1", "CLOSE_SEXPR" ")", "CLOSE" "}}",
        ]);
    }

    #[test]
    fn raw_blocks() {
        expect_tokens!("{{{{raw}}}} {{test}} {{{{/raw}}}}" => [
            "OPEN_RAW_BLOCK" "{{{{", "ID" "raw", "CLOSE_RAW_BLOCK" "}}}}",
            "CONTENT" " {{test}} ",
            "END_RAW_BLOCK" "raw",
        ]);
        expect_tokens!("{{{{raw}}}}{{{{/raw}}}}" => [
            "OPEN_RAW_BLOCK" "{{{{", "ID" "raw", "CLOSE_RAW_BLOCK" "}}}}",
            "END_RAW_BLOCK" "raw",
        ]);
    }

    #[test]
    fn invalid_input() {
        let tokens = lex("{{foo}");
        let_assert!(Some(last) = tokens.last());
        check!(last.kind == TokenKind::Invalid(LexErrorKind::Invalid));
        check!(MustacheToken::lexer("`").next() == Some(Err(LexErrorKind::Invalid)));
    }

    #[test]
    fn spans_cover_source() {
        let src = "a {{#b c=1}}d{{/b}}";
        for token in lex(src) {
            check!(token.span.end <= src.len());
            check!(token.span.start < token.span.end);
        }
    }

    #[test]
    fn lexing_is_pure() {
        arbtest(|u| {
            let src: String = u.arbitrary()?;
            check!(lex(&src) == lex(&src));
            Ok(())
        });
    }
}
