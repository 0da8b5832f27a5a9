//! Compile a parsed template into opcodes
//! for a runtime to execute.
//!
//! Every program becomes a [`Scope`]; block bodies and inverses become child
//! scopes that the parent refers to by index through `pushProgram`.
//!
//! For example:
//!
//! {{#each items}}{{name}}{{/each}}
//!
//! compiles to
//!
//! getContext[LONG:0]
//! lookupOnContext[ARRAY:items][BOOLEAN:false][BOOLEAN:false]
//! pushProgram[LONG:0]
//! pushProgram[NULL]
//! emptyHash
//! invokeKnownHelper[LONG:1][STRING:each]
//! append
//! child 0:
//!   getContext[LONG:0]
//!   pushProgram[NULL]
//!   pushProgram[NULL]
//!   getContext[LONG:0]
//!   lookupOnContext[ARRAY:name][BOOLEAN:false][BOOLEAN:false]
//!   invokeAmbiguous[STRING:name][BOOLEAN:false]
//!   appendEscaped
//!
//! `each` is a builtin, so it is bound statically. `name` could be a helper or
//! a property, which only the runtime can tell, so it is looked up
//! ambiguously.
use crate::{
    error::CompileError,
    lexer::Span,
    parser::ast::{part_names, Node, NodeKind},
};

pub mod opcode;
pub mod options;

use opcode::{Opcode, OpcodeKind, Operand, Scope};
use options::{CompileFlags, CompileOptions};

/// How a sexpr gets resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SexprClass {
    /// A plain value lookup
    Simple,
    /// Either a helper or a value, decided at runtime
    Ambiguous,
    /// A helper call
    Helper,
}

/// Lowers one program into one [`Scope`]
pub struct Compiler<'opts> {
    options: &'opts CompileOptions,
    scope: Scope,
}

impl<'opts> Compiler<'opts> {
    pub fn compile(program: &Node, options: &'opts CompileOptions) -> Result<Scope, CompileError> {
        let mut compiler = Self {
            options,
            scope: Scope::default(),
        };
        compiler.program(program)?;
        log::debug!(
            "compiled scope: {} opcode(s), {} child(ren), depths {:?}",
            compiler.scope.opcodes.len(),
            compiler.scope.children.len(),
            compiler.scope.depths.iter().collect::<Vec<_>>()
        );
        Ok(compiler.scope)
    }

    fn flags(&self) -> CompileFlags {
        self.options.flags
    }

    fn opcode(&mut self, kind: OpcodeKind, operands: Vec<Operand>) {
        self.scope.opcodes.push(Opcode::new(kind, operands));
    }

    fn add_depth(&mut self, depth: usize, span: &Span) -> Result<(), CompileError> {
        if !self.flags().tracks_depths() {
            return Ok(());
        }
        if self.scope.depths.insert(depth) {
            Ok(())
        } else {
            Err(CompileError::depth_overflow(depth, span.clone()))
        }
    }

    fn program(&mut self, program: &Node) -> Result<(), CompileError> {
        let NodeKind::Program { statements } = &program.kind else {
            return Err(unexpected("program", program));
        };
        for statement in statements {
            self.statement(statement)?;
        }
        self.scope.is_simple = statements.len() == 1;
        Ok(())
    }

    /// Compile a nested program into a new child scope, returning its index
    fn compile_program(&mut self, program: &Node) -> Result<usize, CompileError> {
        let child = Compiler::compile(program, self.options)?;
        let guid = self.scope.children.len();

        self.scope.use_partial |= child.use_partial;
        self.scope.use_data |= child.use_data;
        // what is two levels up from the child is one level up from here
        for depth in child.depths.iter().filter(|depth| *depth >= 2) {
            self.add_depth(depth - 1, &program.span)?;
        }

        self.scope.children.push(child);
        Ok(guid)
    }

    fn statement(&mut self, statement: &Node) -> Result<(), CompileError> {
        match &statement.kind {
            NodeKind::Mustache { sexpr, unescaped } => {
                self.sexpr(sexpr)?;
                let kind = if *unescaped {
                    OpcodeKind::Append
                } else {
                    OpcodeKind::AppendEscaped
                };
                self.opcode(kind, vec![]);
                Ok(())
            }
            NodeKind::Block {
                mustache,
                program,
                inverse,
                ..
            } => self.block(mustache, program.as_deref(), inverse.as_deref()),
            NodeKind::RawBlock {
                mustache, program, ..
            } => self.block(mustache, Some(program), None),
            NodeKind::Partial {
                partial_name,
                context,
                hash,
                indent,
            } => self.partial(partial_name, context.as_deref(), hash.as_deref(), indent),
            NodeKind::Content { string, .. } => {
                if !string.is_empty() {
                    self.opcode(OpcodeKind::AppendContent, vec![string.as_str().into()]);
                }
                Ok(())
            }
            NodeKind::Comment { .. } => Ok(()),
            _ => Err(unexpected("statement", statement)),
        }
    }

    fn block(
        &mut self,
        mustache: &Node,
        program: Option<&Node>,
        inverse: Option<&Node>,
    ) -> Result<(), CompileError> {
        let NodeKind::Mustache { sexpr, .. } = &mustache.kind else {
            return Err(unexpected("mustache", mustache));
        };
        let program = program.map(|program| self.compile_program(program)).transpose()?;
        let inverse = inverse.map(|inverse| self.compile_program(inverse)).transpose()?;

        match self.classify(sexpr) {
            SexprClass::Helper => self.helper_sexpr(sexpr, program, inverse)?,
            SexprClass::Simple => {
                self.simple_sexpr(sexpr)?;
                self.opcode(OpcodeKind::PushProgram, vec![program.into()]);
                self.opcode(OpcodeKind::PushProgram, vec![inverse.into()]);
                self.opcode(OpcodeKind::EmptyHash, vec![]);
                self.opcode(OpcodeKind::BlockValue, vec![sexpr_original(sexpr).into()]);
            }
            SexprClass::Ambiguous => {
                self.ambiguous_sexpr(sexpr, program, inverse)?;
                self.opcode(OpcodeKind::PushProgram, vec![program.into()]);
                self.opcode(OpcodeKind::PushProgram, vec![inverse.into()]);
                self.opcode(OpcodeKind::EmptyHash, vec![]);
                self.opcode(OpcodeKind::AmbiguousBlockValue, vec![]);
            }
        }
        self.opcode(OpcodeKind::Append, vec![]);
        Ok(())
    }

    fn partial(
        &mut self,
        name: &Node,
        context: Option<&Node>,
        hash: Option<&Node>,
        indent: &str,
    ) -> Result<(), CompileError> {
        self.scope.use_partial = true;

        match hash {
            Some(hash) => self.hash(hash)?,
            None => self.opcode(OpcodeKind::Push, vec!["undefined".into()]),
        }
        match context {
            Some(context) => self.value(context)?,
            None => {
                self.opcode(OpcodeKind::GetContext, vec![0usize.into()]);
                self.opcode(OpcodeKind::PushContext, vec![]);
            }
        }

        let Some(name) = name.original() else {
            return Err(unexpected("partial name", name));
        };
        self.opcode(OpcodeKind::InvokePartial, vec![name.into(), indent.into()]);
        self.opcode(OpcodeKind::Append, vec![]);
        Ok(())
    }

    fn classify(&self, sexpr: &Node) -> SexprClass {
        let mut is_helper = sexpr.is_helper();
        let mut is_eligible = sexpr.is_eligible_helper();

        // a bare name might still be known to be a helper
        if is_eligible && !is_helper {
            if let Some(name) = simple_name(sexpr) {
                if self.options.known_helpers.contains(name) {
                    is_helper = true;
                } else if self.flags().contains(CompileFlags::KNOWN_HELPERS_ONLY) {
                    is_eligible = false;
                }
            }
        }

        if is_helper {
            SexprClass::Helper
        } else if is_eligible {
            SexprClass::Ambiguous
        } else {
            SexprClass::Simple
        }
    }

    fn sexpr(&mut self, sexpr: &Node) -> Result<(), CompileError> {
        match self.classify(sexpr) {
            SexprClass::Simple => self.simple_sexpr(sexpr),
            SexprClass::Helper => self.helper_sexpr(sexpr, None, None),
            SexprClass::Ambiguous => self.ambiguous_sexpr(sexpr, None, None),
        }
    }

    fn simple_sexpr(&mut self, sexpr: &Node) -> Result<(), CompileError> {
        let id = sexpr_id(sexpr)?;
        match &id.kind {
            NodeKind::Data { .. } => self.data(id)?,
            NodeKind::Id { parts, depth, .. } if parts.is_empty() => {
                // `this`, `.` or `..`
                self.add_depth(*depth, &id.span)?;
                self.opcode(OpcodeKind::GetContext, vec![(*depth).into()]);
                self.opcode(OpcodeKind::PushContext, vec![]);
            }
            NodeKind::Id { .. } => self.id(id, false)?,
            _ => return Err(unexpected("ID or DATA", id)),
        }
        self.opcode(OpcodeKind::ResolvePossibleLambda, vec![]);
        Ok(())
    }

    fn ambiguous_sexpr(
        &mut self,
        sexpr: &Node,
        program: Option<usize>,
        inverse: Option<usize>,
    ) -> Result<(), CompileError> {
        let id = sexpr_id(sexpr)?;
        let Some(name) = simple_name(sexpr) else {
            return Err(unexpected("simple ID", id));
        };
        let is_block = program.is_some() || inverse.is_some();

        self.opcode(OpcodeKind::GetContext, vec![id.depth().into()]);
        self.opcode(OpcodeKind::PushProgram, vec![program.into()]);
        self.opcode(OpcodeKind::PushProgram, vec![inverse.into()]);
        self.id(id, false)?;
        self.opcode(OpcodeKind::InvokeAmbiguous, vec![name.into(), is_block.into()]);
        Ok(())
    }

    fn helper_sexpr(
        &mut self,
        sexpr: &Node,
        program: Option<usize>,
        inverse: Option<usize>,
    ) -> Result<(), CompileError> {
        let id = sexpr_id(sexpr)?;
        let param_count = self.setup_full_mustache_params(sexpr, program, inverse)?;

        match simple_name(sexpr) {
            Some(name) if self.options.known_helpers.contains(name) => {
                self.opcode(
                    OpcodeKind::InvokeKnownHelper,
                    vec![param_count.into(), name.into()],
                );
            }
            name if self.flags().contains(CompileFlags::KNOWN_HELPERS_ONLY) => {
                let name = name.map_or_else(|| sexpr_original(sexpr), str::to_string);
                return Err(CompileError::unknown_helper(&name, sexpr.span.clone()));
            }
            _ => {
                let NodeKind::Id {
                    original,
                    is_simple,
                    ..
                } = &id.kind
                else {
                    return Err(unexpected("ID", id));
                };
                self.id(id, true)?;
                self.opcode(
                    OpcodeKind::InvokeHelper,
                    vec![
                        param_count.into(),
                        original.as_str().into(),
                        (*is_simple).into(),
                    ],
                );
            }
        }
        Ok(())
    }

    /// Push params, programs and hash of a helper call, returning the param count
    fn setup_full_mustache_params(
        &mut self,
        sexpr: &Node,
        program: Option<usize>,
        inverse: Option<usize>,
    ) -> Result<usize, CompileError> {
        let NodeKind::Sexpr { params, hash, .. } = &sexpr.kind else {
            return Err(unexpected("sexpr", sexpr));
        };

        for param in params {
            self.push_param(param)?;
        }
        self.opcode(OpcodeKind::PushProgram, vec![program.into()]);
        self.opcode(OpcodeKind::PushProgram, vec![inverse.into()]);
        match hash {
            Some(hash) => self.hash(hash)?,
            None => self.opcode(OpcodeKind::EmptyHash, vec![]),
        }
        Ok(params.len())
    }

    fn hash(&mut self, hash: &Node) -> Result<(), CompileError> {
        let NodeKind::Hash { segments } = &hash.kind else {
            return Err(unexpected("hash", hash));
        };

        self.opcode(OpcodeKind::PushHash, vec![]);
        let mut keys = Vec::with_capacity(segments.len());
        for segment in segments {
            let NodeKind::HashSegment { key, value } = &segment.kind else {
                return Err(unexpected("hash segment", segment));
            };
            self.push_param(value)?;
            keys.push(key);
        }
        for key in keys.into_iter().rev() {
            self.opcode(OpcodeKind::AssignToHash, vec![key.as_str().into()]);
        }
        self.opcode(OpcodeKind::PopHash, vec![]);
        Ok(())
    }

    fn push_param(&mut self, param: &Node) -> Result<(), CompileError> {
        let type_name = param.kind.name();

        if self.flags().contains(CompileFlags::STRING_PARAMS) {
            let depth = match &param.kind {
                NodeKind::Id { depth, .. } => *depth,
                _ => 0,
            };
            self.add_depth(depth, &param.span)?;
            self.opcode(OpcodeKind::GetContext, vec![depth.into()]);
            self.opcode(
                OpcodeKind::PushStringParam,
                vec![string_mode_value(param)?, type_name.into()],
            );
            if matches!(param.kind, NodeKind::Sexpr { .. }) {
                self.sexpr(param)?;
            }
            return Ok(());
        }

        if self.flags().contains(CompileFlags::TRACK_IDS) {
            let name = match &param.kind {
                NodeKind::Id { id_name, .. } => Operand::from(id_name.as_str()),
                NodeKind::Data { id } => match &id.kind {
                    NodeKind::Id { string, .. } => Operand::from(format!("@{string}")),
                    _ => return Err(unexpected("ID", id)),
                },
                NodeKind::Sexpr { .. } => Operand::Null,
                _ => string_mode_value(param)?,
            };
            self.opcode(OpcodeKind::PushId, vec![type_name.into(), name]);
        }
        self.value(param)
    }

    /// Push the value of a param (or partial context)
    fn value(&mut self, value: &Node) -> Result<(), CompileError> {
        match &value.kind {
            NodeKind::Id { .. } => self.id(value, false),
            NodeKind::Data { .. } => self.data(value),
            NodeKind::Sexpr { .. } => self.sexpr(value),
            NodeKind::String { value } => {
                self.opcode(OpcodeKind::PushString, vec![value.as_str().into()]);
                Ok(())
            }
            NodeKind::Number { value } => {
                self.opcode(OpcodeKind::PushLiteral, vec![value.as_str().into()]);
                Ok(())
            }
            NodeKind::Boolean { value } => {
                self.opcode(OpcodeKind::PushLiteral, vec![value.to_string().into()]);
                Ok(())
            }
            _ => Err(unexpected("param", value)),
        }
    }

    fn id(&mut self, id: &Node, falsy: bool) -> Result<(), CompileError> {
        let NodeKind::Id {
            parts,
            depth,
            is_scoped,
            ..
        } = &id.kind
        else {
            return Err(unexpected("ID", id));
        };

        self.add_depth(*depth, &id.span)?;
        self.opcode(OpcodeKind::GetContext, vec![(*depth).into()]);
        if parts.is_empty() {
            // context reference, as in `{{foo .}}` or `{{foo ..}}`
            self.opcode(OpcodeKind::PushContext, vec![]);
        } else {
            self.opcode(
                OpcodeKind::LookupOnContext,
                vec![
                    part_names(parts).into(),
                    falsy.into(),
                    (*is_scoped).into(),
                ],
            );
        }
        Ok(())
    }

    fn data(&mut self, data: &Node) -> Result<(), CompileError> {
        let NodeKind::Data { id } = &data.kind else {
            return Err(unexpected("DATA", data));
        };
        let NodeKind::Id { parts, depth, .. } = &id.kind else {
            return Err(unexpected("ID", id));
        };

        self.scope.use_data = true;
        self.opcode(
            OpcodeKind::LookupData,
            vec![(*depth).into(), part_names(parts).into()],
        );
        Ok(())
    }
}

fn unexpected(expected: &str, found: &Node) -> CompileError {
    CompileError::unexpected_node(expected, found.kind.name(), found.span.clone())
}

fn sexpr_id(sexpr: &Node) -> Result<&Node, CompileError> {
    match &sexpr.kind {
        NodeKind::Sexpr { id, .. } => Ok(id),
        _ => Err(unexpected("sexpr", sexpr)),
    }
}

/// The name of a sexpr whose id is a single plain segment
fn simple_name(sexpr: &Node) -> Option<&str> {
    let NodeKind::Sexpr { id, .. } = &sexpr.kind else {
        return None;
    };
    match &id.kind {
        NodeKind::Id {
            is_simple: true,
            string,
            ..
        } => Some(string),
        _ => None,
    }
}

fn sexpr_original(sexpr: &Node) -> String {
    let NodeKind::Sexpr { id, .. } = &sexpr.kind else {
        return String::new();
    };
    match &id.kind {
        NodeKind::Data { id } => format!("@{}", id.original().unwrap_or_default()),
        _ => id.original().unwrap_or_default().to_string(),
    }
}

/// What a param looks like when passed as a string
fn string_mode_value(param: &Node) -> Result<Operand, CompileError> {
    Ok(match &param.kind {
        NodeKind::Id { string, .. } => string.as_str().into(),
        NodeKind::Data { id } => match &id.kind {
            NodeKind::Id { string, .. } => string.as_str().into(),
            _ => return Err(unexpected("ID", id)),
        },
        NodeKind::String { value } | NodeKind::Number { value } => value.as_str().into(),
        NodeKind::Boolean { value } => (*value).into(),
        NodeKind::Sexpr { .. } => sexpr_original(param).into(),
        _ => return Err(unexpected("param", param)),
    })
}

/// Compile a parsed `Program` node
pub fn compile(program: &Node, options: &CompileOptions) -> Result<Scope, CompileError> {
    Compiler::compile(program, options)
}

#[cfg(test)]
mod tests {
    use super::{
        compile,
        opcode::{Depths, OpcodeKind, Operand, Scope},
        options::{CompileFlags, CompileOptions},
    };
    use crate::{
        error::CompileErrorCode,
        parser::{ast::Node, parse},
    };
    use arbtest::arbtest;
    use assert2::{check, let_assert};

    fn compile_with(src: &str, flags: CompileFlags, helpers: &[&str]) -> Result<Scope, super::CompileError> {
        let_assert!(Ok(program) = parse(src));
        let options = CompileOptions::new(flags).with_known_helpers(helpers.iter().copied());
        compile(&program, &options)
    }

    fn kinds(scope: &Scope) -> Vec<&'static str> {
        scope.opcodes.iter().map(|opcode| opcode.kind.name()).collect()
    }

    #[test]
    fn content_and_comments() {
        let_assert!(Ok(scope) = compile_with("a{{! b }}c", CompileFlags::NONE, &[]));
        check!(kinds(&scope) == ["appendContent", "appendContent"]);
        check!(scope.opcodes[0].operands == [Operand::from("a")]);
        check!(!scope.is_simple);
    }

    #[test]
    fn simple_lookups() {
        let_assert!(Ok(scope) = compile_with("{{foo.bar}}", CompileFlags::NONE, &[]));
        check!(kinds(&scope) == ["getContext", "lookupOnContext", "resolvePossibleLambda", "appendEscaped"]);
        check!(scope.opcodes[1].operands == [
            Operand::Array(vec!["foo".into(), "bar".into()]),
            Operand::Boolean(false),
            Operand::Boolean(false),
        ]);
        check!(scope.is_simple);

        let_assert!(Ok(scope) = compile_with("{{{this}}}", CompileFlags::NONE, &[]));
        check!(kinds(&scope) == ["getContext", "pushContext", "resolvePossibleLambda", "append"]);
    }

    #[test]
    fn ambiguous_lookups() {
        let_assert!(Ok(scope) = compile_with("{{foo}}", CompileFlags::NONE, &[]));
        check!(kinds(&scope) == [
            "getContext", "pushProgram", "pushProgram", "getContext", "lookupOnContext",
            "invokeAmbiguous", "appendEscaped",
        ]);
        check!(scope.opcodes[5].operands == [Operand::from("foo"), Operand::Boolean(false)]);

        // not known and only known helpers allowed, so it is a plain value
        let_assert!(Ok(scope) = compile_with("{{foo}}", CompileFlags::KNOWN_HELPERS_ONLY, &[]));
        check!(kinds(&scope) == ["getContext", "lookupOnContext", "resolvePossibleLambda", "appendEscaped"]);
    }

    #[test]
    fn known_helpers() {
        let_assert!(Err(err) = compile_with("{{helper a}}", CompileFlags::KNOWN_HELPERS_ONLY, &[]));
        check!(err.code == CompileErrorCode::UnknownHelper);
        check!(err.message == "You specified knownHelpersOnly, but used the unknown helper helper");

        let_assert!(Ok(scope) = compile_with("{{helper a}}", CompileFlags::KNOWN_HELPERS_ONLY, &["helper"]));
        check!(kinds(&scope) == [
            "getContext", "lookupOnContext", "pushProgram", "pushProgram", "emptyHash",
            "invokeKnownHelper", "appendEscaped",
        ]);
        check!(scope.opcodes[5].operands == [Operand::Long(1), Operand::from("helper")]);

        // a bare known name is a helper call too
        let_assert!(Ok(scope) = compile_with("{{lookup}}", CompileFlags::NONE, &[]));
        check!(kinds(&scope) == ["pushProgram", "pushProgram", "emptyHash", "invokeKnownHelper", "appendEscaped"]);
    }

    #[test]
    fn unknown_helpers() {
        let_assert!(Ok(scope) = compile_with("{{foo.bar 1 key=true}}", CompileFlags::NONE, &[]));
        check!(kinds(&scope) == [
            "pushLiteral", "pushProgram", "pushProgram", "pushHash", "pushLiteral", "assignToHash",
            "popHash", "getContext", "lookupOnContext", "invokeHelper", "appendEscaped",
        ]);
        check!(scope.opcodes[8].operands[1] == Operand::Boolean(true));
        check!(scope.opcodes[9].operands == [
            Operand::Long(1),
            Operand::from("foo.bar"),
            Operand::Boolean(false),
        ]);
    }

    #[test]
    fn blocks_make_children() {
        let_assert!(Ok(scope) = compile_with("{{#foo}}a{{else}}b{{/foo}}{{#bar}}c{{/bar}}", CompileFlags::NONE, &[]));
        check!(scope.children.len() == 3);
        check!(scope.children[0].opcodes[0].operands == [Operand::from("a")]);
        check!(scope.children[1].opcodes[0].operands == [Operand::from("b")]);
        check!(scope.children[2].opcodes[0].operands == [Operand::from("c")]);
        check!(kinds(&scope)[..6] == [
            "getContext", "pushProgram", "pushProgram", "getContext", "lookupOnContext", "invokeAmbiguous",
        ]);
        check!(scope.opcodes[1].operands == [Operand::Long(0)]);
        check!(scope.opcodes[2].operands == [Operand::Long(1)]);
        check!(scope.opcodes[5].operands == [Operand::from("foo"), Operand::Boolean(true)]);
    }

    #[test]
    fn depths_propagate() {
        let src = "{{#a}}{{#b}}{{../../x}}{{../y}}{{/b}}{{/a}}";
        let_assert!(Ok(scope) = compile_with(src, CompileFlags::USE_DEPTHS, &[]));
        let inner = &scope.children[0].children[0];
        check!(inner.depths.iter().collect::<Vec<_>>() == [1, 2]);
        check!(scope.children[0].depths.iter().collect::<Vec<_>>() == [1]);
        check!(scope.depths.is_empty());

        let_assert!(Ok(scope) = compile_with(src, CompileFlags::NONE, &[]));
        check!(scope.children[0].children[0].depths == Depths::default());
        let_assert!(Ok(scope) = compile_with(src, CompileFlags::COMPAT, &[]));
        check!(!scope.children[0].children[0].depths.is_empty());
    }

    #[test]
    fn depth_overflow() {
        let src = format!("{{{{{}x}}}}", "../".repeat(64));
        let_assert!(Err(err) = compile_with(&src, CompileFlags::USE_DEPTHS, &[]));
        check!(err.code == CompileErrorCode::DepthOverflow);
        check!(compile_with(&src, CompileFlags::NONE, &[]).is_ok());
    }

    #[test]
    fn partials_and_data() {
        let_assert!(Ok(scope) = compile_with("{{#a}}{{> foo bar x=1}}{{/a}}{{@index}}", CompileFlags::NONE, &[]));
        check!(scope.use_partial);
        check!(scope.use_data);
        check!(kinds(&scope.children[0]) == [
            "pushHash", "pushLiteral", "assignToHash", "popHash", "getContext", "lookupOnContext",
            "invokePartial", "append",
        ]);
        check!(scope.children[0].opcodes[6].operands == [Operand::from("foo"), Operand::from("")]);

        let_assert!(Ok(scope) = compile_with("{{> foo}}", CompileFlags::NONE, &[]));
        check!(kinds(&scope) == ["push", "getContext", "pushContext", "invokePartial", "append"]);
    }

    #[test]
    fn string_params_and_track_ids() {
        let_assert!(Ok(scope) = compile_with("{{foo ../bar \"s\"}}", CompileFlags::STRING_PARAMS | CompileFlags::USE_DEPTHS, &[]));
        check!(kinds(&scope)[..4] == ["getContext", "pushStringParam", "getContext", "pushStringParam"]);
        check!(scope.opcodes[0].operands == [Operand::Long(1)]);
        check!(scope.opcodes[1].operands == [Operand::from("bar"), Operand::from("ID")]);
        check!(scope.opcodes[3].operands == [Operand::from("s"), Operand::from("STRING")]);
        check!(scope.depths.iter().collect::<Vec<_>>() == [1]);

        let_assert!(Ok(scope) = compile_with("{{foo ../bar @baz}}", CompileFlags::TRACK_IDS, &[]));
        check!(scope.opcodes[0].operands == [Operand::from("ID"), Operand::from("../bar")]);
        check!(kinds(&scope)[3] == "pushId");
        check!(scope.opcodes[3].operands == [Operand::from("DATA"), Operand::from("@baz")]);
    }

    #[test]
    fn tracked_literals_keep_their_type() {
        let_assert!(Ok(scope) = compile_with("{{foo true 2}}", CompileFlags::TRACK_IDS, &[]));
        check!(kinds(&scope)[..4] == ["pushId", "pushLiteral", "pushId", "pushLiteral"]);
        check!(scope.opcodes[0].operands == [Operand::from("BOOLEAN"), Operand::Boolean(true)]);
        check!(scope.opcodes[1].operands == [Operand::from("true")]);
        check!(scope.opcodes[2].operands == [Operand::from("NUMBER"), Operand::from("2")]);
    }

    #[test]
    fn default_options_know_the_builtins() {
        let_assert!(Ok(program) = parse("{{#each items}}x{{/each}}"));
        let_assert!(Ok(scope) = compile(&program, &CompileOptions::default()));
        check!(kinds(&scope).contains(&"invokeKnownHelper"));
        check!(!kinds(&scope).contains(&"invokeHelper"));
    }

    #[test]
    fn hand_built_trees_are_checked() {
        let bogus = Node::program(vec![Node::program(vec![], 0..0)], 0..0);
        let_assert!(Err(err) = compile(&bogus, &CompileOptions::default()));
        check!(err.code == CompileErrorCode::UnexpectedNode);
    }

    #[test]
    fn compiling_is_deterministic() {
        arbtest(|u| {
            let src: String = u.arbitrary()?;
            let flags: CompileFlags = u.arbitrary()?;
            if let Ok(program) = parse(&src) {
                let options = CompileOptions::new(flags);
                check!(compile(&program, &options) == compile(&program, &options));
            }
            Ok(())
        });
    }
}
