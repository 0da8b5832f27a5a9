//! The compiler's output: opcodes with typed operands, grouped into a tree of
//! scopes that mirrors the nesting of programs in the template.
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeKind {
    AppendContent,
    Append,
    AppendEscaped,
    GetContext,
    PushContext,
    LookupOnContext,
    LookupData,
    ResolvePossibleLambda,
    PushProgram,
    EmptyHash,
    PushHash,
    PopHash,
    AssignToHash,
    PushString,
    PushStringParam,
    PushLiteral,
    PushId,
    Push,
    BlockValue,
    AmbiguousBlockValue,
    InvokeHelper,
    InvokeKnownHelper,
    InvokeAmbiguous,
    InvokePartial,
}

impl OpcodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AppendContent => "appendContent",
            Self::Append => "append",
            Self::AppendEscaped => "appendEscaped",
            Self::GetContext => "getContext",
            Self::PushContext => "pushContext",
            Self::LookupOnContext => "lookupOnContext",
            Self::LookupData => "lookupData",
            Self::ResolvePossibleLambda => "resolvePossibleLambda",
            Self::PushProgram => "pushProgram",
            Self::EmptyHash => "emptyHash",
            Self::PushHash => "pushHash",
            Self::PopHash => "popHash",
            Self::AssignToHash => "assignToHash",
            Self::PushString => "pushString",
            Self::PushStringParam => "pushStringParam",
            Self::PushLiteral => "pushLiteral",
            Self::PushId => "pushId",
            Self::Push => "push",
            Self::BlockValue => "blockValue",
            Self::AmbiguousBlockValue => "ambiguousBlockValue",
            Self::InvokeHelper => "invokeHelper",
            Self::InvokeKnownHelper => "invokeKnownHelper",
            Self::InvokeAmbiguous => "invokeAmbiguous",
            Self::InvokePartial => "invokePartial",
        }
    }

    /// How many operands an opcode of this kind carries
    pub fn arity(&self) -> usize {
        match self {
            Self::Append
            | Self::AppendEscaped
            | Self::PushContext
            | Self::ResolvePossibleLambda
            | Self::EmptyHash
            | Self::PushHash
            | Self::PopHash
            | Self::AmbiguousBlockValue => 0,
            Self::AppendContent
            | Self::GetContext
            | Self::PushProgram
            | Self::AssignToHash
            | Self::PushString
            | Self::PushLiteral
            | Self::Push
            | Self::BlockValue => 1,
            Self::LookupData
            | Self::PushStringParam
            | Self::PushId
            | Self::InvokeKnownHelper
            | Self::InvokeAmbiguous
            | Self::InvokePartial => 2,
            Self::LookupOnContext | Self::InvokeHelper => 3,
        }
    }
}

impl fmt::Display for OpcodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Null,
    Boolean(bool),
    Long(i64),
    String(String),
    Array(Vec<String>),
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<usize> for Operand {
    fn from(value: usize) -> Self {
        Self::Long(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for Operand {
    fn from(value: Vec<String>) -> Self {
        Self::Array(value)
    }
}

impl<T: Into<Operand>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "[NULL]"),
            Self::Boolean(value) => write!(f, "[BOOLEAN:{value}]"),
            Self::Long(value) => write!(f, "[LONG:{value}]"),
            Self::String(value) => write!(f, "[STRING:{value}]"),
            Self::Array(values) => write!(f, "[ARRAY:{}]", values.join(",")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Opcode {
    pub kind: OpcodeKind,
    pub operands: Vec<Operand>,
}

impl Opcode {
    pub fn new(kind: OpcodeKind, operands: Vec<Operand>) -> Self {
        debug_assert_eq!(
            kind.arity(),
            operands.len(),
            "wrong operand count for {kind}"
        );
        Self { kind, operands }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for operand in &self.operands {
            write!(f, "{operand}")?;
        }
        Ok(())
    }
}

/// Ancestor levels a scope references, bit `k` meaning `k` levels up.
///
/// Level 0 is the scope's own context and is never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Depths(pub u64);

impl Depths {
    /// The deepest level that fits
    pub const MAX: usize = u64::BITS as usize - 1;

    /// Records `depth`, returning false if it does not fit
    pub fn insert(&mut self, depth: usize) -> bool {
        if depth > Self::MAX {
            return false;
        }
        if depth > 0 {
            self.0 |= 1 << depth;
        }
        true
    }

    pub fn contains(&self, depth: usize) -> bool {
        depth <= Self::MAX && self.0 & (1 << depth) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Recorded levels, shallowest first
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (1..=Self::MAX).filter(|depth| self.contains(*depth))
    }
}

/// The compiled form of one program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scope {
    pub opcodes: Vec<Opcode>,
    /// Block bodies and inverses, in the order they appear in the template
    pub children: Vec<Scope>,
    pub depths: Depths,
    /// The program had exactly one statement
    pub is_simple: bool,
    /// This scope or one of its children invokes a partial
    pub use_partial: bool,
    /// This scope or one of its children reads `@data`
    pub use_data: bool,
}

#[cfg(test)]
mod tests {
    use super::{Depths, Opcode, OpcodeKind, Operand};
    use assert2::check;

    #[test]
    fn depths() {
        let mut depths = Depths::default();
        check!(depths.insert(0));
        check!(depths.is_empty());
        check!(depths.insert(3));
        check!(depths.insert(1));
        check!(depths.insert(3));
        check!(depths.iter().collect::<Vec<_>>() == [1, 3]);
        check!(depths.insert(Depths::MAX));
        check!(!depths.insert(Depths::MAX + 1));
        check!(depths.contains(Depths::MAX));
    }

    #[test]
    fn display() {
        let opcode = Opcode::new(
            OpcodeKind::LookupOnContext,
            vec![
                Operand::Array(vec!["foo".into(), "bar".into()]),
                Operand::Boolean(false),
                Operand::Boolean(true),
            ],
        );
        check!(opcode.to_string() == "lookupOnContext[ARRAY:foo,bar][BOOLEAN:false][BOOLEAN:true]");

        let opcode = Opcode::new(OpcodeKind::PushProgram, vec![Operand::from(None::<usize>)]);
        check!(opcode.to_string() == "pushProgram[NULL]");
        check!(Opcode::new(OpcodeKind::Append, vec![]).to_string() == "append");
    }
}
