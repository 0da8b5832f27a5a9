//! Knobs of the compiler: the flag set and the list of helpers it may bind
//! statically.
use lasso::{Rodeo, Spur};

bitflags::bitflags! {
    /// Compilation modes, freely combinable
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, arbitrary::Arbitrary)]
    pub struct CompileFlags: u32 {
        /// Record ancestor references in each scope's depths instead of
        /// leaving the context chain walk to the runtime
        const USE_DEPTHS = 1;
        /// Pass params and hash values as their source text plus a type tag
        const STRING_PARAMS = 1 << 1;
        /// Emit the path text of every param ahead of its value
        const TRACK_IDS = 1 << 2;
        /// Relaxed resolution: unscoped lookups may walk up the context chain,
        /// which needs depth tracking
        const COMPAT = 1 << 3;
        /// Helper calls must name a known helper
        const KNOWN_HELPERS_ONLY = 1 << 4;

        const ALL = Self::USE_DEPTHS.bits()
            | Self::STRING_PARAMS.bits()
            | Self::TRACK_IDS.bits()
            | Self::COMPAT.bits()
            | Self::KNOWN_HELPERS_ONLY.bits();
    }
}

impl CompileFlags {
    pub const NONE: Self = Self::empty();

    /// Whether depths are tracked, which compat mode implies
    pub fn tracks_depths(self) -> bool {
        self.intersects(Self::USE_DEPTHS | Self::COMPAT)
    }
}

/// Helpers every runtime provides
pub const BUILTIN_HELPERS: [&str; 8] = [
    "helperMissing",
    "blockHelperMissing",
    "each",
    "if",
    "unless",
    "with",
    "log",
    "lookup",
];

/// Caller supplied helper names followed by the builtins.
///
/// The list keeps order and duplicates, lookups go through the interner.
#[derive(Debug)]
pub struct KnownHelpers {
    names: Rodeo,
    order: Vec<Spur>,
}

impl KnownHelpers {
    pub fn new<'a>(caller: impl IntoIterator<Item = &'a str>) -> Self {
        let mut helpers = Self {
            names: Rodeo::default(),
            order: vec![],
        };
        for name in caller.into_iter().chain(BUILTIN_HELPERS) {
            let key = helpers.names.get_or_intern(name);
            helpers.order.push(key);
        }
        helpers
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(|key| self.names.resolve(key))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for KnownHelpers {
    /// Just the builtins
    fn default() -> Self {
        Self::new([])
    }
}

#[derive(Debug)]
pub struct CompileOptions {
    pub flags: CompileFlags,
    pub known_helpers: KnownHelpers,
}

impl CompileOptions {
    pub fn new(flags: CompileFlags) -> Self {
        Self {
            flags,
            known_helpers: KnownHelpers::new([]),
        }
    }

    pub fn with_known_helpers<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.known_helpers = KnownHelpers::new(names);
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::new(CompileFlags::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::{CompileFlags, CompileOptions, KnownHelpers, BUILTIN_HELPERS};
    use arbtest::arbtest;
    use assert2::check;

    #[test]
    fn builtins_follow_caller_names() {
        let helpers = KnownHelpers::new(["foo", "each", "foo"]);
        let names: Vec<_> = helpers.iter().collect();
        check!(names[..3] == ["foo", "each", "foo"]);
        check!(names[3..] == BUILTIN_HELPERS);
        check!(helpers.len() == 11);
        check!(helpers.contains("foo"));
        check!(!helpers.contains("bar"));
    }

    #[test]
    fn builtins_always_present() {
        arbtest(|u| {
            let caller: Vec<String> = u.arbitrary()?;
            let helpers = KnownHelpers::new(caller.iter().map(String::as_str));
            for builtin in BUILTIN_HELPERS {
                check!(helpers.contains(builtin));
            }
            check!(helpers.len() == caller.len() + BUILTIN_HELPERS.len());
            Ok(())
        });
    }

    #[test]
    fn defaults_carry_builtins() {
        let helpers = KnownHelpers::default();
        check!(helpers.iter().collect::<Vec<_>>() == BUILTIN_HELPERS);

        let options = CompileOptions::default();
        check!(options.flags == CompileFlags::NONE);
        for builtin in BUILTIN_HELPERS {
            check!(options.known_helpers.contains(builtin));
        }
    }

    #[test]
    fn flags() {
        check!(CompileFlags::ALL == CompileFlags::all());
        check!(CompileFlags::NONE.is_empty());
        check!(CompileFlags::COMPAT.tracks_depths());
        check!(!CompileFlags::TRACK_IDS.tracks_depths());

        let options = CompileOptions::new(CompileFlags::KNOWN_HELPERS_ONLY).with_known_helpers(["x"]);
        check!(options.known_helpers.contains("x"));
        check!(options.flags.contains(CompileFlags::KNOWN_HELPERS_ONLY));
    }
}
