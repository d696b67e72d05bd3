//! Pipeline stage selection for [`crate::rist`].

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A combinable set of pipeline stages.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Run the compiled unit.
    pub const EXECUTE: Flags = Flags(1);
    /// Compile only.
    pub const COMPILE: Flags = Flags(2);
    /// Write compiled output to the `compile_to` path.
    pub const WRITE: Flags = Flags(4);
    /// Treat the argument as a path instead of source text.
    pub const FILE: Flags = Flags(8);

    pub const E: Flags = Flags::EXECUTE;
    pub const C: Flags = Flags::COMPILE;
    pub const W: Flags = Flags::WRITE;
    pub const F: Flags = Flags::FILE;

    const NAMES: [(Flags, &'static str); 4] = [
        (Flags::EXECUTE, "E"),
        (Flags::COMPILE, "C"),
        (Flags::WRITE, "W"),
        (Flags::FILE, "F"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn parse(self) -> ParsedFlags {
        ParsedFlags {
            execute: self.contains(Flags::EXECUTE),
            compile: self.contains(Flags::COMPILE),
            write: self.contains(Flags::WRITE),
            file: self.contains(Flags::FILE),
        }
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Flags::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Flags broken out into independent switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsedFlags {
    pub execute: bool,
    pub compile: bool,
    pub write: bool,
    pub file: bool,
}
