use std::{error, fmt};

/// Everything that can go wrong while decoding or executing a program.
#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    /// Unclassified failure, including best-effort interruption.
    Generic(String),
    /// Allocation failed. Only reachable through the test-only fallible-alloc hook.
    NoMem,
    /// An operation needed more elements on the evaluation stack than were present.
    TooFewStack,
    /// No register exists at the requested index.
    NoRegister,
    /// Indexed read past the end of the evaluation stack.
    NoStack,
    /// `PUSHDEF` referenced a built-in name that isn't in the registry.
    NotFound,
    /// The operands of a type-sensitive opcode didn't share a kind.
    TypesMismatch,
    /// A jump target fell outside the instruction array, or the offset was `0`.
    OutOfJump,
    /// The host failed to locate the program file.
    NoFile,
    /// The host failed to read the program file.
    HostRead(String),
    /// The host failed to stat the program file.
    HostStat(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(msg) => write!(f, "{msg}"),
            Self::NoMem => write!(f, "no memory left"),
            Self::TooFewStack => write!(f, "stack too small"),
            Self::NoRegister => write!(f, "no such register"),
            Self::NoStack => write!(f, "no such element in stack"),
            Self::NotFound => write!(f, "no such built-in"),
            Self::TypesMismatch => write!(f, "invalid combination of types"),
            Self::OutOfJump => write!(f, "jump out of instruction bounds"),
            Self::NoFile => write!(f, "file doesn't exist"),
            Self::HostRead(err) => write!(f, "read failed: {err}"),
            Self::HostStat(err) => write!(f, "stat failed: {err}"),
        }
    }
}

impl error::Error for VmError {}

impl From<std::io::Error> for VmError {
    fn from(err: std::io::Error) -> Self {
        Self::HostRead(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
pub(crate) mod fallible_alloc {
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Flipped by tests that want to exercise the `NoMem` path without a
    /// custom global allocator.
    static FAIL_NEXT_ALLOC: AtomicBool = AtomicBool::new(false);

    pub fn arm() {
        FAIL_NEXT_ALLOC.store(true, Ordering::SeqCst);
    }

    pub fn should_fail() -> bool {
        FAIL_NEXT_ALLOC.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_human_readable() {
        assert_eq!(VmError::NoRegister.to_string(), "no such register");
        assert_eq!(VmError::OutOfJump.to_string(), "jump out of instruction bounds");
    }
}
