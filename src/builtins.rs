use std::thread;
use std::time::Duration;

use crate::error::{VmError, VmResult};
use crate::vm::Vm;

/// The fixed, compile-time registry of host-provided routines callable
/// from bytecode via `PUSHDEF`/`CALL`.
///
/// Unlike the source's `HashMap<String, fn>`-shaped registry, this is a
/// closed enum: there is no way to construct an `Abstract` value that
/// doesn't name a real routine, which makes `CALL` total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Drains the stack, printing each value top to bottom.
    Print,
    /// Busy-waits (sleeps) for a millisecond count popped from the stack.
    Wait,
}

impl Builtin {
    /// Numeric identifier used as the `Abstract` value's display address.
    /// Stable within a crate version, unlike the source's process pointer.
    pub fn id(self) -> u32 {
        match self {
            Self::Print => 0,
            Self::Wait => 1,
        }
    }

    /// Looks up a built-in by its bytecode name.
    pub fn lookup(name: &[u8]) -> VmResult<Self> {
        match name {
            b"print" => Ok(Self::Print),
            b"wait" => Ok(Self::Wait),
            _ => Err(VmError::NotFound),
        }
    }

    /// Invokes this routine against the VM that owns the stack it should act on.
    pub fn call(self, vm: &mut Vm) -> VmResult<()> {
        match self {
            Self::Print => print_builtin(vm),
            Self::Wait => wait_builtin(vm),
        }
    }
}

/// `print`: drains the evaluation stack, coercing each value to a string and
/// writing one line per value, from top to bottom.
fn print_builtin(vm: &mut Vm) -> VmResult<()> {
    while !vm.stack.is_empty() {
        let mut value = vm.stack.pop().ok_or(VmError::NoStack)?;
        value.coerce_to_string();
        println!("{}", value.as_str().unwrap_or_default());
        vm.garbage.push(value);
    }
    Ok(())
}

/// `wait`: pops a millisecond count and sleeps for that long.
fn wait_builtin(vm: &mut Vm) -> VmResult<()> {
    let value = vm.stack.pop().ok_or(VmError::TooFewStack)?;
    let millis = value.as_number().ok_or(VmError::TypesMismatch)?;
    vm.garbage.push(value);
    thread::sleep(Duration::from_millis(millis.max(0.0) as u64));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_names() {
        assert_eq!(Builtin::lookup(b"print").unwrap(), Builtin::Print);
        assert_eq!(Builtin::lookup(b"wait").unwrap(), Builtin::Wait);
    }

    #[test]
    fn lookup_unknown_name_fails() {
        assert_eq!(Builtin::lookup(b"nope").unwrap_err(), VmError::NotFound);
    }

    #[test]
    fn ids_are_stable_and_distinct() {
        assert_ne!(Builtin::Print.id(), Builtin::Wait.id());
    }
}
