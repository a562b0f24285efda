use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::builtins::Builtin;
use crate::decoder::{self, Arg, Instruction};
use crate::error::{VmError, VmResult};
use crate::garbage::GarbageList;
use crate::mask::EvalMask;
use crate::opcode::Opcode;
use crate::registers::RegisterStore;
use crate::stack::EvalStack;
use crate::value::Value;

/// The virtual machine. Owns the evaluation stack, the register store, the
/// garbage list, and the decoded instruction array; mutated only through
/// `&mut self` methods, so there's nothing to synchronize (see §5 of the
/// design: no other agent can observe or mutate this state concurrently).
pub struct Vm {
    pub(crate) stack: EvalStack,
    pub(crate) garbage: GarbageList,
    registers: RegisterStore,
    instructions: Vec<Instruction>,
    pc: usize,
    error: Option<VmError>,
    interrupt: Arc<AtomicBool>,
    /// Used only to tie-break the `Abstract` display identifier; see §4.9.
    #[allow(dead_code)]
    seed: u32,
    /// When set, emits decode/dispatch/jump trace records via `log`.
    pub verbose: bool,
}

impl Vm {
    /// Builds an empty VM. `interrupt` is a shared flag the caller may
    /// flip (from a signal handler, or directly in a test) to request
    /// best-effort cancellation between instructions.
    pub fn new(interrupt: Arc<AtomicBool>) -> Self {
        Self {
            stack: EvalStack::new(),
            garbage: GarbageList::new(),
            registers: RegisterStore::new(),
            instructions: Vec::new(),
            pc: 0,
            error: None,
            interrupt,
            seed: rand::thread_rng().gen(),
            verbose: false,
        }
    }

    /// Decodes `bytes` (past the signature) and executes to completion.
    pub fn start(&mut self, bytes: &[u8]) -> VmResult<()> {
        self.instructions = decoder::decode(bytes)?;
        if self.verbose {
            log::debug!("start: {} instructions decoded", self.instructions.len());
        }
        self.pc = 0;
        self.execute()
    }

    /// Runs `bytes` to completion and tears the VM down, returning the
    /// process exit status: `0` on success, non-zero if execution raised
    /// an error.
    pub fn run(&mut self, bytes: &[u8]) -> i32 {
        if let Err(err) = self.start(bytes) {
            self.error = Some(err);
        }
        self.close()
    }

    /// Records a failure that happened before execution could even start
    /// (e.g. the host couldn't load the program file), then tears down and
    /// reports it through the same path as an execution error.
    pub fn fail(&mut self, err: VmError) -> i32 {
        self.error = Some(err);
        self.close()
    }

    /// Drops the stack, garbage, instructions and registers, reports any
    /// pending error to stderr, and returns the process exit status.
    /// Always runs; idempotent.
    pub fn close(&mut self) -> i32 {
        let status = if let Some(err) = &self.error {
            log::error!("program ended with an error: {err}");
            eprintln!("| [ERROR] Program ends with an error:\n| {err}");
            1
        } else {
            0
        };
        self.stack.clear();
        self.garbage.drain();
        self.instructions.clear();
        self.registers = RegisterStore::new();
        status
    }

    /// The current error, if any run has raised one.
    pub fn error(&self) -> Option<&VmError> {
        self.error.as_ref()
    }

    /// The value left on top of the evaluation stack by the last `start`,
    /// if execution reached a `RET` (or ran off the end of the program)
    /// with at least one value still on the stack. Available only before
    /// `close`/`run` tears the stack down.
    pub fn result(&self) -> Option<&Value> {
        self.stack.peek(0).ok()
    }

    fn execute(&mut self) -> VmResult<()> {
        while self.pc < self.instructions.len() {
            if self.interrupt.load(Ordering::SeqCst) {
                return Err(VmError::Generic("interrupted".into()));
            }
            let instruction = self.instructions[self.pc].clone();
            if self.verbose {
                log::debug!("dispatch: pc={} {:?}", self.pc, instruction.opcode);
            }
            if instruction.opcode == Opcode::Ret {
                return Ok(());
            }
            if instruction.opcode.is_jump() {
                self.jump(&instruction)?;
                continue;
            }
            self.dispatch(&instruction)?;
            self.pc += 1;
        }
        Ok(())
    }

    fn dispatch(&mut self, instruction: &Instruction) -> VmResult<()> {
        match (instruction.opcode, &instruction.arg) {
            (Opcode::PushNum, Arg::F64(n)) => {
                self.stack.push(Value::Number(*n));
                Ok(())
            }
            (Opcode::PushStr, Arg::Str(bytes)) => {
                self.stack.push(Value::String(bytes.clone()));
                Ok(())
            }
            (Opcode::PushBool, Arg::U8(b)) => {
                self.stack.push(Value::Bool(*b != 0));
                Ok(())
            }
            (Opcode::PushDef, Arg::Str(name)) => {
                let builtin = Builtin::lookup(name)?;
                self.stack.push(Value::Abstract(builtin));
                Ok(())
            }
            (Opcode::SumStack, Arg::None) => self.sumstack(),
            (Opcode::StackClose, Arg::None) => {
                self.stack.clear();
                Ok(())
            }
            (Opcode::Eval, Arg::U8(mask)) => self.eval(*mask),
            (Opcode::Super, Arg::None) => self.stack.rotate_bottom_to_top(),
            (Opcode::Call, Arg::None) => self.call(),
            (Opcode::Load, Arg::U32(index)) => self.registers.load(*index, &mut self.stack),
            (Opcode::Unload, Arg::U32(index)) => self.registers.unload(*index, &mut self.stack),
            (Opcode::DefUnload, Arg::U32(index)) => {
                self.registers.take_out(*index, &mut self.stack)
            }
            (opcode, arg) => Err(VmError::Generic(format!(
                "opcode {opcode:?} decoded with mismatched argument {arg:?}"
            ))),
        }
    }

    /// Sums (numbers), logically ORs (bools), or concatenates (strings)
    /// the top two stack values, then clears the stack and pushes the
    /// single result. §4.6.
    fn sumstack(&mut self) -> VmResult<()> {
        if self.stack.len() < 2 {
            return Err(VmError::TooFewStack);
        }
        let top = self.stack.peek(0)?;
        let second = self.stack.peek(1)?;
        if top.kind() != second.kind() {
            return Err(VmError::TypesMismatch);
        }
        let result = match (top, second) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(*a || *b),
            (Value::String(a), Value::String(b)) => {
                let mut combined = a.clone();
                combined.extend_from_slice(b);
                Value::String(combined)
            }
            _ => return Err(VmError::TypesMismatch),
        };
        self.stack.clear();
        self.stack.push(result);
        Ok(())
    }

    /// Three-way compares the top two stack values and pushes whether the
    /// result matches `mask`. §4.6.
    fn eval(&mut self, mask: u8) -> VmResult<()> {
        let mask = EvalMask::from_bits_truncate(mask);
        let top = self.stack.peek(0)?;
        let second = self.stack.peek(1)?;
        let outcome = if top.kind() != second.kind() {
            EvalMask::empty()
        } else {
            // Matches the source's `a = get(0), b = get(1), cmp = a - b`.
            let ordering = match (top, second) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                (Value::Number(a), Value::Number(b)) => {
                    a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
                }
                (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
                _ => std::cmp::Ordering::Less, // distinct non-comparable kinds: unequal
            };
            match ordering {
                std::cmp::Ordering::Equal => EvalMask::EQUALS,
                std::cmp::Ordering::Less => EvalMask::SMALLER,
                std::cmp::Ordering::Greater => EvalMask::GREATER,
            }
        };
        self.stack.clear();
        self.stack.push(Value::Bool(mask.intersects(outcome)));
        Ok(())
    }

    /// Pops the top value, requires it to be `Abstract`, and invokes the
    /// referenced built-in with this VM as its sole argument.
    fn call(&mut self) -> VmResult<()> {
        let value = self.stack.pop().ok_or(VmError::TooFewStack)?;
        let builtin = match value {
            Value::Abstract(builtin) => builtin,
            other => {
                self.garbage.push(other);
                return Err(VmError::TypesMismatch);
            }
        };
        builtin.call(self)
    }

    fn jump(&mut self, instruction: &Instruction) -> VmResult<()> {
        let Arg::Jump(offset) = instruction.arg else {
            unreachable!("jump opcodes always decode a Jump argument")
        };
        let predicate = self.jump_predicate(instruction.opcode);
        if !predicate {
            if self.verbose {
                log::trace!("jump: not taken");
            }
            if let Some(value) = self.stack.pop() {
                self.garbage.push(value);
            }
            self.pc += 1;
            return Ok(());
        }
        if offset == 0 {
            return Err(VmError::OutOfJump);
        }
        let step = if offset > 0 { offset + 1 } else { offset - 1 };
        if self.verbose {
            log::trace!("jump: taking {step} instructions from pc={}", self.pc);
        }
        let target = self.pc as i64 + step as i64;
        if target < 0 || target as usize >= self.instructions.len() {
            return Err(VmError::OutOfJump);
        }
        self.pc = target as usize;
        Ok(())
    }

    fn jump_predicate(&self, opcode: Opcode) -> bool {
        match opcode {
            Opcode::Jmp => true,
            Opcode::Jem => self.stack.is_empty(),
            Opcode::Jnem => !self.stack.is_empty(),
            Opcode::Jtr => matches!(self.stack.peek(0), Ok(v) if v.as_bool() == Some(true)),
            Opcode::Jfa => matches!(self.stack.peek(0), Ok(v) if v.as_bool() == Some(false)),
            other => unreachable!("{other:?} is not a jump opcode"),
        }
    }
}
