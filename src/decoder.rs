use crate::error::{VmError, VmResult};
use crate::opcode::Opcode;

/// The fixed 3-byte magic prefix every program must begin with.
///
/// An earlier draft of the wire format used `\x1B ALU`; this is the later,
/// canonical signature (see the design notes' Open Questions).
pub const SIGNATURE: [u8; 3] = [0x1B, 0xCA, 0xCA];

/// A decoded instruction argument. Mirrors §4.4's argument kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    None,
    U32(u32),
    F64(f64),
    U8(u8),
    Str(Vec<u8>),
    /// A signed relative jump distance, before the `+1`/`-1` overshoot
    /// adjustment applied by the control-flow engine.
    Jump(i32),
}

/// One decoded opcode and its argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg: Arg,
}

/// Consumes the signature and decodes the rest of `bytes` into a flat
/// array of instructions.
///
/// Decoding stops at `HALT` or at any byte greater than the highest
/// defined opcode; neither is appended to the result, matching §4.4.
pub fn decode(bytes: &[u8]) -> VmResult<Vec<Instruction>> {
    let rest = strip_signature(bytes)?;
    let mut cursor = 0usize;
    let mut instructions = Vec::new();

    loop {
        let Some(&op_byte) = rest.get(cursor) else {
            break;
        };
        if op_byte == Opcode::Halt as u8 || op_byte > Opcode::LAST {
            log::trace!("decode: stopping at byte 0x{op_byte:02x}");
            break;
        }
        let opcode = Opcode::try_from(op_byte).map_err(|_| VmError::Generic(
            format!("unrecognized opcode byte 0x{op_byte:02x}"),
        ))?;
        cursor += 1;
        let (arg, consumed) = decode_arg(opcode, &rest[cursor..])?;
        cursor += consumed;
        log::trace!("decode: {opcode:?} {arg:?}");
        instructions.push(Instruction { opcode, arg });
    }

    Ok(instructions)
}

fn strip_signature(bytes: &[u8]) -> VmResult<&[u8]> {
    if bytes.len() < SIGNATURE.len() || bytes[..SIGNATURE.len()] != SIGNATURE {
        return Err(VmError::Generic("missing or invalid program signature".into()));
    }
    log::trace!("decode: signature consumed");
    Ok(&bytes[SIGNATURE.len()..])
}

fn decode_arg(opcode: Opcode, rest: &[u8]) -> VmResult<(Arg, usize)> {
    if opcode.is_jump() {
        let bytes = take(rest, 4)?;
        let offset = i32::from_be_bytes(bytes.try_into().unwrap());
        return Ok((Arg::Jump(offset), 4));
    }
    match opcode {
        Opcode::PushNum => {
            let bytes = take(rest, 8)?;
            Ok((Arg::F64(f64::from_be_bytes(bytes.try_into().unwrap())), 8))
        }
        Opcode::PushStr | Opcode::PushDef => {
            let terminator = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| VmError::Generic("unterminated string argument".into()))?;
            Ok((Arg::Str(rest[..terminator].to_vec()), terminator + 1))
        }
        Opcode::PushBool | Opcode::Eval => {
            let bytes = take(rest, 1)?;
            Ok((Arg::U8(bytes[0]), 1))
        }
        Opcode::Load | Opcode::Unload | Opcode::DefUnload => {
            let bytes = take(rest, 4)?;
            Ok((Arg::U32(u32::from_be_bytes(bytes.try_into().unwrap())), 4))
        }
        _ => Ok((Arg::None, 0)),
    }
}

fn take(rest: &[u8], n: usize) -> VmResult<&[u8]> {
    rest.get(..n)
        .ok_or_else(|| VmError::Generic("truncated instruction argument".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(tail: &[u8]) -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend_from_slice(tail);
        bytes
    }

    #[test]
    fn rejects_missing_signature() {
        let err = decode(&[0x00]).unwrap_err();
        assert!(matches!(err, VmError::Generic(_)));
    }

    #[test]
    fn stops_at_halt_without_emitting_it() {
        let bytes = program(&[Opcode::Ret as u8, Opcode::Halt as u8, Opcode::Ret as u8]);
        let instructions = decode(&bytes).unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].opcode, Opcode::Ret);
    }

    #[test]
    fn decodes_pushnum_as_big_endian_f64() {
        let bytes = program(&{
            let mut v = vec![Opcode::PushNum as u8];
            v.extend_from_slice(&125.3f64.to_be_bytes());
            v.push(Opcode::Halt as u8);
            v
        });
        let instructions = decode(&bytes).unwrap();
        assert_eq!(instructions[0].arg, Arg::F64(125.3));
    }

    #[test]
    fn decodes_pushstr_excluding_terminator() {
        let bytes = program(&[Opcode::PushStr as u8, b'H', b'i', 0x00, Opcode::Halt as u8]);
        let instructions = decode(&bytes).unwrap();
        assert_eq!(instructions[0].arg, Arg::Str(b"Hi".to_vec()));
    }

    #[test]
    fn decodes_jump_offset_as_signed_i32() {
        let bytes = program(&{
            let mut v = vec![Opcode::Jmp as u8];
            v.extend_from_slice(&(-7i32).to_be_bytes());
            v.push(Opcode::Halt as u8);
            v
        });
        let instructions = decode(&bytes).unwrap();
        assert_eq!(instructions[0].arg, Arg::Jump(-7));
    }

    #[test]
    fn truncated_argument_is_an_error() {
        let bytes = program(&[Opcode::PushNum as u8, 0x01, 0x02]);
        assert!(decode(&bytes).is_err());
    }
}
