use crate::builtins::Builtin;

/// A dynamically-typed VM value.
///
/// `String`/`Number`/`Bool` own their payload outright; `Abstract` is a
/// plain `Copy` discriminant naming a built-in routine, so dropping it
/// never touches anything the VM doesn't also own elsewhere (there's
/// nothing to free — unlike the source, where `Abstract` wraps a raw,
/// non-owned pointer).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    String(Vec<u8>),
    Bool(bool),
    Abstract(Builtin),
}

/// The discriminant of a [`Value`], used wherever code needs to compare
/// "same kind" without caring about the payload (`SUMSTACK`, `EVAL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Number,
    String,
    Bool,
    Abstract,
}

impl Value {
    /// This value's kind discriminant.
    pub fn kind(&self) -> Kind {
        match self {
            Self::Null => Kind::Null,
            Self::Number(_) => Kind::Number,
            Self::String(_) => Kind::String,
            Self::Bool(_) => Kind::Bool,
            Self::Abstract(_) => Kind::Abstract,
        }
    }

    /// Returns a fresh, independently owned copy. For `Number`/`Bool` this
    /// clones the payload; for `String` it clones the bytes; for
    /// `Abstract` it copies the discriminant (no allocation involved
    /// either way); `Null` yields `Null`.
    pub fn deep_copy(&self) -> Value {
        self.clone()
    }

    /// Coerces this value to `String` in place, per §4.1's formatting rules.
    /// A no-op if already a `String`.
    pub fn coerce_to_string(&mut self) {
        if matches!(self, Self::String(_)) {
            return;
        }
        let rendered = match self {
            Self::Null => b"null".to_vec(),
            Self::Bool(b) => if *b { b"true".to_vec() } else { b"false".to_vec() },
            Self::Number(n) => format_number(*n).into_bytes(),
            Self::Abstract(builtin) => format!("0x{:x}", builtin.id()).into_bytes(),
            Self::String(_) => unreachable!(),
        };
        *self = Self::String(rendered);
    }

    /// Borrowed string view, if this value is (or has been coerced to) a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Numeric payload, if this value is a `Number`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload, if this value is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Renders a number the way the VM's `print` built-in must: sign, integer
/// part with no leading zeros, and a `.` followed by exactly six
/// fractional digits *only if* that fraction is non-zero after truncation.
/// Negative zero (and any value whose six-digit truncation is zero)
/// renders as plain `0`.
fn format_number(n: f64) -> String {
    let negative = n.is_sign_negative();
    let abs = n.abs();
    // Truncate, not round, to six fractional digits — matches the source's
    // digit-extraction loop, which discards any precision past the sixth
    // place rather than rounding it into the preceding digit.
    let micros = (abs * 1_000_000.0).trunc() as u64;
    let int_part = micros / 1_000_000;
    let frac_part = micros % 1_000_000;

    if int_part == 0 && frac_part == 0 {
        return "0".to_string();
    }
    match (negative, frac_part == 0) {
        (false, true) => int_part.to_string(),
        (true, true) => format!("-{int_part}"),
        (false, false) => format!("{int_part}.{frac_part:06}"),
        (true, false) => format!("-{int_part}.{frac_part:06}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_copy_is_independent() {
        let original = Value::String(b"hello".to_vec());
        let mut copy = original.deep_copy();
        if let Value::String(bytes) = &mut copy {
            bytes.push(b'!');
        }
        assert_eq!(original, Value::String(b"hello".to_vec()));
        assert_eq!(copy, Value::String(b"hello!".to_vec()));
    }

    #[test]
    fn coerce_null_and_bool() {
        let mut v = Value::Null;
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("null"));

        let mut v = Value::Bool(true);
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("true"));

        let mut v = Value::Bool(false);
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("false"));
    }

    #[test]
    fn coerce_number_matches_spec_examples() {
        let mut v = Value::Number(125.3);
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("125.300000"));

        let mut v = Value::Number(0.0);
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("0"));

        let mut v = Value::Number(-0.0);
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("0"));

        let mut v = Value::Number(-12.0);
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("-12"));

        // -39.56 + 99.3 is not exactly representable; its true double value
        // is a hair under 59.74, so truncation (not rounding) to six digits
        // reads off "59.739999", not "59.740000".
        let mut v = Value::Number(-39.56 + 99.3);
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("59.739999"));
    }

    #[test]
    fn coerce_number_truncates_rather_than_rounds() {
        let mut v = Value::Number(9.9999999);
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("9.999999"));
    }

    #[test]
    fn coerce_string_is_noop() {
        let mut v = Value::String(b"already".to_vec());
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("already"));
    }

    #[test]
    fn coerce_abstract_is_hex_address() {
        let mut v = Value::Abstract(Builtin::Print);
        v.coerce_to_string();
        assert_eq!(v.as_str(), Some("0x0"));
    }
}
