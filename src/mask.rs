use bitflags::bitflags;

bitflags! {
    /// The three-way comparison bits produced by `EVAL` and the mask its
    /// argument is matched against.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EvalMask: u8 {
        const EQUALS = 1 << 0;
        const SMALLER = 1 << 1;
        const GREATER = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_by_bitwise_or() {
        let mask = EvalMask::EQUALS | EvalMask::GREATER;
        assert!(mask.contains(EvalMask::EQUALS));
        assert!(mask.contains(EvalMask::GREATER));
        assert!(!mask.contains(EvalMask::SMALLER));
    }
}
