//! Constant-time comparison for key-derived bytes (padding, tags).
//! A mismatch position must not leak through timing.

use subtle::ConstantTimeEq;

/// Constant-time equality for slices of the same length.
#[inline(always)]
pub fn eq_slices(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Constant-time check that `candidate` starts with `expected`.
///
/// Only the length of `expected` is observable.
#[inline(always)]
pub fn has_prefix(candidate: &[u8], expected: &[u8]) -> bool {
    candidate.len() >= expected.len() && eq_slices(&candidate[..expected.len()], expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_slices() {
        assert!(eq_slices(b"abc", b"abc"));
        assert!(!eq_slices(b"abc", b"abd"));
        assert!(!eq_slices(b"abc", b"abcd"));
    }

    #[test]
    fn test_has_prefix() {
        assert!(has_prefix(b"abcdef", b"abc"));
        assert!(has_prefix(b"abc", b"abc"));
        assert!(!has_prefix(b"ab", b"abc"));
        assert!(!has_prefix(b"abx", b"abc"));
        assert!(has_prefix(b"anything", b""));
    }
}
