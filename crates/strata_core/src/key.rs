//! Cache keys for task runs.
//!
//! A key identifies a (session, script, inputs) combination. It is a pure
//! function of those three things: input order is significant, and so is
//! the session id.

use crate::error::CoreResult;
use crate::hash::{Hash, Hasher};
use crate::id::SessionId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic identifier of a task run's work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(Hash);

impl CacheKey {
    /// Compute the key for a rendered script and its ordered input bindings.
    ///
    /// # Errors
    ///
    /// Returns error if an input value cannot be canonically encoded
    pub fn compute<'a, I>(session: SessionId, script: &str, inputs: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut hasher = Hasher::new();
        hasher.update_field(session.as_bytes());
        hasher.update_field(script.as_bytes());

        let mut count = 0usize;
        for (name, value) in inputs {
            hasher.update_field(name.as_bytes());
            hasher.update_field(&value.canonical_bytes()?);
            count += 1;
        }
        hasher.update_count(count);

        Ok(Self(hasher.finalize()))
    }

    /// Wrap an existing hash
    #[must_use]
    pub const fn from_hash(hash: Hash) -> Self {
        Self(hash)
    }

    /// Underlying hash
    #[must_use]
    pub const fn as_hash(&self) -> &Hash {
        &self.0
    }

    /// Key of the `attempt`-th folder for this key.
    ///
    /// Attempt 0 is the key itself; later attempts are derived when an
    /// earlier folder exists but holds no valid result.
    #[must_use]
    pub fn attempt(&self, attempt: u32) -> Self {
        if attempt == 0 {
            *self
        } else {
            Self(self.0.chain_counter(attempt))
        }
    }

    /// Hex form
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Short prefix for log lines, e.g. `3f/a91c02`
    #[must_use]
    pub fn short(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..8])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(session: SessionId, script: &str, inputs: &[(&str, Value)]) -> CacheKey {
        CacheKey::compute(session, script, inputs.iter().map(|(n, v)| (*n, v))).unwrap()
    }

    #[test]
    fn test_key_deterministic() {
        let s = SessionId::from_bytes([1u8; 16]);
        let inputs = [("x", Value::Int(1)), ("y", Value::from("b"))];
        assert_eq!(key(s, "echo hi", &inputs), key(s, "echo hi", &inputs));
    }

    #[test]
    fn test_key_depends_on_script() {
        let s = SessionId::from_bytes([1u8; 16]);
        let inputs = [("x", Value::Int(1))];
        assert_ne!(key(s, "echo a", &inputs), key(s, "echo b", &inputs));
    }

    #[test]
    fn test_key_depends_on_session() {
        let inputs = [("x", Value::Int(1))];
        let a = key(SessionId::from_bytes([1u8; 16]), "echo", &inputs);
        let b = key(SessionId::from_bytes([2u8; 16]), "echo", &inputs);
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_depends_on_input_order() {
        let s = SessionId::from_bytes([1u8; 16]);
        let forward = [("x", Value::Int(1)), ("y", Value::Int(2))];
        let reverse = [("y", Value::Int(2)), ("x", Value::Int(1))];
        assert_ne!(key(s, "echo", &forward), key(s, "echo", &reverse));
    }

    #[test]
    fn test_key_depends_on_value_type() {
        let s = SessionId::from_bytes([1u8; 16]);
        let as_str = [("x", Value::from("1"))];
        let as_int = [("x", Value::Int(1))];
        assert_ne!(key(s, "echo", &as_str), key(s, "echo", &as_int));
    }

    #[test]
    fn test_attempt_keys() {
        let s = SessionId::from_bytes([1u8; 16]);
        let base = key(s, "echo", &[]);
        assert_eq!(base.attempt(0), base);
        assert_ne!(base.attempt(1), base);
        assert_eq!(base.attempt(1), base.attempt(1));
        assert_ne!(base.attempt(1), base.attempt(2));
    }

    #[test]
    fn test_short() {
        let k = CacheKey::from_hash(Hash::from_bytes([0xab; 32]));
        assert_eq!(k.short(), "ab/ababab");
    }

    proptest::proptest! {
        #[test]
        fn prop_key_deterministic(script: String, a: i64, b: String) {
            let s = SessionId::from_bytes([9u8; 16]);
            let inputs = [("a", Value::Int(a)), ("b", Value::Str(b))];
            prop_assert_eq!(key(s, &script, &inputs), key(s, &script, &inputs));
        }

        #[test]
        fn prop_key_differs_on_value(a: i64, b: i64) {
            prop_assume!(a != b);
            let s = SessionId::from_bytes([9u8; 16]);
            let left = key(s, "run", &[("n", Value::Int(a))]);
            let right = key(s, "run", &[("n", Value::Int(b))]);
            prop_assert_ne!(left, right);
        }
    }
}
