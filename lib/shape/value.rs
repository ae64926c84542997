use crate::shape::ObjectId;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A symbolic value.
///
/// Values are opaque handles. Two graphs of the same analysis that contain
/// the same `Value` talk about the same symbolic value as long as the value
/// was created before the states diverged.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Value(u64);

impl Value {
    /// The null address.
    pub const NULL: Value = Value(0);

    pub fn new(id: u64) -> Value {
        Value(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        *self == Value::NULL
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A concrete integer a symbolic value is known to be equal to.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ExplicitValue(BigInt);

impl ExplicitValue {
    pub fn new<I: Into<BigInt>>(value: I) -> ExplicitValue {
        ExplicitValue(value.into())
    }

    pub fn value(&self) -> &BigInt {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Get this value as an `i64`, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.to_i64()
    }
}

impl fmt::Display for ExplicitValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out fresh values and object handles.
///
/// One allocator is shared by every state of an analysis, so a handle is never
/// reused for two different values or objects.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IdAllocator {
    next_value: u64,
    next_object: u64,
}

impl IdAllocator {
    pub fn new() -> IdAllocator {
        IdAllocator {
            next_value: Value::NULL.id() + 1,
            next_object: ObjectId::FIRST_ALLOCATED,
        }
    }

    pub fn fresh_value(&mut self) -> Value {
        let value = Value(self.next_value);
        self.next_value += 1;
        value
    }

    pub fn fresh_object_id(&mut self) -> ObjectId {
        let id = ObjectId::new(self.next_object);
        self.next_object += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> IdAllocator {
        IdAllocator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handles_are_distinct() {
        let mut ids = IdAllocator::new();
        let v1 = ids.fresh_value();
        let v2 = ids.fresh_value();
        assert_ne!(v1, v2);
        assert!(!v1.is_null());

        let o1 = ids.fresh_object_id();
        assert_ne!(o1, ObjectId::NULL);
        assert_ne!(o1, ObjectId::VOID);
        assert_ne!(o1, ids.fresh_object_id());
    }

    #[test]
    fn explicit_value() {
        let value = ExplicitValue::new(42);
        assert_eq!(value.as_i64(), Some(42));
        assert!(!value.is_zero());
        assert!(ExplicitValue::new(0).is_zero());
        assert_eq!(format!("{}", ExplicitValue::new(-3)), "-3");
    }
}
