use crate::shape::{ObjectId, Value};
use crate::types::MachineModel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the bytes of a field are interpreted.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum FieldKind {
    Integer,
    Float,
    Pointer,
    /// Untyped bytes, used for blocks of null bytes.
    Bytes,
}

/// The type of a has-value edge.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FieldType {
    kind: FieldKind,
    size: u64,
}

impl FieldType {
    pub fn new(kind: FieldKind, size: u64) -> FieldType {
        FieldType { kind, size }
    }

    pub fn integer(size: u64) -> FieldType {
        FieldType::new(FieldKind::Integer, size)
    }

    pub fn float(size: u64) -> FieldType {
        FieldType::new(FieldKind::Float, size)
    }

    pub fn pointer(machine_model: &MachineModel) -> FieldType {
        FieldType::new(FieldKind::Pointer, machine_model.pointer_size())
    }

    pub fn bytes(size: u64) -> FieldType {
        FieldType::new(FieldKind::Bytes, size)
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// The size of this field in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            FieldKind::Integer => "int",
            FieldKind::Float => "float",
            FieldKind::Pointer => "ptr",
            FieldKind::Bytes => "bytes",
        };
        write!(f, "{}:{}", kind, self.size)
    }
}

/// A field of an object holding a value.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HasValueEdge {
    object: ObjectId,
    offset: i64,
    field_type: FieldType,
    value: Value,
}

impl HasValueEdge {
    pub fn new(object: ObjectId, offset: i64, field_type: FieldType, value: Value) -> HasValueEdge {
        HasValueEdge {
            object,
            offset,
            field_type,
            value,
        }
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn value(&self) -> Value {
        self.value
    }

    pub fn size(&self) -> u64 {
        self.field_type.size()
    }

    /// The offset one past the last byte of this field.
    pub fn end(&self) -> i64 {
        self.offset + self.size() as i64
    }

    pub fn with_value(&self, value: Value) -> HasValueEdge {
        HasValueEdge { value, ..*self }
    }

    pub fn with_object(&self, object: ObjectId) -> HasValueEdge {
        HasValueEdge { object, ..*self }
    }

    /// Do the bytes of these two fields overlap.
    pub fn overlaps(&self, other: &HasValueEdge) -> bool {
        self.object == other.object && self.offset < other.end() && other.offset < self.end()
    }
}

impl fmt::Display for HasValueEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}+{} ({}) -> {}",
            self.object, self.offset, self.field_type, self.value
        )
    }
}

/// An address: `value` points to `offset` bytes into `object`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PointToEdge {
    value: Value,
    object: ObjectId,
    offset: i64,
}

impl PointToEdge {
    pub fn new(value: Value, object: ObjectId, offset: i64) -> PointToEdge {
        PointToEdge {
            value,
            object,
            offset,
        }
    }

    pub fn value(&self) -> Value {
        self.value
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn with_value(&self, value: Value) -> PointToEdge {
        PointToEdge { value, ..*self }
    }
}

impl fmt::Display for PointToEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}+{}", self.value, self.object, self.offset)
    }
}

/// Selects has-value edges of one object.
#[derive(Clone, Debug)]
pub struct HasValueEdgeFilter {
    object: ObjectId,
    offset: Option<i64>,
    field_type: Option<FieldType>,
    value: Option<Value>,
    not_value: Option<Value>,
}

impl HasValueEdgeFilter {
    pub fn object_filter(object: ObjectId) -> HasValueEdgeFilter {
        HasValueEdgeFilter {
            object,
            offset: None,
            field_type: None,
            value: None,
            not_value: None,
        }
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn at_offset(mut self, offset: i64) -> HasValueEdgeFilter {
        self.offset = Some(offset);
        self
    }

    pub fn with_type(mut self, field_type: FieldType) -> HasValueEdgeFilter {
        self.field_type = Some(field_type);
        self
    }

    pub fn having_value(mut self, value: Value) -> HasValueEdgeFilter {
        self.value = Some(value);
        self
    }

    pub fn not_having_value(mut self, value: Value) -> HasValueEdgeFilter {
        self.not_value = Some(value);
        self
    }

    /// Does `edge` pass this filter.
    pub fn holds(&self, edge: &HasValueEdge) -> bool {
        edge.object == self.object
            && self.offset.map_or(true, |offset| edge.offset == offset)
            && self
                .field_type
                .map_or(true, |field_type| edge.field_type == field_type)
            && self.value.map_or(true, |value| edge.value == value)
            && self.not_value.map_or(true, |value| edge.value != value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter() {
        let object = ObjectId::new(7);
        let edge = HasValueEdge::new(object, 8, FieldType::integer(4), Value::new(3));

        assert!(HasValueEdgeFilter::object_filter(object).holds(&edge));
        assert!(!HasValueEdgeFilter::object_filter(ObjectId::new(8)).holds(&edge));
        assert!(HasValueEdgeFilter::object_filter(object)
            .at_offset(8)
            .with_type(FieldType::integer(4))
            .holds(&edge));
        assert!(!HasValueEdgeFilter::object_filter(object)
            .at_offset(8)
            .with_type(FieldType::integer(8))
            .holds(&edge));
        assert!(!HasValueEdgeFilter::object_filter(object)
            .not_having_value(Value::new(3))
            .holds(&edge));
        assert!(HasValueEdgeFilter::object_filter(object)
            .having_value(Value::new(3))
            .holds(&edge));
    }

    #[test]
    fn overlaps() {
        let object = ObjectId::new(7);
        let a = HasValueEdge::new(object, 0, FieldType::integer(4), Value::new(1));
        let b = HasValueEdge::new(object, 3, FieldType::integer(4), Value::new(2));
        let c = HasValueEdge::new(object, 4, FieldType::integer(4), Value::new(2));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(c.end(), 8);
    }
}
