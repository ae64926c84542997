use crate::shape::IdAllocator;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::cmp;
use std::fmt;

/// A handle to a memory object.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The object every null pointer points to.
    pub const NULL: ObjectId = ObjectId(0);
    /// Placeholder target for addresses whose real target is recovered
    /// through a guarded abstraction.
    pub const VOID: ObjectId = ObjectId(1);

    pub(crate) const FIRST_ALLOCATED: u64 = 2;

    pub fn new(id: u64) -> ObjectId {
        ObjectId(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    /// Is this one of the `NULL` or `VOID` sentinels.
    pub fn is_sentinel(&self) -> bool {
        *self == ObjectId::NULL || *self == ObjectId::VOID
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

bitflags! {
    /// Attributes of a memory object.
    #[derive(Deserialize, Serialize)]
    pub struct ObjectFlags: u32 {
        const NONE           = 0b00;
        /// Bytes without a has-value edge read as zero (calloc, globals).
        const ZERO_INIT      = 0b01;
        const STRING_LITERAL = 0b10;
    }
}

/// The shape of a memory object.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ObjectKind {
    Null,
    Void,
    /// A concrete block of memory.
    Region,
    /// A singly-linked list segment of at least `min_length` nodes.
    SinglyLinked { next_offset: i64, min_length: u32 },
    /// A doubly-linked list segment of at least `min_length` nodes.
    DoublyLinked {
        next_offset: i64,
        prev_offset: i64,
        min_length: u32,
    },
    /// Concrete regions that no longer agree on their size.
    Summary,
}

/// A memory object of a shape graph.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct MemoryObject {
    id: ObjectId,
    label: String,
    size: u64,
    kind: ObjectKind,
    flags: ObjectFlags,
}

impl MemoryObject {
    pub fn null() -> MemoryObject {
        MemoryObject {
            id: ObjectId::NULL,
            label: "NULL".to_string(),
            size: 0,
            kind: ObjectKind::Null,
            flags: ObjectFlags::NONE,
        }
    }

    pub fn void() -> MemoryObject {
        MemoryObject {
            id: ObjectId::VOID,
            label: "VOID".to_string(),
            size: 0,
            kind: ObjectKind::Void,
            flags: ObjectFlags::NONE,
        }
    }

    /// Create a concrete region of `size` bytes.
    pub fn region<S: Into<String>>(id: ObjectId, label: S, size: u64) -> MemoryObject {
        MemoryObject {
            id,
            label: label.into(),
            size,
            kind: ObjectKind::Region,
            flags: ObjectFlags::NONE,
        }
    }

    /// Create a singly-linked list segment whose nodes are `size` bytes.
    pub fn singly_linked<S: Into<String>>(
        id: ObjectId,
        label: S,
        size: u64,
        next_offset: i64,
        min_length: u32,
    ) -> MemoryObject {
        MemoryObject {
            id,
            label: label.into(),
            size,
            kind: ObjectKind::SinglyLinked {
                next_offset,
                min_length,
            },
            flags: ObjectFlags::NONE,
        }
    }

    /// Create a doubly-linked list segment whose nodes are `size` bytes.
    pub fn doubly_linked<S: Into<String>>(
        id: ObjectId,
        label: S,
        size: u64,
        next_offset: i64,
        prev_offset: i64,
        min_length: u32,
    ) -> MemoryObject {
        MemoryObject {
            id,
            label: label.into(),
            size,
            kind: ObjectKind::DoublyLinked {
                next_offset,
                prev_offset,
                min_length,
            },
            flags: ObjectFlags::NONE,
        }
    }

    pub fn with_flags(mut self, flags: ObjectFlags) -> MemoryObject {
        self.flags = flags;
        self
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn is_zero_init(&self) -> bool {
        self.flags.contains(ObjectFlags::ZERO_INIT)
    }

    pub fn is_string_literal(&self) -> bool {
        self.flags.contains(ObjectFlags::STRING_LITERAL)
    }

    pub fn is_null(&self) -> bool {
        self.kind == ObjectKind::Null
    }

    pub fn is_region(&self) -> bool {
        self.kind == ObjectKind::Region
    }

    /// Does this object stand for more than one concrete block of memory.
    pub fn is_abstract(&self) -> bool {
        match self.kind {
            ObjectKind::SinglyLinked { .. }
            | ObjectKind::DoublyLinked { .. }
            | ObjectKind::Summary => true,
            ObjectKind::Null | ObjectKind::Void | ObjectKind::Region => false,
        }
    }

    /// Join this object with `other`.
    ///
    /// Returns the object that stands for both, or `None` if the two objects
    /// have incompatible kinds or sizes. An object joined with itself is
    /// returned unchanged. Any other join allocates a fresh handle.
    pub fn join(&self, other: &MemoryObject, ids: &mut IdAllocator) -> Option<MemoryObject> {
        if self.id == other.id {
            return Some(self.clone());
        }
        if self.is_zero_init() != other.is_zero_init() {
            return None;
        }

        let kind = match (&self.kind, &other.kind) {
            (ObjectKind::Region, ObjectKind::Region) => {
                if self.size == other.size {
                    ObjectKind::Region
                } else {
                    ObjectKind::Summary
                }
            }
            (ObjectKind::Summary, kind) | (kind, ObjectKind::Summary) => match kind {
                ObjectKind::Null | ObjectKind::Void => return None,
                _ => ObjectKind::Summary,
            },
            (ObjectKind::Region, list) | (list, ObjectKind::Region) => {
                if self.size != other.size {
                    return None;
                }
                match *list {
                    ObjectKind::SinglyLinked {
                        next_offset,
                        min_length,
                    } => ObjectKind::SinglyLinked {
                        next_offset,
                        min_length: cmp::min(min_length, 1),
                    },
                    ObjectKind::DoublyLinked {
                        next_offset,
                        prev_offset,
                        min_length,
                    } => ObjectKind::DoublyLinked {
                        next_offset,
                        prev_offset,
                        min_length: cmp::min(min_length, 1),
                    },
                    _ => return None,
                }
            }
            (
                ObjectKind::SinglyLinked {
                    next_offset: next1,
                    min_length: length1,
                },
                ObjectKind::SinglyLinked {
                    next_offset: next2,
                    min_length: length2,
                },
            ) => {
                if next1 != next2 || self.size != other.size {
                    return None;
                }
                ObjectKind::SinglyLinked {
                    next_offset: *next1,
                    min_length: cmp::min(*length1, *length2),
                }
            }
            (
                ObjectKind::DoublyLinked {
                    next_offset: next1,
                    prev_offset: prev1,
                    min_length: length1,
                },
                ObjectKind::DoublyLinked {
                    next_offset: next2,
                    prev_offset: prev2,
                    min_length: length2,
                },
            ) => {
                if next1 != next2 || prev1 != prev2 || self.size != other.size {
                    return None;
                }
                ObjectKind::DoublyLinked {
                    next_offset: *next1,
                    prev_offset: *prev1,
                    min_length: cmp::min(*length1, *length2),
                }
            }
            _ => return None,
        };

        Some(MemoryObject {
            id: ids.fresh_object_id(),
            label: self.label.clone(),
            size: cmp::max(self.size, other.size),
            kind,
            flags: self.flags & other.flags,
        })
    }
}

impl fmt::Display for MemoryObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}[{}]", self.id, self.label, self.size)
    }
}
