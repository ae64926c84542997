use crate::shape::{ObjectId, Value};
use thiserror::Error;

/// Errors raised when the shape graph API is used inconsistently.
///
/// An undefined join is not an error. It is reported by `merge::join`
/// returning `None`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Object {0} does not exist in the shape graph")]
    ObjectNotFound(ObjectId),
    #[error("Object {0} is not a heap object")]
    NotHeapObject(ObjectId),
    #[error("Value {0} has no point-to edge")]
    NotAPointer(Value),
    #[error("Object {0} is not mapped into the merged graph")]
    UnmappedObject(ObjectId),
    #[error("Global variable {0} already names another object")]
    DuplicateGlobal(String),
    #[error("Variable {1} already exists in the frame of {0}")]
    DuplicateStackVariable(String, String),
    #[error("Variable {0} does not exist")]
    VariableNotFound(String),
    #[error("The stack has no frames")]
    EmptyStack,
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
