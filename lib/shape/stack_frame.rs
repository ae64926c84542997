use crate::shape::ObjectId;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The frame of one function call.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StackFrame {
    function: String,
    variables: BTreeMap<String, ObjectId>,
    variable_length_arrays: BTreeSet<ObjectId>,
    return_object: Option<ObjectId>,
}

impl StackFrame {
    /// Create a frame for `function`. `return_object` is the slot holding the
    /// return value, if the function returns one.
    pub fn new<S: Into<String>>(function: S, return_object: Option<ObjectId>) -> StackFrame {
        StackFrame {
            function: function.into(),
            variables: BTreeMap::new(),
            variable_length_arrays: BTreeSet::new(),
            return_object,
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn variables(&self) -> &BTreeMap<String, ObjectId> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<ObjectId> {
        self.variables.get(name).copied()
    }

    pub fn return_object(&self) -> Option<ObjectId> {
        self.return_object
    }

    pub fn add_variable<S: Into<String>>(
        &mut self,
        name: S,
        object: ObjectId,
        variable_length_array: bool,
    ) -> Result<(), Error> {
        let name = name.into();
        if self.variables.contains_key(&name) {
            return Err(Error::DuplicateStackVariable(self.function.clone(), name));
        }
        self.variables.insert(name, object);
        if variable_length_array {
            self.variable_length_arrays.insert(object);
        }
        Ok(())
    }

    pub fn is_variable_length_array(&self, object: ObjectId) -> bool {
        self.variable_length_arrays.contains(&object)
    }

    /// Does this frame own `object`, as a variable or as the return slot.
    pub fn contains_object(&self, object: ObjectId) -> bool {
        self.return_object == Some(object) || self.variables.values().any(|o| *o == object)
    }

    /// Every object owned by this frame.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.variables.values().copied().chain(self.return_object)
    }
}
