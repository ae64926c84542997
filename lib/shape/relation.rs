//! Equality and inequality relations over symbolic values.

use crate::shape::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Partitions values into classes of values known to be equal.
///
/// The representative of a class is its smallest value. A value that was
/// never related to another is its own class.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EquivalenceRelation {
    representatives: BTreeMap<Value, Value>,
    classes: BTreeMap<Value, BTreeSet<Value>>,
}

impl EquivalenceRelation {
    pub fn new() -> EquivalenceRelation {
        EquivalenceRelation::default()
    }

    /// Relate `a` and `b`. Returns true if they were already equal.
    pub fn add_relation(&mut self, a: Value, b: Value) -> bool {
        let rep_a = self.representative(a);
        let rep_b = self.representative(b);
        if rep_a == rep_b {
            return true;
        }

        let mut members = self.class(a);
        members.append(&mut self.class(b));
        self.classes.remove(&rep_a);
        self.classes.remove(&rep_b);

        // members is never empty
        let representative = members.iter().next().copied().unwrap_or(rep_a);
        for member in &members {
            self.representatives.insert(*member, representative);
        }
        self.classes.insert(representative, members);
        false
    }

    pub fn representative(&self, value: Value) -> Value {
        self.representatives.get(&value).copied().unwrap_or(value)
    }

    /// All values equal to `value`, including `value` itself.
    pub fn class(&self, value: Value) -> BTreeSet<Value> {
        match self.classes.get(&self.representative(value)) {
            Some(class) => class.clone(),
            None => {
                let mut class = BTreeSet::new();
                class.insert(value);
                class
            }
        }
    }

    pub fn contains(&self, value: Value) -> bool {
        self.representatives.contains_key(&value)
    }

    pub fn is_equal(&self, a: Value, b: Value) -> bool {
        self.representative(a) == self.representative(b)
    }

    /// Every class with more than one member, keyed by representative.
    pub fn classes(&self) -> &BTreeMap<Value, BTreeSet<Value>> {
        &self.classes
    }

    /// Add every relation of `other` to this relation.
    pub fn add_all(&mut self, other: &EquivalenceRelation) {
        for (representative, class) in &other.classes {
            for member in class {
                self.add_relation(*representative, *member);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A symmetric relation of values known to differ.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InequalityRelation {
    neighbours: BTreeMap<Value, BTreeSet<Value>>,
}

impl InequalityRelation {
    pub fn new() -> InequalityRelation {
        InequalityRelation::default()
    }

    pub fn add_relation(&mut self, a: Value, b: Value) {
        self.neighbours.entry(a).or_default().insert(b);
        self.neighbours.entry(b).or_default().insert(a);
    }

    pub fn exists(&self, a: Value, b: Value) -> bool {
        self.neighbours
            .get(&a)
            .map_or(false, |neighbours| neighbours.contains(&b))
    }

    /// Every value known to differ from `value`.
    pub fn neighbours(&self, value: Value) -> BTreeSet<Value> {
        self.neighbours.get(&value).cloned().unwrap_or_default()
    }

    /// Every related pair, each pair appearing in both orders.
    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.neighbours
            .iter()
            .flat_map(|(a, neighbours)| neighbours.iter().map(move |b| (*a, *b)))
            .collect()
    }

    /// Move every relation of `old` to `new`.
    pub fn merge_values(&mut self, new: Value, old: Value) {
        for neighbour in self.neighbours(old) {
            self.remove_relation(old, neighbour);
            if neighbour != new {
                self.add_relation(new, neighbour);
            }
        }
    }

    pub fn remove_relation(&mut self, a: Value, b: Value) {
        for (x, y) in [(a, b), (b, a)] {
            if let Some(neighbours) = self.neighbours.get_mut(&x) {
                neighbours.remove(&y);
                if neighbours.is_empty() {
                    self.neighbours.remove(&x);
                }
            }
        }
    }

    pub fn remove_value(&mut self, value: Value) {
        for neighbour in self.neighbours(value) {
            self.remove_relation(value, neighbour);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }
}
