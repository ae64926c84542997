use crate::shape::{Constraint, SymbolicExpression, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A value that is only meaningful under a guard.
///
/// The guard is a conjunction of simple constraints and of disjunctive
/// clauses.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct GuardedValue {
    value: Value,
    guard: BTreeSet<SymbolicExpression>,
    disjunction: BTreeSet<Constraint>,
}

impl GuardedValue {
    /// Guard `value` with `condition`, keeping at most `max_depth` conditions
    /// (0 keeps all of them).
    pub fn new(value: Value, condition: &BTreeSet<Constraint>, max_depth: usize) -> GuardedValue {
        let mut guarded = GuardedValue::unguarded(value);
        guarded.add_more_guards(condition, max_depth);
        guarded
    }

    pub fn unguarded(value: Value) -> GuardedValue {
        GuardedValue {
            value,
            guard: BTreeSet::new(),
            disjunction: BTreeSet::new(),
        }
    }

    pub fn value(&self) -> Value {
        self.value
    }

    pub fn guard(&self) -> &BTreeSet<SymbolicExpression> {
        &self.guard
    }

    pub fn disjunction(&self) -> &BTreeSet<Constraint> {
        &self.disjunction
    }

    /// Number of conditions in the guard.
    pub fn depth(&self) -> usize {
        self.guard.len() + self.disjunction.len()
    }

    /// This value, additionally guarded by everything guarding `parent`.
    pub fn inherit(&self, parent: &GuardedValue) -> GuardedValue {
        GuardedValue {
            value: self.value,
            guard: self.guard.union(&parent.guard).cloned().collect(),
            disjunction: self
                .disjunction
                .union(&parent.disjunction)
                .cloned()
                .collect(),
        }
    }

    /// Extend the guard with `condition` while it holds fewer than
    /// `max_depth` conditions.
    pub fn add_more_guards(&mut self, condition: &BTreeSet<Constraint>, max_depth: usize) {
        for constraint in condition {
            if max_depth > 0 && self.depth() >= max_depth {
                return;
            }
            match *constraint {
                Constraint::Simple(ref expression) => {
                    self.guard.insert(expression.clone());
                }
                Constraint::And(_) | Constraint::Or(_) => {
                    self.disjunction.insert(constraint.clone());
                }
            }
        }
    }

    /// This guarded value with its value renamed through `replacements`, or
    /// `None` if `replacements` does not rename it.
    pub fn replace_value(&self, replacements: &BTreeMap<Value, Value>) -> Option<GuardedValue> {
        replacements.get(&self.value).map(|replacement| GuardedValue {
            value: *replacement,
            guard: self.guard.clone(),
            disjunction: self.disjunction.clone(),
        })
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = value;
    }
}

impl fmt::Display for GuardedValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let conditions = self
            .guard
            .iter()
            .map(|expression| expression.to_string())
            .chain(self.disjunction.iter().map(|clause| clause.to_string()))
            .collect::<Vec<String>>();
        write!(f, "{} | {{{}}}", self.value, conditions.join(", "))
    }
}

/// The two values an abstract value stands for, one per joined branch.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct GuardedValuePair {
    left: GuardedValue,
    right: GuardedValue,
}

impl GuardedValuePair {
    pub fn new(left: GuardedValue, right: GuardedValue) -> GuardedValuePair {
        GuardedValuePair { left, right }
    }

    pub fn left(&self) -> &GuardedValue {
        &self.left
    }

    pub fn right(&self) -> &GuardedValue {
        &self.right
    }

    pub fn left_value(&self) -> Value {
        self.left.value
    }

    pub fn right_value(&self) -> Value {
        self.right.value
    }

    /// Do both pairs stand for the same two values.
    pub fn same_values(&self, other: &GuardedValuePair) -> bool {
        self.left_value() == other.left_value() && self.right_value() == other.right_value()
    }

    pub fn add_more_guards(&mut self, condition: &BTreeSet<Constraint>, max_depth: usize) {
        self.left.add_more_guards(condition, max_depth);
        self.right.add_more_guards(condition, max_depth);
    }

    pub(crate) fn left_mut(&mut self) -> &mut GuardedValue {
        &mut self.left
    }

    pub(crate) fn right_mut(&mut self) -> &mut GuardedValue {
        &mut self.right
    }
}

impl fmt::Display for GuardedValuePair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::BinaryOperator;

    fn condition(values: &[u64]) -> BTreeSet<Constraint> {
        values
            .iter()
            .map(|v| {
                Constraint::Simple(SymbolicExpression::binary(
                    BinaryOperator::NotEqual,
                    SymbolicExpression::symbolic(Value::new(*v)),
                    SymbolicExpression::explicit(0),
                ))
            })
            .collect()
    }

    #[test]
    fn truncated_guard() {
        let guarded = GuardedValue::new(Value::new(1), &condition(&[2, 3, 4]), 2);
        assert_eq!(guarded.depth(), 2);

        let unlimited = GuardedValue::new(Value::new(1), &condition(&[2, 3, 4]), 0);
        assert_eq!(unlimited.depth(), 3);
    }

    #[test]
    fn disjunctions_kept_apart() {
        let mut condition = condition(&[2]);
        condition.insert(Constraint::Or(vec![
            Constraint::And(vec![]),
            Constraint::And(vec![]),
        ]));
        let guarded = GuardedValue::new(Value::new(1), &condition, 0);
        assert_eq!(guarded.guard().len(), 1);
        assert_eq!(guarded.disjunction().len(), 1);
    }

    #[test]
    fn inherit() {
        let parent = GuardedValue::new(Value::new(1), &condition(&[2]), 0);
        let child = GuardedValue::new(Value::new(5), &condition(&[3]), 0);
        let inherited = child.inherit(&parent);
        assert_eq!(inherited.value(), Value::new(5));
        assert_eq!(inherited.depth(), 2);
    }

    #[test]
    fn replace_value() {
        let guarded = GuardedValue::new(Value::new(1), &condition(&[2]), 0);
        let mut replacements = BTreeMap::new();
        assert!(guarded.replace_value(&replacements).is_none());

        replacements.insert(Value::new(1), Value::new(9));
        let replaced = guarded.replace_value(&replacements).unwrap();
        assert_eq!(replaced.value(), Value::new(9));
        assert_eq!(replaced.guard(), guarded.guard());
    }
}
