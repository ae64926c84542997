//! Guarded abstraction: which concrete values an abstract value stands for.
//!
//! When a join cannot prove that two values are the same, it introduces a
//! fresh abstract value `u` and records `u -> (v1 | C1, v2 | C2)`: under the
//! after-branch condition `C1` of the first state `u` is `v1`, under `C2` of
//! the second it is `v2`. Abstract values may themselves be abstracted by a
//! later join, forming acyclic chains that `interpret` walks back down.

mod guarded_value;

pub use self::guarded_value::*;

use crate::shape::{Constraint, Value};
use crate::RC;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GuardedAbstraction {
    refinements: RC<BTreeMap<Value, GuardedValuePair>>,
    aliases: RC<BTreeMap<String, String>>,
}

impl GuardedAbstraction {
    pub fn new() -> GuardedAbstraction {
        GuardedAbstraction::default()
    }

    /// Record that `abstract_value` is `v1` under `condition1` and `v2` under
    /// `condition2`.
    pub fn add_abstraction(
        &mut self,
        abstract_value: Value,
        v1: Value,
        condition1: &BTreeSet<Constraint>,
        v2: Value,
        condition2: &BTreeSet<Constraint>,
        max_depth: usize,
    ) {
        let pair = GuardedValuePair::new(
            GuardedValue::new(v1, condition1, max_depth),
            GuardedValue::new(v2, condition2, max_depth),
        );
        RC::make_mut(&mut self.refinements).insert(abstract_value, pair);
    }

    pub fn get(&self, value: Value) -> Option<&GuardedValuePair> {
        self.refinements.get(&value)
    }

    pub fn contains(&self, value: Value) -> bool {
        self.refinements.contains_key(&value)
    }

    pub fn len(&self) -> usize {
        self.refinements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refinements.is_empty()
    }

    /// Record that the object labelled `hidden_name` was joined into the
    /// object labelled `main_name`.
    pub fn add_name_alias<S: Into<String>, T: Into<String>>(&mut self, main_name: S, hidden_name: T) {
        RC::make_mut(&mut self.aliases).insert(main_name.into(), hidden_name.into());
    }

    /// Every label reachable from `name` through name aliases, including
    /// `name` itself.
    pub fn aliases(&self, name: &str) -> BTreeSet<String> {
        let mut aliases = BTreeSet::new();
        let mut current = Some(name.to_string());
        while let Some(name) = current {
            current = self.aliases.get(&name).cloned();
            if !aliases.insert(name) {
                break;
            }
        }
        aliases
    }

    /// The concrete values `value` stands for, each guarded by the conditions
    /// collected along its abstraction chain. Empty if `value` is not an
    /// abstract value.
    pub fn interpret(&self, value: Value) -> Vec<GuardedValue> {
        let mut interpretation = Vec::new();
        let mut queue = VecDeque::new();
        if let Some(pair) = self.refinements.get(&value) {
            queue.push_back(pair.left().clone());
            queue.push_back(pair.right().clone());
        }
        while let Some(guarded) = queue.pop_front() {
            match self.refinements.get(&guarded.value()) {
                Some(pair) => {
                    queue.push_back(pair.left().inherit(&guarded));
                    queue.push_back(pair.right().inherit(&guarded));
                }
                None => interpretation.push(guarded),
            }
        }
        interpretation
    }

    /// Copy every entry and alias of `other` into this abstraction.
    pub fn put_all(&mut self, other: &GuardedAbstraction) {
        if other.is_empty() && other.aliases.is_empty() {
            return;
        }
        let refinements = RC::make_mut(&mut self.refinements);
        for (value, pair) in other.refinements.iter() {
            refinements.insert(*value, pair.clone());
        }
        let aliases = RC::make_mut(&mut self.aliases);
        for (main_name, hidden_name) in other.aliases.iter() {
            aliases.insert(main_name.clone(), hidden_name.clone());
        }
    }

    /// Drop entries mentioning values in `unused`.
    ///
    /// When only one side of an entry is unused, the entry's value and the
    /// other side become equal, which is pushed onto `new_merges`.
    pub fn prune_values(&mut self, unused: &BTreeSet<Value>, new_merges: &mut Vec<(Value, Value)>) {
        let entries: Vec<(Value, Value, Value)> = self
            .refinements
            .iter()
            .map(|(key, pair)| (*key, pair.left_value(), pair.right_value()))
            .collect();
        for (key, left, right) in entries {
            if unused.contains(&key) {
                RC::make_mut(&mut self.refinements).remove(&key);
                continue;
            }
            let prune_left = unused.contains(&left);
            let prune_right = unused.contains(&right);
            if prune_left || prune_right {
                RC::make_mut(&mut self.refinements).remove(&key);
                if !prune_left {
                    new_merges.push((key, left));
                } else if !prune_right {
                    new_merges.push((key, right));
                }
            }
        }
    }

    pub fn prune_value(&mut self, value: Value) {
        if self.refinements.contains_key(&value) {
            RC::make_mut(&mut self.refinements).remove(&value);
        }
    }

    /// Forget the aliases of a removed object.
    pub fn prune_object(&mut self, label: &str) {
        if self.aliases.contains_key(label) {
            RC::make_mut(&mut self.aliases).remove(label);
        }
    }

    /// Rename `old_value` to `new_value`.
    ///
    /// A value appears in at most one abstraction chain. Renaming may make an
    /// entry's value equal to one of its sides, in which case the pair is
    /// pushed onto `new_merges` instead of keeping the entry.
    pub fn merge_values(
        &mut self,
        new_value: Value,
        old_value: Value,
        new_merges: &mut Vec<(Value, Value)>,
    ) {
        if new_value == old_value {
            return;
        }
        let refinements = RC::make_mut(&mut self.refinements);
        if let Some(old_pair) = refinements.remove(&old_value) {
            if old_pair.left_value() == new_value {
                new_merges.push((old_pair.right_value(), new_value));
            } else if old_pair.right_value() == new_value {
                new_merges.push((old_pair.left_value(), new_value));
            } else {
                match refinements.get(&new_value).map(|pair| *pair == old_pair) {
                    Some(true) => {}
                    Some(false) => {
                        refinements.remove(&new_value);
                    }
                    None => {
                        refinements.insert(new_value, old_pair);
                    }
                }
            }
        }

        let keys: Vec<Value> = refinements.keys().copied().collect();
        for key in keys {
            let (left, right) = match refinements.get(&key) {
                Some(pair) => (pair.left_value(), pair.right_value()),
                None => continue,
            };
            if left == old_value {
                if right == new_value {
                    refinements.remove(&key);
                    new_merges.push((key, new_value));
                } else if let Some(pair) = refinements.get_mut(&key) {
                    pair.left_mut().set_value(new_value);
                }
            } else if right == old_value {
                if left == new_value {
                    refinements.remove(&key);
                    new_merges.push((key, new_value));
                } else if let Some(pair) = refinements.get_mut(&key) {
                    pair.right_mut().set_value(new_value);
                }
            }
        }
    }

    /// Reconcile this abstraction, inherited from the first state of a join,
    /// with `that`, inherited from the second.
    ///
    /// Entries present on both sides are kept. Entries only one side has that
    /// stand for the same two values are unified under the smaller key, and
    /// the two keys are pushed onto `new_merges`. The other one-sided entries
    /// are kept; unless their key is already a side of an entry in
    /// `raw_merged` or of a kept entry, their guards are extended with the
    /// after-branch condition of the state they came from.
    pub fn merge(
        &self,
        this_condition: &BTreeSet<Constraint>,
        that: &GuardedAbstraction,
        that_condition: &BTreeSet<Constraint>,
        new_merges: &mut Vec<(Value, Value)>,
        raw_merged: &GuardedAbstraction,
        max_depth: usize,
    ) -> GuardedAbstraction {
        if self == that {
            return self.clone();
        }

        let mut merged: BTreeMap<Value, GuardedValuePair> = BTreeMap::new();
        for (key, pair) in self.refinements.iter() {
            if that.refinements.contains_key(key) {
                merged.insert(*key, pair.clone());
            }
        }

        let mut unique1: BTreeSet<Value> = self
            .refinements
            .keys()
            .filter(|key| !that.refinements.contains_key(key))
            .copied()
            .collect();
        let mut unique2: BTreeSet<Value> = that
            .refinements
            .keys()
            .filter(|key| !self.refinements.contains_key(key))
            .copied()
            .collect();

        let mut matched = Vec::new();
        for key1 in &unique1 {
            let pair1 = &self.refinements[key1];
            let key2 = unique2
                .iter()
                .find(|key2| pair1.same_values(&that.refinements[*key2]))
                .copied();
            if let Some(key2) = key2 {
                unique2.remove(&key2);
                matched.push((*key1, key2));
            }
        }
        for (key1, key2) in matched {
            unique1.remove(&key1);
            merged.insert(
                std::cmp::min(key1, key2),
                self.refinements[&key1].clone(),
            );
            new_merges.push((key1, key2));
        }

        let abstracted: BTreeSet<Value> = merged
            .values()
            .chain(raw_merged.refinements.values())
            .flat_map(|pair| vec![pair.left_value(), pair.right_value()])
            .collect();
        for (keys, refinements, condition) in [
            (&unique1, &self.refinements, this_condition),
            (&unique2, &that.refinements, that_condition),
        ] {
            for key in keys {
                let mut pair = refinements[key].clone();
                if !abstracted.contains(key) {
                    pair.add_more_guards(condition, max_depth);
                }
                merged.insert(*key, pair);
            }
        }

        let mut aliases = (*self.aliases).clone();
        for (main_name, hidden_name) in that.aliases.iter() {
            aliases.insert(main_name.clone(), hidden_name.clone());
        }

        GuardedAbstraction {
            refinements: RC::new(merged),
            aliases: RC::new(aliases),
        }
    }

    /// Rename the concrete sides of every entry: left sides through
    /// `left_replaces`, right sides through `right_replaces`.
    pub fn replace_concrete_values(
        &mut self,
        left_replaces: &BTreeMap<Value, Value>,
        right_replaces: &BTreeMap<Value, Value>,
    ) {
        let updates: Vec<(Value, GuardedValuePair)> = self
            .refinements
            .iter()
            .filter_map(|(key, pair)| {
                let left = pair.left().replace_value(left_replaces);
                let right = pair.right().replace_value(right_replaces);
                if left.is_none() && right.is_none() {
                    return None;
                }
                let pair = GuardedValuePair::new(
                    left.unwrap_or_else(|| pair.left().clone()),
                    right.unwrap_or_else(|| pair.right().clone()),
                );
                Some((*key, pair))
            })
            .collect();
        if updates.is_empty() {
            return;
        }
        let refinements = RC::make_mut(&mut self.refinements);
        for (key, pair) in updates {
            refinements.insert(key, pair);
        }
    }

    /// Every entry without its guards.
    pub fn value_abstraction(&self) -> BTreeMap<Value, (Value, Value)> {
        self.refinements
            .iter()
            .map(|(key, pair)| (*key, (pair.left_value(), pair.right_value())))
            .collect()
    }

    /// Is `abstract_value` an abstraction of `concrete`.
    pub fn abstract_from_to(&self, concrete: Value, abstract_value: Value) -> bool {
        let mut queue = VecDeque::new();
        queue.push_back(abstract_value);
        while let Some(value) = queue.pop_front() {
            if value == concrete {
                return true;
            }
            if let Some(pair) = self.refinements.get(&value) {
                queue.push_back(pair.left_value());
                queue.push_back(pair.right_value());
            }
        }
        false
    }
}
