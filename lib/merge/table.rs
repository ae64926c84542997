//! Which values of two shape graphs denote the same value.

use crate::shape::{EquivalenceRelation, ExplicitValue, ShapeGraph, Value};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// The value correspondence between the two graphs of a join.
///
/// Implementations decide when a value of the first graph and a value of the
/// second graph denote the same symbolic value, and cache the fresh values
/// the join introduces for explicit values both sides agree on.
pub trait MergeTable {
    /// The value standing for both `v1` of the first graph and `v2` of the
    /// second graph, if they are provably the same.
    fn merge(&self, v1: Value, v2: Value) -> Option<Value>;

    /// The explicit value both `v1` and `v2` are known to hold, if any.
    fn explicit_equality(&self, v1: Value, v2: Value) -> Option<ExplicitValue>;

    /// A value already created for `explicit` during this join.
    fn associated_symbolic(&self, explicit: &ExplicitValue) -> Option<Value>;

    fn add_explicit_relation(&mut self, value: Value, explicit: ExplicitValue);

    fn representative_in_first(&self, value: Value) -> Value;

    fn representative_in_second(&self, value: Value) -> Value;

    /// Values of the second graph that may merge with `value` of the first.
    fn equivalent_in_second(&self, value: Value) -> BTreeSet<Value>;

    /// The equalities that hold in both graphs.
    fn merged_equalities(&self) -> EquivalenceRelation;
}

/// A merge table built from the equality relations and explicit values of
/// the two graphs.
///
/// Two values merge when their equality classes share a value. The smallest
/// shared value stands for both. A value is always in its own class, so a
/// value present in both graphs merges with itself.
#[derive(Clone, Debug)]
pub struct EquivalenceMergeTable {
    eq1: EquivalenceRelation,
    eq2: EquivalenceRelation,
    explicit1: BTreeMap<Value, ExplicitValue>,
    explicit2: BTreeMap<Value, ExplicitValue>,
    explicit_cache: FxHashMap<ExplicitValue, Value>,
}

impl EquivalenceMergeTable {
    pub fn new(graph1: &ShapeGraph, graph2: &ShapeGraph) -> EquivalenceMergeTable {
        EquivalenceMergeTable {
            eq1: graph1.eq().clone(),
            eq2: graph2.eq().clone(),
            explicit1: graph1.explicit_values().clone(),
            explicit2: graph2.explicit_values().clone(),
            explicit_cache: FxHashMap::default(),
        }
    }

    fn explicit(
        eq: &EquivalenceRelation,
        explicit: &BTreeMap<Value, ExplicitValue>,
        value: Value,
    ) -> Option<ExplicitValue> {
        explicit
            .get(&value)
            .or_else(|| explicit.get(&eq.representative(value)))
            .cloned()
    }
}

impl MergeTable for EquivalenceMergeTable {
    fn merge(&self, v1: Value, v2: Value) -> Option<Value> {
        let class1 = self.eq1.class(v1);
        let class2 = self.eq2.class(v2);
        class1.intersection(&class2).next().copied()
    }

    fn explicit_equality(&self, v1: Value, v2: Value) -> Option<ExplicitValue> {
        let e1 = Self::explicit(&self.eq1, &self.explicit1, v1)?;
        let e2 = Self::explicit(&self.eq2, &self.explicit2, v2)?;
        if e1 == e2 {
            Some(e1)
        } else {
            None
        }
    }

    fn associated_symbolic(&self, explicit: &ExplicitValue) -> Option<Value> {
        self.explicit_cache.get(explicit).copied()
    }

    fn add_explicit_relation(&mut self, value: Value, explicit: ExplicitValue) {
        self.explicit_cache.insert(explicit, value);
    }

    fn representative_in_first(&self, value: Value) -> Value {
        self.eq1.representative(value)
    }

    fn representative_in_second(&self, value: Value) -> Value {
        self.eq2.representative(value)
    }

    fn equivalent_in_second(&self, value: Value) -> BTreeSet<Value> {
        self.eq1
            .class(value)
            .into_iter()
            .flat_map(|member| self.eq2.class(member))
            .collect()
    }

    fn merged_equalities(&self) -> EquivalenceRelation {
        let mut merged = EquivalenceRelation::new();
        for class in self.eq1.classes().values() {
            let mut parts: BTreeMap<Value, Vec<Value>> = BTreeMap::new();
            for member in class {
                parts
                    .entry(self.eq2.representative(*member))
                    .or_default()
                    .push(*member);
            }
            for part in parts.values() {
                for pair in part.windows(2) {
                    merged.add_relation(pair[0], pair[1]);
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::IdAllocator;
    use crate::types::MachineModel;

    fn graph_with_equalities(pairs: &[(Value, Value)]) -> ShapeGraph {
        let mut graph = ShapeGraph::new(MachineModel::linux64());
        let mut eq = EquivalenceRelation::new();
        for (a, b) in pairs {
            eq.add_relation(*a, *b);
        }
        graph.add_equalities(&eq);
        graph
    }

    #[test]
    fn merge_through_classes() {
        let mut ids = IdAllocator::new();
        let (a, b, c, d) = (
            ids.fresh_value(),
            ids.fresh_value(),
            ids.fresh_value(),
            ids.fresh_value(),
        );
        let graph1 = graph_with_equalities(&[(a, b)]);
        let graph2 = graph_with_equalities(&[(b, c)]);
        let table = EquivalenceMergeTable::new(&graph1, &graph2);

        assert_eq!(table.merge(a, c), Some(b));
        assert_eq!(table.merge(d, d), Some(d));
        assert_eq!(table.merge(a, d), None);
        assert!(table.equivalent_in_second(a).contains(&c));
    }

    #[test]
    fn merged_equalities_hold_on_both_sides() {
        let mut ids = IdAllocator::new();
        let (a, b, c) = (ids.fresh_value(), ids.fresh_value(), ids.fresh_value());
        let graph1 = graph_with_equalities(&[(a, b), (b, c)]);
        let graph2 = graph_with_equalities(&[(a, c)]);
        let table = EquivalenceMergeTable::new(&graph1, &graph2);

        let merged = table.merged_equalities();
        assert!(merged.is_equal(a, c));
        assert!(!merged.is_equal(a, b));
    }

    #[test]
    fn explicit_values() {
        let mut ids = IdAllocator::new();
        let (a, b) = (ids.fresh_value(), ids.fresh_value());
        let mut graph1 = ShapeGraph::new(MachineModel::linux64());
        graph1.put_explicit_value(a, ExplicitValue::new(7));
        let mut graph2 = ShapeGraph::new(MachineModel::linux64());
        graph2.put_explicit_value(b, ExplicitValue::new(7));

        let mut table = EquivalenceMergeTable::new(&graph1, &graph2);
        assert_eq!(table.explicit_equality(a, b), Some(ExplicitValue::new(7)));
        assert_eq!(table.associated_symbolic(&ExplicitValue::new(7)), None);

        let fresh = ids.fresh_value();
        table.add_explicit_relation(fresh, ExplicitValue::new(7));
        assert_eq!(table.associated_symbolic(&ExplicitValue::new(7)), Some(fresh));
    }
}
