//! The pool of path constraints of a shape graph.

use crate::merge::MergeTable;
use crate::shape::{Constraint, SymbolicExpression, Value};
use serde::{Deserialize, Serialize};
use std::cmp;
use std::collections::BTreeSet;

/// The path constraints collected along the path to a state.
///
/// Constraints are kept in the order they were added. After a merge, each
/// input pool remembers the constraints the other side does not share: its
/// after-branch condition.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstraintsPool {
    constraints: Vec<SymbolicExpression>,
    disjunction: Vec<Constraint>,
    branch_conditions: BTreeSet<SymbolicExpression>,
}

impl ConstraintsPool {
    pub fn new() -> ConstraintsPool {
        ConstraintsPool::default()
    }

    pub fn add_constraint(&mut self, constraint: SymbolicExpression) {
        self.constraints.push(constraint);
    }

    pub fn add_disjunction(&mut self, disjunction: Constraint) {
        self.disjunction.push(disjunction);
    }

    pub fn constraints(&self) -> &[SymbolicExpression] {
        &self.constraints
    }

    /// The disjunctive part of this pool, if any.
    pub fn disjunction(&self) -> Option<Constraint> {
        match self.disjunction.len() {
            0 => None,
            1 => self.disjunction.first().cloned(),
            _ => Some(Constraint::And(self.disjunction.clone())),
        }
    }

    /// The constraints this pool had that the pool it was last merged with
    /// did not.
    pub fn branch_conditions(&self) -> &BTreeSet<SymbolicExpression> {
        &self.branch_conditions
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty() && self.disjunction.is_empty()
    }

    /// Every value mentioned by a constraint of this pool.
    pub fn values(&self) -> BTreeSet<Value> {
        let mut values: BTreeSet<Value> = self
            .constraints
            .iter()
            .flat_map(|constraint| constraint.values())
            .collect();
        for disjunction in &self.disjunction {
            values.append(&mut disjunction.values());
        }
        values
    }

    /// Drop every constraint mentioning one of `values`.
    pub fn prune(&mut self, values: &BTreeSet<Value>) {
        self.constraints
            .retain(|constraint| constraint.values().is_disjoint(values));
        self.disjunction
            .retain(|constraint| constraint.values().is_disjoint(values));
    }

    pub fn replace_value(&mut self, old: Value, new: Value) {
        for constraint in &mut self.constraints {
            constraint.replace_value(old, new);
        }
    }

    /// Merge this pool with `other`.
    ///
    /// The longest common prefix of constraints that unify through `table`
    /// is kept. The remaining constraints are matched pairwise, allowing a
    /// comparison to match its mirrored form. What is left over on each side
    /// becomes that side's branch conditions, and the merged pool records
    /// that one of the two sides held.
    pub fn merge<M: MergeTable + ?Sized>(
        &mut self,
        other: &mut ConstraintsPool,
        table: &M,
    ) -> ConstraintsPool {
        self.branch_conditions.clear();
        other.branch_conditions.clear();

        let mut merged = ConstraintsPool::new();
        let bound = cmp::min(self.constraints.len(), other.constraints.len());
        let mut index = 0;
        while index < bound {
            match unify_expressions(&self.constraints[index], &other.constraints[index], table) {
                Some(unified) => merged.add_constraint(unified),
                None => break,
            }
            index += 1;
        }

        let mut remaining1 = self.constraints[index..].to_vec();
        let mut remaining2 = other.constraints[index..].to_vec();
        let mut i = 0;
        while i < remaining1.len() {
            let matched = remaining2.iter().enumerate().find_map(|(j, se2)| {
                unify_commuted(&remaining1[i], se2, table).map(|unified| (j, unified))
            });
            match matched {
                Some((j, unified)) => {
                    remaining1.remove(i);
                    remaining2.remove(j);
                    merged.add_constraint(unified);
                }
                None => i += 1,
            }
        }

        self.branch_conditions.extend(remaining1.iter().cloned());
        other.branch_conditions.extend(remaining2.iter().cloned());

        if remaining1.is_empty() && remaining2.is_empty() && self.disjunction == other.disjunction
        {
            merged.disjunction = self.disjunction.clone();
            return merged;
        }

        let mut conjuncts1: Vec<Constraint> =
            remaining1.into_iter().map(Constraint::Simple).collect();
        conjuncts1.extend(self.disjunction().into_iter());
        let mut conjuncts2: Vec<Constraint> =
            remaining2.into_iter().map(Constraint::Simple).collect();
        conjuncts2.extend(other.disjunction().into_iter());
        if !conjuncts1.is_empty() && !conjuncts2.is_empty() {
            merged.add_disjunction(Constraint::Or(vec![
                Constraint::And(conjuncts1),
                Constraint::And(conjuncts2),
            ]));
        }
        merged
    }
}

/// Unify two expressions whose symbolic values come from the two graphs
/// `table` relates.
///
/// Explicit values must be equal. Symbolic values unify when they are the same
/// value or when `table` merges their representatives. Compound expressions
/// unify when their operators match and their operands unify.
pub fn unify_expressions<M: MergeTable + ?Sized>(
    se1: &SymbolicExpression,
    se2: &SymbolicExpression,
    table: &M,
) -> Option<SymbolicExpression> {
    match (se1, se2) {
        (SymbolicExpression::Explicit(e1), SymbolicExpression::Explicit(e2)) => {
            if e1 == e2 {
                Some(se1.clone())
            } else {
                None
            }
        }
        (SymbolicExpression::Symbolic(v1), SymbolicExpression::Symbolic(v2)) => {
            if v1 == v2 {
                return Some(se1.clone());
            }
            let r1 = table.representative_in_first(*v1);
            let r2 = table.representative_in_second(*v2);
            table.merge(r1, r2).map(SymbolicExpression::Symbolic)
        }
        (SymbolicExpression::Unknown, SymbolicExpression::Unknown) => {
            Some(SymbolicExpression::Unknown)
        }
        (SymbolicExpression::Unary(op1, operand1), SymbolicExpression::Unary(op2, operand2)) => {
            if op1 != op2 {
                return None;
            }
            let operand = unify_expressions(operand1, operand2, table)?;
            Some(SymbolicExpression::unary(*op1, operand))
        }
        (
            SymbolicExpression::Binary(op1, lhs1, rhs1),
            SymbolicExpression::Binary(op2, lhs2, rhs2),
        ) => {
            if op1 != op2 {
                return None;
            }
            let lhs = unify_expressions(lhs1, lhs2, table)?;
            let rhs = unify_expressions(rhs1, rhs2, table)?;
            Some(SymbolicExpression::binary(*op1, lhs, rhs))
        }
        (SymbolicExpression::Cast(t1, operand1), SymbolicExpression::Cast(t2, operand2)) => {
            if t1 != t2 {
                return None;
            }
            let operand = unify_expressions(operand1, operand2, table)?;
            Some(SymbolicExpression::cast(*t1, operand))
        }
        _ => None,
    }
}

/// Unify two binary expressions, also trying `a < b` against `b > a`.
fn unify_commuted<M: MergeTable + ?Sized>(
    se1: &SymbolicExpression,
    se2: &SymbolicExpression,
    table: &M,
) -> Option<SymbolicExpression> {
    let (op1, lhs1, rhs1, op2, lhs2, rhs2) = match (se1, se2) {
        (
            SymbolicExpression::Binary(op1, lhs1, rhs1),
            SymbolicExpression::Binary(op2, lhs2, rhs2),
        ) => (op1, lhs1, rhs1, op2, lhs2, rhs2),
        _ => return None,
    };
    if op1 == op2 {
        let lhs = unify_expressions(lhs1, lhs2, table)?;
        let rhs = unify_expressions(rhs1, rhs2, table)?;
        return Some(SymbolicExpression::binary(*op1, lhs, rhs));
    }
    match op2.reversed() {
        Some(reversed) if reversed == *op1 => {
            let lhs = unify_expressions(lhs1, rhs2, table)?;
            let rhs = unify_expressions(rhs1, lhs2, table)?;
            Some(SymbolicExpression::binary(*op1, lhs, rhs))
        }
        _ => None,
    }
}
