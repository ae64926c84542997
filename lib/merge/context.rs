use crate::merge::abstraction::GuardedAbstraction;
use crate::merge::{JoinOptions, MergeTable, NodeMapping};
use crate::shape::{Constraint, IdAllocator, ShapeGraph};
use crate::Error;
use std::collections::BTreeSet;

/// The outcome of one step of a join. `Ok(None)` means the join is
/// undefined.
pub(crate) type JoinResult<T> = Result<Option<T>, Error>;

/// Everything the join workers read and update.
///
/// The input graphs are working copies. Field conciliation and the
/// constraint merge change them, the caller's graphs are never touched. When
/// a worker reports the join undefined the whole context is dropped.
pub(crate) struct JoinContext<'a, M: MergeTable + ?Sized> {
    pub(crate) graph1: ShapeGraph,
    pub(crate) graph2: ShapeGraph,
    pub(crate) dest: ShapeGraph,
    pub(crate) mapping1: NodeMapping,
    pub(crate) mapping2: NodeMapping,
    /// Abstract values introduced by this join.
    pub(crate) abstraction: GuardedAbstraction,
    /// After-branch conditions of the two inputs.
    pub(crate) condition1: BTreeSet<Constraint>,
    pub(crate) condition2: BTreeSet<Constraint>,
    pub(crate) table: &'a mut M,
    pub(crate) ids: &'a mut IdAllocator,
    pub(crate) options: &'a JoinOptions,
}

impl<'a, M: MergeTable + ?Sized> JoinContext<'a, M> {
    pub(crate) fn new(
        graph1: &ShapeGraph,
        graph2: &ShapeGraph,
        table: &'a mut M,
        ids: &'a mut IdAllocator,
        options: &'a JoinOptions,
    ) -> JoinContext<'a, M> {
        JoinContext {
            graph1: graph1.clone(),
            graph2: graph2.clone(),
            dest: ShapeGraph::new(graph1.machine_model().clone()),
            mapping1: NodeMapping::new(),
            mapping2: NodeMapping::new(),
            abstraction: GuardedAbstraction::new(),
            condition1: BTreeSet::new(),
            condition2: BTreeSet::new(),
            table,
            ids,
            options,
        }
    }

    pub(crate) fn max_guard_depth(&self) -> usize {
        self.options.max_guard_depth()
    }

    /// The input graph of `side`, its mapping, the other side's mapping and
    /// the merged graph.
    pub(crate) fn side_mut(
        &mut self,
        side: Side,
    ) -> (&ShapeGraph, &mut NodeMapping, &NodeMapping, &mut ShapeGraph) {
        match side {
            Side::First => (&self.graph1, &mut self.mapping1, &self.mapping2, &mut self.dest),
            Side::Second => (&self.graph2, &mut self.mapping2, &self.mapping1, &mut self.dest),
        }
    }
}

/// One of the two inputs of a join.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Side {
    First,
    Second,
}
