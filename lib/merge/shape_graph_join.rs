use crate::merge::abstraction::GuardedAbstraction;
use crate::merge::context::{JoinContext, JoinResult};
use crate::merge::value_join::merge_symbolic_values;
use crate::merge::{object_join, pending_join, JoinOptions, MergeTable, NodeMapping};
use crate::shape::*;
use crate::Error;
use log::{debug, info, trace};
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, BTreeSet};

/// The join of two shape graphs.
///
/// Holds the merged graph when the join is defined, together with the
/// mappings from each input graph into it and the abstraction the join
/// introduced.
#[derive(Clone, Debug)]
pub struct ShapeGraphJoin {
    merged: Option<ShapeGraph>,
    mapping1: NodeMapping,
    mapping2: NodeMapping,
    abstraction: GuardedAbstraction,
}

impl ShapeGraphJoin {
    /// Join `graph1` and `graph2`. Neither input is modified.
    ///
    /// `table` relates the values of the two graphs, `ids` hands out fresh
    /// values and objects.
    pub fn new<M: MergeTable + ?Sized>(
        graph1: &ShapeGraph,
        graph2: &ShapeGraph,
        table: &mut M,
        ids: &mut IdAllocator,
        options: &JoinOptions,
    ) -> Result<ShapeGraphJoin, Error> {
        let mut ctx = JoinContext::new(graph1, graph2, table, ids, options);
        let defined = join_graphs(&mut ctx)?.is_some();

        if defined {
            info!(
                "joined shape graphs: {} objects, {} values, {} abstract values",
                ctx.dest.objects().count(),
                ctx.dest.values().len(),
                ctx.abstraction.len()
            );
        } else {
            info!("shape graph join undefined");
        }

        let JoinContext {
            dest,
            mapping1,
            mapping2,
            abstraction,
            ..
        } = ctx;
        Ok(ShapeGraphJoin {
            merged: if defined { Some(dest) } else { None },
            mapping1,
            mapping2,
            abstraction,
        })
    }

    pub fn is_defined(&self) -> bool {
        self.merged.is_some()
    }

    /// The merged graph, if the join is defined.
    pub fn merged(&self) -> Option<&ShapeGraph> {
        self.merged.as_ref()
    }

    pub fn into_merged(self) -> Option<ShapeGraph> {
        self.merged
    }

    /// Where the objects of the first graph went.
    pub fn mapping1(&self) -> &NodeMapping {
        &self.mapping1
    }

    /// Where the objects of the second graph went.
    pub fn mapping2(&self) -> &NodeMapping {
        &self.mapping2
    }

    /// Every abstract value of the merged graph.
    pub fn abstraction(&self) -> &GuardedAbstraction {
        &self.abstraction
    }
}

/// Join `graph1` and `graph2`, returning `None` if the join is undefined.
pub fn join<M: MergeTable + ?Sized>(
    graph1: &ShapeGraph,
    graph2: &ShapeGraph,
    table: &mut M,
    ids: &mut IdAllocator,
    options: &JoinOptions,
) -> Result<Option<ShapeGraph>, Error> {
    Ok(ShapeGraphJoin::new(graph1, graph2, table, ids, options)?.into_merged())
}

fn join_graphs<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) -> JoinResult<()> {
    let equalities = ctx.table.merged_equalities();
    ctx.dest.add_equalities(&equalities);

    merge_neq(ctx);
    merge_constraints(ctx);
    merge_size_info(ctx);

    try_join!(merge_globals(ctx));
    try_join!(merge_stack_frames(ctx));
    try_join!(join_roots(ctx));

    reconcile_abstraction(ctx);
    admit_unshared_globals(ctx)?;
    try_join!(pending_join::resolve_pending(ctx));
    try_join!(merge_point_tos(ctx));

    let mut dangling = BTreeSet::new();
    for (graph, mapping) in [(&ctx.graph1, &ctx.mapping1), (&ctx.graph2, &ctx.mapping2)] {
        dangling.extend(
            graph
                .dangling_set()
                .iter()
                .filter_map(|object| mapping.get(*object)),
        );
    }
    ctx.dest.set_dangling_set(dangling);
    ctx.dest
        .set_memory_leak(ctx.graph1.has_memory_leak() || ctx.graph2.has_memory_leak());
    let leak_edges = ctx
        .graph1
        .leak_edges()
        .union(ctx.graph2.leak_edges())
        .cloned()
        .collect();
    ctx.dest.set_leak_edges(leak_edges);
    ctx.dest.set_abstraction(ctx.abstraction.clone());
    Ok(Some(()))
}

/// Keep the inequalities of the first graph that also hold, through the
/// table, in the second.
fn merge_neq<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) {
    for (l1, r1) in ctx.graph1.neq().pairs() {
        if l1 >= r1 {
            continue;
        }
        'candidates: for l2 in ctx.table.equivalent_in_second(l1) {
            for r2 in ctx.graph2.neq().neighbours(l2) {
                if let Some(right) = ctx.table.merge(r1, r2) {
                    if let Some(left) = ctx.table.merge(l1, l2) {
                        ctx.dest.add_neq(left, right);
                    }
                    break 'candidates;
                }
            }
        }
    }
}

/// Merge the constraint pools. This also leaves the after-branch condition
/// of each input in its working copy.
fn merge_constraints<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) {
    let pool = ctx
        .graph1
        .constraints_pool_mut()
        .merge(ctx.graph2.constraints_pool_mut(), &*ctx.table);
    ctx.dest.set_constraints_pool(pool);
    ctx.condition1 = ctx.graph1.after_branch_condition();
    ctx.condition2 = ctx.graph2.after_branch_condition();
    trace!(
        "after-branch conditions: {} and {} constraints",
        ctx.condition1.len(),
        ctx.condition2.len()
    );
}

fn merge_size_info<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) {
    let sizes1 = ctx.graph1.size_info();
    let sizes2 = ctx.graph2.size_info();
    let mut sizes = BTreeMap::new();
    for (object, size1) in sizes1 {
        let size = match sizes2.get(object) {
            Some(size2) => {
                unify_expressions(size1, size2, &*ctx.table).unwrap_or_else(|| size1.clone())
            }
            None => size1.clone(),
        };
        sizes.insert(*object, size);
    }
    for (object, size2) in sizes2 {
        sizes.entry(*object).or_insert_with(|| size2.clone());
    }
    for (object, size) in sizes {
        ctx.dest.add_size_info(object, size);
    }
}

/// Join a pair of root objects (globals, locals, return slots).
fn join_root_objects<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    object1: ObjectId,
    object2: ObjectId,
) -> JoinResult<MemoryObject> {
    let o1 = ctx
        .graph1
        .object(object1)
        .ok_or(Error::ObjectNotFound(object1))?;
    let o2 = ctx
        .graph2
        .object(object2)
        .ok_or(Error::ObjectNotFound(object2))?;
    match o1.join(o2, ctx.ids) {
        Some(joined) if joined.is_region() => {
            ctx.mapping1.put_object(object1, joined.id());
            ctx.mapping2.put_object(object2, joined.id());
            Ok(Some(joined))
        }
        _ => {
            debug!("join undefined: roots {} and {} do not join into a region", o1, o2);
            Ok(None)
        }
    }
}

fn merge_globals<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) -> JoinResult<()> {
    let shared: Vec<(ObjectId, ObjectId)> = ctx
        .graph1
        .globals()
        .iter()
        .filter_map(|(name, id1)| ctx.graph2.global(name).map(|id2| (*id1, id2)))
        .collect();
    for (id1, id2) in shared {
        let joined = try_join!(join_root_objects(ctx, id1, id2));
        ctx.dest.add_global_object(joined)?;
    }
    Ok(Some(()))
}

fn merge_stack_frames<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) -> JoinResult<()> {
    let frames1 = ctx.graph1.stack_frames().to_vec();
    let frames2 = ctx.graph2.stack_frames().to_vec();
    if frames1.len() != frames2.len() {
        debug!(
            "join undefined: stack depths {} and {} differ",
            frames1.len(),
            frames2.len()
        );
        return Ok(None);
    }

    for (frame1, frame2) in frames1.iter().zip(frames2.iter()) {
        if frame1.function() != frame2.function() {
            debug!(
                "join undefined: frames of {} and {} differ",
                frame1.function(),
                frame2.function()
            );
            return Ok(None);
        }

        let return_object = match (frame1.return_object(), frame2.return_object()) {
            (Some(r1), Some(r2)) => Some(try_join!(join_root_objects(ctx, r1, r2))),
            (None, None) => None,
            _ => {
                debug!("join undefined: return slots of {} differ", frame1.function());
                return Ok(None);
            }
        };
        ctx.dest.add_stack_frame(frame1.function(), return_object);

        for (name, id1) in frame1.variables() {
            let id2 = match frame2.variable(name) {
                Some(id2) => id2,
                None => continue,
            };
            if frame1.is_variable_length_array(*id1) != frame2.is_variable_length_array(id2) {
                debug!("join undefined: {} is a variable length array on one side only", name);
                return Ok(None);
            }
            let joined = try_join!(join_root_objects(ctx, *id1, id2));
            ctx.dest
                .add_stack_object(joined, frame1.is_variable_length_array(*id1))?;
        }
    }
    Ok(Some(()))
}

/// Object join of every root: globals first, then the stack frames from the
/// innermost outward, locals before the return slot.
fn join_roots<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) -> JoinResult<()> {
    let globals: Vec<(String, ObjectId)> = ctx
        .dest
        .globals()
        .iter()
        .map(|(name, id)| (name.clone(), *id))
        .collect();
    for (name, dest) in globals {
        let id1 = ctx
            .graph1
            .global(&name)
            .ok_or_else(|| Error::VariableNotFound(name.clone()))?;
        let id2 = ctx
            .graph2
            .global(&name)
            .ok_or_else(|| Error::VariableNotFound(name.clone()))?;
        try_join!(object_join::join_objects(ctx, id1, id2, dest));
    }

    let frames1 = ctx.graph1.stack_frames().to_vec();
    let frames2 = ctx.graph2.stack_frames().to_vec();
    let frames = ctx.dest.stack_frames().to_vec();
    for ((frame1, frame2), frame) in frames1
        .iter()
        .rev()
        .zip(frames2.iter().rev())
        .zip(frames.iter().rev())
    {
        trace!("joining frame of {}", frame.function());
        for (name, dest) in frame.variables() {
            let id1 = frame1
                .variable(name)
                .ok_or_else(|| Error::VariableNotFound(name.clone()))?;
            let id2 = frame2
                .variable(name)
                .ok_or_else(|| Error::VariableNotFound(name.clone()))?;
            try_join!(object_join::join_objects(ctx, id1, id2, *dest));
        }
        if let (Some(r1), Some(r2), Some(dest)) = (
            frame1.return_object(),
            frame2.return_object(),
            frame.return_object(),
        ) {
            try_join!(object_join::join_objects(ctx, r1, r2, dest));
        }
    }
    Ok(Some(()))
}

/// Fold the abstractions the inputs inherited into the one this join
/// built, then apply the value unifications the reconciliation produced.
fn reconcile_abstraction<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) {
    ctx.abstraction
        .replace_concrete_values(ctx.mapping1.replacements(), ctx.mapping2.replacements());

    let mut new_merges = Vec::new();
    let inherited = ctx.graph1.abstraction().merge(
        &ctx.condition1,
        ctx.graph2.abstraction(),
        &ctx.condition2,
        &mut new_merges,
        &ctx.abstraction,
        ctx.options.max_guard_depth(),
    );
    ctx.abstraction.put_all(&inherited);
    for (v1, v2) in new_merges {
        trace!("abstraction reconciliation merges {} and {}", v1, v2);
        ctx.dest.merge_values(v1, v2);
    }
}

/// Globals only one input has, such as string literals created in one
/// branch, are taken over unchanged.
fn admit_unshared_globals<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) -> Result<(), Error> {
    for (graph, other, mapping) in [
        (&ctx.graph1, &ctx.graph2, &mut ctx.mapping1),
        (&ctx.graph2, &ctx.graph1, &mut ctx.mapping2),
    ] {
        for (name, id) in graph.globals() {
            if other.global(name).is_some() {
                continue;
            }
            let object = graph.object(*id).ok_or(Error::ObjectNotFound(*id))?;
            trace!("admitting unshared global {}", object);
            mapping.put_object(*id, *id);
            ctx.dest.add_global_object(object.clone())?;
            ctx.dest.set_validity(*id, graph.is_object_valid(*id));
            if object.is_string_literal() {
                for edge in graph.hv_edges(&HasValueEdgeFilter::object_filter(*id)) {
                    ctx.dest.add_has_value_edge(edge)?;
                }
            }
        }
    }
    Ok(())
}

type PointerInfo = BTreeMap<ObjectId, BTreeMap<i64, Value>>;

/// Split the point-to edges of `graph` the merged graph does not have yet by
/// whether their target is mapped into it, keyed by the merged object for
/// mapped targets and by the input object otherwise.
fn classify_point_tos(
    graph: &ShapeGraph,
    mapping: &NodeMapping,
    dest: &ShapeGraph,
) -> (PointerInfo, PointerInfo) {
    let mut mapped = PointerInfo::new();
    let mut unmapped = PointerInfo::new();
    for edge in graph.point_to_edges().values() {
        if edge.object().is_sentinel()
            || dest.is_pointer(edge.value())
            || mapping.replacement(edge.value()).is_some()
        {
            continue;
        }
        let (info, object) = match mapping.get(edge.object()) {
            Some(image) => (&mut mapped, image),
            None => (&mut unmapped, edge.object()),
        };
        info.entry(object)
            .or_default()
            .insert(edge.offset(), edge.value());
    }
    (mapped, unmapped)
}

fn add_point_tos(dest: &mut ShapeGraph, object: ObjectId, offsets: &BTreeMap<i64, Value>) -> Result<(), Error> {
    for (offset, value) in offsets {
        if dest.is_pointer(*value) {
            continue;
        }
        dest.add_point_to_edge(PointToEdge::new(*value, object, *offset))?;
    }
    Ok(())
}

/// Merge two offset-sorted lists of addresses into `object`. Addresses at the
/// same offset are merged into one value.
fn merge_point_to_edges<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    object: ObjectId,
    offsets1: &BTreeMap<i64, Value>,
    offsets2: &BTreeMap<i64, Value>,
) -> Result<(), Error> {
    let mut iter1 = offsets1.iter().peekable();
    let mut iter2 = offsets2.iter().peekable();
    loop {
        let (offset, value) = match (iter1.peek(), iter2.peek()) {
            (None, None) => break,
            (Some((offset, value)), None) => {
                let next = (**offset, **value);
                iter1.next();
                next
            }
            (None, Some((offset, value))) => {
                let next = (**offset, **value);
                iter2.next();
                next
            }
            (Some((offset1, value1)), Some((offset2, value2))) => {
                let (offset1, value1, offset2, value2) = (**offset1, **value1, **offset2, **value2);
                if offset1 == offset2 {
                    iter1.next();
                    iter2.next();
                    (offset1, merge_symbolic_values(ctx, value1, value2))
                } else if offset1 < offset2 {
                    iter1.next();
                    (offset1, value1)
                } else {
                    iter2.next();
                    (offset2, value2)
                }
            }
        };
        if !ctx.dest.is_pointer(value) {
            ctx.dest
                .add_point_to_edge(PointToEdge::new(value, object, offset))?;
        }
    }
    Ok(())
}

fn merge_point_tos<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) -> JoinResult<()> {
    let (mapped1, unmapped1) = classify_point_tos(&ctx.graph1, &ctx.mapping1, &ctx.dest);
    let (mapped2, unmapped2) = classify_point_tos(&ctx.graph2, &ctx.mapping2, &ctx.dest);

    for (object, offsets1) in &mapped1 {
        match mapped2.get(object) {
            Some(offsets2) => merge_point_to_edges(ctx, *object, offsets1, offsets2)?,
            None => add_point_tos(&mut ctx.dest, *object, offsets1)?,
        }
    }
    for (object, offsets2) in &mapped2 {
        if !mapped1.contains_key(object) {
            add_point_tos(&mut ctx.dest, *object, offsets2)?;
        }
    }

    // Heap objects no root reaches but both inputs still point to.
    let mut shared: FxHashSet<ObjectId> = FxHashSet::default();
    for (object, offsets1) in &unmapped1 {
        let offsets2 = match unmapped2.get(object) {
            Some(offsets2) => offsets2,
            None => continue,
        };
        if !ctx.graph1.is_heap_object(*object)
            || !ctx.graph2.is_heap_object(*object)
            || ctx.dest.contains_object(*object)
        {
            continue;
        }
        shared.insert(*object);
        let heap_object = ctx
            .graph1
            .object(*object)
            .cloned()
            .ok_or(Error::ObjectNotFound(*object))?;
        let site = ctx
            .graph1
            .allocation_site(*object)
            .cloned()
            .ok_or(Error::NotHeapObject(*object))?;
        trace!("admitting dangling {}", heap_object);
        ctx.dest.add_heap_object(heap_object, site);
        ctx.mapping1.put_object(*object, *object);
        ctx.mapping2.put_object(*object, *object);
        try_join!(object_join::join_objects(ctx, *object, *object, *object));
        merge_point_to_edges(ctx, *object, offsets1, offsets2)?;
    }

    // One-sided objects an abstract value still refers to.
    let abstracted: BTreeSet<Value> = ctx
        .abstraction
        .value_abstraction()
        .values()
        .flat_map(|(left, right)| [*left, *right])
        .collect();
    for (unmapped, mapping) in [(&unmapped1, &mut ctx.mapping1), (&unmapped2, &mut ctx.mapping2)] {
        for (object, offsets) in unmapped {
            if shared.contains(object) {
                continue;
            }
            for address in offsets.values().filter(|value| abstracted.contains(value)) {
                mapping.add_pending(*address);
            }
        }
    }
    try_join!(pending_join::resolve_pending(ctx));

    // Leaked heap objects are kept as witnesses, without their edges.
    for (graph, mapping) in [(&ctx.graph1, &ctx.mapping1), (&ctx.graph2, &ctx.mapping2)] {
        let leaked: Vec<ObjectId> = graph
            .heap_objects()
            .filter(|object| !shared.contains(object) && !mapping.contains_object(*object))
            .filter(|object| graph.ref_count(*object) == 0)
            .collect();
        for object in leaked {
            if ctx.dest.contains_object(object) {
                continue;
            }
            let heap_object = graph
                .object(object)
                .cloned()
                .ok_or(Error::ObjectNotFound(object))?;
            let site = graph
                .allocation_site(object)
                .cloned()
                .ok_or(Error::NotHeapObject(object))?;
            trace!("keeping leaked {}", heap_object);
            ctx.dest.add_heap_object(heap_object, site);
            ctx.dest.set_ref(object, 0);
            ctx.dest.set_validity(object, graph.is_object_valid(object));
        }
    }
    Ok(Some(()))
}
