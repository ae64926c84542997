use crate::merge::context::{JoinContext, JoinResult, Side};
use crate::merge::{object_join, MergeTable, NodeMapping};
use crate::shape::{HasValueEdgeFilter, ObjectId, PointToEdge, ShapeGraph, Value};
use crate::Error;
use log::trace;
use std::collections::{BTreeSet, VecDeque};

/// Copy the targets of every pending address of both inputs into the
/// merged graph, then clear both pending queues.
///
/// Joining an object both sides admitted may queue further addresses, so
/// the queues are drained until both stay empty.
pub(crate) fn resolve_pending<M: MergeTable + ?Sized>(ctx: &mut JoinContext<M>) -> JoinResult<()> {
    loop {
        let pending1 = ctx.mapping1.take_pending();
        let pending2 = ctx.mapping2.take_pending();
        if pending1.is_empty() && pending2.is_empty() {
            break;
        }
        try_join!(admit_pending(ctx, Side::First, pending1));
        try_join!(admit_pending(ctx, Side::Second, pending2));
    }
    ctx.mapping1.reset_pending();
    ctx.mapping2.reset_pending();
    Ok(Some(()))
}

/// Drain `queue` in order. Each address gets its point-to edge in the
/// merged graph. Targets not yet there are admitted under their own handle
/// together with their fields, and the new pointers found in those fields
/// are queued in turn. A target the other side already admitted is joined
/// field by field with that side's copy.
fn admit_pending<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    side: Side,
    mut queue: VecDeque<Value>,
) -> JoinResult<()> {
    while let Some(address) = queue.pop_front() {
        let shared = {
            let (graph, mapping, other, dest) = ctx.side_mut(side);
            match admit_address(graph, mapping, other, dest, address, &mut queue)? {
                Some(shared) => shared,
                None => continue,
            }
        };
        trace!("{} was admitted by both sides, joining its fields", shared);
        ctx.dest.replace_has_value_edges(shared, BTreeSet::new())?;
        try_join!(object_join::join_objects(ctx, shared, shared, shared));
    }
    Ok(Some(()))
}

/// Give `address` its point-to edge in `dest`, admitting its target if
/// needed. Returns the target when the other side already admitted it and
/// the two copies still have to be joined.
fn admit_address(
    graph: &ShapeGraph,
    mapping: &mut NodeMapping,
    other: &NodeMapping,
    dest: &mut ShapeGraph,
    address: Value,
    queue: &mut VecDeque<Value>,
) -> Result<Option<ObjectId>, Error> {
    let pt = *graph.pointer(address).ok_or(Error::NotAPointer(address))?;
    let target = pt.object();

    let address = match mapping.replacement(address) {
        Some(replacement) => {
            if dest.is_pointer(replacement) {
                return Ok(None);
            }
            replacement
        }
        None => address,
    };

    if target.is_sentinel() {
        dest.add_point_to_edge(PointToEdge::new(address, target, pt.offset()))?;
        return Ok(None);
    }
    if let Some(image) = mapping.get(target) {
        dest.add_point_to_edge(PointToEdge::new(address, image, pt.offset()))?;
        return Ok(None);
    }
    if dest.contains_object(target) && other.get(target) == Some(target) {
        mapping.put_object(target, target);
        dest.add_point_to_edge(PointToEdge::new(address, target, pt.offset()))?;
        return Ok(Some(target));
    }

    let object = graph
        .object(target)
        .cloned()
        .ok_or(Error::ObjectNotFound(target))?;
    if let Some(site) = graph.allocation_site(target) {
        dest.add_heap_object(object, site.clone());
        dest.set_ref(target, graph.ref_count(target));
    } else if graph.is_global_object(target) {
        dest.add_global_object(object)?;
    } else {
        trace!("pending target {} is neither heap nor global", target);
        return Ok(None);
    }
    trace!("admitting {} through {}", target, address);
    dest.set_validity(target, graph.is_object_valid(target));
    dest.add_point_to_edge(PointToEdge::new(address, target, pt.offset()))?;
    mapping.put_object(target, target);

    for edge in graph.hv_edges(&HasValueEdgeFilter::object_filter(target)) {
        let value = edge.value();
        if !dest.contains_value(value) {
            dest.add_value(value);
            if graph.is_pointer(value) && !value.is_null() {
                queue.push_back(value);
            }
        }
        dest.add_has_value_edge(edge)?;
    }
    Ok(None)
}
