//! Field conciliation: rewriting the fields of two objects so they line up
//! one to one before their values are joined.

use crate::shape::{
    FieldType, HasValueEdge, HasValueEdgeFilter, IdAllocator, ObjectId, ShapeGraph, Value,
};
use crate::Error;
use log::trace;
use std::collections::BTreeSet;

/// Split a set of byte offsets into maximal runs of consecutive bytes,
/// returned as `(offset, size)`.
fn segments(bytes: &BTreeSet<i64>) -> Vec<(i64, u64)> {
    let mut segments: Vec<(i64, u64)> = Vec::new();
    for byte in bytes {
        match segments.last_mut() {
            Some((offset, size)) if *offset + *size as i64 == *byte => *size += 1,
            _ => segments.push((*byte, 1)),
        }
    }
    segments
}

fn null_edge(object: ObjectId, offset: i64, size: u64) -> HasValueEdge {
    HasValueEdge::new(object, offset, FieldType::bytes(size), Value::NULL)
}

/// Rewrite the fields of `object1` in `graph1` and `object2` in `graph2` so
/// that every field of one has a field at the same offset and type in the
/// other.
///
/// Bytes known null on both sides become shared null blocks. Bytes null on
/// one side only keep that side's field and get a fresh unknown value on the
/// other side. A non-null field missing on one side is added there with a
/// fresh unknown value.
pub(crate) fn conciliate_fields(
    graph1: &mut ShapeGraph,
    graph2: &mut ShapeGraph,
    object1: ObjectId,
    object2: ObjectId,
    ids: &mut IdAllocator,
) -> Result<(), Error> {
    let zero_init = graph1
        .object(object1)
        .ok_or(Error::ObjectNotFound(object1))?
        .is_zero_init();
    if !graph2.contains_object(object2) {
        return Err(Error::ObjectNotFound(object2));
    }
    trace!("conciliating fields of {} and {}", object1, object2);

    let edges1 = graph1.hv_edges(&HasValueEdgeFilter::object_filter(object1));
    let edges2 = graph2.hv_edges(&HasValueEdgeFilter::object_filter(object2));
    let mut new_edges1: BTreeSet<HasValueEdge> = edges1
        .iter()
        .filter(|edge| !edge.value().is_null())
        .cloned()
        .collect();
    let mut new_edges2: BTreeSet<HasValueEdge> = edges2
        .iter()
        .filter(|edge| !edge.value().is_null())
        .cloned()
        .collect();

    let null1 = graph1.null_bytes(object1);
    let null2 = graph2.null_bytes(object2);
    let non_null1 = graph1.non_null_bytes(object1);
    let non_null2 = graph2.non_null_bytes(object2);

    // Bytes null on both sides.
    let common_null: BTreeSet<i64> = if zero_init {
        let non_null: BTreeSet<i64> = non_null1.union(&non_null2).copied().collect();
        match non_null.iter().next_back() {
            Some(last) => (0..*last).filter(|byte| !non_null.contains(byte)).collect(),
            None => BTreeSet::new(),
        }
    } else {
        null1.intersection(&null2).copied().collect()
    };
    for (offset, size) in segments(&common_null) {
        new_edges1.insert(null_edge(object1, offset, size));
        new_edges2.insert(null_edge(object2, offset, size));
    }

    // Bytes null on one side only. A byte is null in the first object when
    // it is in its null set, or, for zero-initialized objects, when no
    // non-null field covers it.
    let one_sided: BTreeSet<i64> = if zero_init {
        non_null1.symmetric_difference(&non_null2).copied().collect()
    } else {
        null1.symmetric_difference(&null2).copied().collect()
    };
    for (offset, size) in segments(&one_sided) {
        let last = offset + size as i64 - 1;
        let null_in_first = if zero_init {
            !non_null1.contains(&last)
        } else {
            null1.contains(&last)
        };
        let (null_graph, null_object, null_edges, other_graph, other_object, other_edges) =
            if null_in_first {
                (&*graph1, object1, &mut new_edges1, &*graph2, object2, &mut new_edges2)
            } else {
                (&*graph2, object2, &mut new_edges2, &*graph1, object1, &mut new_edges1)
            };

        let filter = HasValueEdgeFilter::object_filter(other_object).at_offset(offset);
        let other_field = other_graph
            .hv_edges(&filter)
            .into_iter()
            .find(|edge| edge.size() == size);

        let filter = HasValueEdgeFilter::object_filter(null_object).at_offset(offset);
        let existing = null_graph
            .hv_edges(&filter)
            .into_iter()
            .find(|edge| edge.size() == size);
        null_edges.insert(existing.unwrap_or_else(|| match other_field {
            Some(ref field) => HasValueEdge::new(null_object, offset, field.field_type(), Value::NULL),
            None => null_edge(null_object, offset, size),
        }));

        if other_field.is_none() {
            other_edges.insert(HasValueEdge::new(
                other_object,
                offset,
                FieldType::bytes(size),
                ids.fresh_value(),
            ));
        }
    }

    // Non-null fields still missing on the other side.
    let missing_in_first: Vec<HasValueEdge> = edges2
        .iter()
        .filter(|edge| !edge.value().is_null())
        .filter(|edge| !has_field(&new_edges1, edge))
        .map(|edge| HasValueEdge::new(object1, edge.offset(), edge.field_type(), ids.fresh_value()))
        .collect();
    let missing_in_second: Vec<HasValueEdge> = edges1
        .iter()
        .filter(|edge| !edge.value().is_null())
        .filter(|edge| !has_field(&new_edges2, edge))
        .map(|edge| HasValueEdge::new(object2, edge.offset(), edge.field_type(), ids.fresh_value()))
        .collect();
    new_edges1.extend(missing_in_first);
    new_edges2.extend(missing_in_second);

    graph1.replace_has_value_edges(object1, new_edges1)?;
    graph2.replace_has_value_edges(object2, new_edges2)?;
    Ok(())
}

fn has_field(edges: &BTreeSet<HasValueEdge>, field: &HasValueEdge) -> bool {
    edges
        .iter()
        .any(|edge| edge.offset() == field.offset() && edge.field_type() == field.field_type())
}
