use crate::merge::context::{JoinContext, JoinResult};
use crate::merge::{conciliate, value_join, MergeTable};
use crate::shape::{HasValueEdge, HasValueEdgeFilter, ObjectId, ShapeGraph};
use crate::Error;
use log::{debug, trace};
use std::cmp;

/// Join the fields of `object1` of the first graph and `object2` of the
/// second into `dest`, an object already in the merged graph.
pub(crate) fn join_objects<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    object1: ObjectId,
    object2: ObjectId,
    dest: ObjectId,
) -> JoinResult<()> {
    trace!("joining fields of {} and {} into {}", object1, object2, dest);
    if needs_conciliation(&ctx.graph1, &ctx.graph2, object1, object2)? {
        conciliate::conciliate_fields(&mut ctx.graph1, &mut ctx.graph2, object1, object2, ctx.ids)?;
    }

    for edge1 in ctx
        .graph1
        .hv_edges(&HasValueEdgeFilter::object_filter(object1))
    {
        let filter = HasValueEdgeFilter::object_filter(object2)
            .at_offset(edge1.offset())
            .with_type(edge1.field_type());
        let mut edges2 = ctx.graph2.hv_edges(&filter);
        let edge2 = match (edges2.pop(), edges2.is_empty()) {
            (Some(edge2), true) => edge2,
            _ => {
                debug!("join undefined: {} has no single counterpart in {}", edge1, object2);
                return Ok(None);
            }
        };

        let value = try_join!(value_join::join_values(ctx, &edge1, &edge2));
        let edge = if edge1.object() == dest && edge1.value() == value {
            edge1
        } else {
            HasValueEdge::new(dest, edge1.offset(), edge1.field_type(), value)
        };
        ctx.dest.add_has_value_edge(edge)?;
    }

    let valid = ctx.graph1.is_object_valid(object1) && ctx.graph2.is_object_valid(object2);
    ctx.dest.set_validity(dest, valid);
    let ref_count = cmp::min(ctx.graph1.ref_count(object1), ctx.graph2.ref_count(object2));
    ctx.dest.set_ref(dest, ref_count);
    Ok(Some(()))
}

/// Do the fields of the two objects fail to match one to one at the same
/// offset and type.
fn needs_conciliation(
    graph1: &ShapeGraph,
    graph2: &ShapeGraph,
    object1: ObjectId,
    object2: ObjectId,
) -> Result<bool, Error> {
    if !graph1.contains_object(object1) {
        return Err(Error::ObjectNotFound(object1));
    }
    if !graph2.contains_object(object2) {
        return Err(Error::ObjectNotFound(object2));
    }

    let edges1 = graph1.hv_edges(&HasValueEdgeFilter::object_filter(object1));
    let edges2 = graph2.hv_edges(&HasValueEdgeFilter::object_filter(object2));
    if edges1.len() != edges2.len() {
        return Ok(true);
    }
    for edge1 in &edges1 {
        let matches = edges2
            .iter()
            .filter(|edge2| {
                edge2.offset() == edge1.offset() && edge2.field_type() == edge1.field_type()
            })
            .count();
        if matches != 1 {
            return Ok(true);
        }
    }
    Ok(false)
}
