use crate::merge::context::{JoinContext, JoinResult};
use crate::merge::{target_join, MergeTable};
use crate::shape::{HasValueEdge, Value};
use log::{debug, trace};

/// The value of the merged graph standing for `v1` of the first graph and
/// `v2` of the second.
///
/// Values the table proves equal keep their merged value. Values holding the
/// same explicit value share one fresh value per explicit value. Anything
/// else gets a fresh abstract value recorded in the join's abstraction.
pub(crate) fn merge_symbolic_values<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    v1: Value,
    v2: Value,
) -> Value {
    if let Some(merged) = ctx.table.merge(v1, v2) {
        ctx.dest.add_value(merged);
        return merged;
    }

    if let Some(explicit) = ctx.table.explicit_equality(v1, v2) {
        if let Some(merged) = ctx.table.associated_symbolic(&explicit) {
            ctx.dest.add_value(merged);
            return merged;
        }
        let fresh = ctx.ids.fresh_value();
        trace!("{} and {} both hold {}, merged into {}", v1, v2, explicit, fresh);
        ctx.dest.add_value(fresh);
        ctx.dest.put_explicit_value(fresh, explicit.clone());
        ctx.table.add_explicit_relation(fresh, explicit);
        return fresh;
    }

    let fresh = ctx.ids.fresh_value();
    let depth = ctx.max_guard_depth();
    trace!("abstracting {} and {} into {}", v1, v2, fresh);
    ctx.abstraction
        .add_abstraction(fresh, v1, &ctx.condition1, v2, &ctx.condition2, depth);
    ctx.dest.add_value(fresh);
    fresh
}

/// Join the values of two aligned fields.
pub(crate) fn join_values<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    edge1: &HasValueEdge,
    edge2: &HasValueEdge,
) -> JoinResult<Value> {
    let (v1, v2) = (edge1.value(), edge2.value());
    let pointer1 = ctx.graph1.is_pointer(v1);
    let pointer2 = ctx.graph2.is_pointer(v2);

    if !pointer1 && !pointer2 {
        return Ok(Some(merge_symbolic_values(ctx, v1, v2)));
    }
    if pointer1 != pointer2 {
        debug!(
            "join undefined: {} and {} disagree on being a pointer",
            edge1, edge2
        );
        return Ok(None);
    }
    target_join::join_targets(ctx, v1, v2)
}
