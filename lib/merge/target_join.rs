//! Joining two addresses, and the objects they point to.

use crate::merge::context::{JoinContext, JoinResult};
use crate::merge::value_join::merge_symbolic_values;
use crate::merge::{object_join, MergeTable};
use crate::shape::{ObjectId, PointToEdge, Value};
use crate::Error;
use log::{debug, trace};

/// Join the address `address1` of the first graph with `address2` of the
/// second, joining their targets when they have not been joined yet.
pub(crate) fn join_targets<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    address1: Value,
    address2: Value,
) -> JoinResult<Value> {
    let pt1 = *ctx
        .graph1
        .pointer(address1)
        .ok_or(Error::NotAPointer(address1))?;
    let pt2 = *ctx
        .graph2
        .pointer(address2)
        .ok_or(Error::NotAPointer(address2))?;

    if pt1.offset() != pt2.offset() {
        debug!(
            "join undefined: {} and {} point to different offsets",
            pt1, pt2
        );
        return Ok(None);
    }

    let (target1, target2) = (pt1.object(), pt2.object());
    let merged_address = match ctx.table.merge(address1, address2) {
        Some(merged) if target1 != ObjectId::VOID && target2 != ObjectId::VOID => merged,
        _ => return join_unproved(ctx, address1, target1, address2, target2).map(Some),
    };

    if let Some(address) = join_already_joined(ctx, &pt1, &pt2)? {
        return Ok(Some(address));
    }

    if !is_join_feasible(ctx, target1, target2) {
        debug!(
            "join undefined: targets {} and {} cannot be joined",
            target1, target2
        );
        return Ok(None);
    }

    let object1 = ctx
        .graph1
        .object(target1)
        .cloned()
        .ok_or(Error::ObjectNotFound(target1))?;
    let object2 = ctx
        .graph2
        .object(target2)
        .cloned()
        .ok_or(Error::ObjectNotFound(target2))?;
    let new_object = match object1.join(&object2, ctx.ids) {
        Some(new_object) => new_object,
        None => {
            debug!(
                "join undefined: {} and {} have incompatible kinds",
                object1, object2
            );
            return Ok(None);
        }
    };

    if new_object.is_abstract() {
        // The targets stay apart: each side's address is abstracted by a
        // placeholder whose target the pending resolver brings over.
        let placeholder1 = ctx.ids.fresh_value();
        let placeholder2 = ctx.ids.fresh_value();
        let depth = ctx.max_guard_depth();
        trace!(
            "{} abstracts {} and {} through {} and {}",
            merged_address,
            address1,
            address2,
            placeholder1,
            placeholder2
        );
        ctx.abstraction.add_abstraction(
            merged_address,
            placeholder1,
            &ctx.condition1,
            placeholder2,
            &ctx.condition2,
            depth,
        );
        ctx.dest
            .add_point_to_edge(PointToEdge::new(merged_address, ObjectId::VOID, 0))?;
        ctx.mapping1
            .add_pending_with_replacement(address1, placeholder1);
        ctx.mapping2
            .add_pending_with_replacement(address2, placeholder2);
        return Ok(Some(merged_address));
    }

    let site = ctx
        .graph1
        .allocation_site(target1)
        .cloned()
        .ok_or(Error::NotHeapObject(target1))?;
    let new_id = new_object.id();
    trace!("joining {} and {} into {}", target1, target2, new_object);
    ctx.dest.add_heap_object(new_object, site);
    ctx.mapping1.put_object(target1, new_id);
    ctx.mapping2.put_object(target2, new_id);
    if object1.label() != object2.label() {
        ctx.abstraction
            .add_name_alias(object1.label(), object2.label());
    }

    let merged = join_addresses(ctx, &pt1, &pt2)?;
    ctx.mapping1.put_value(address1, merged);
    ctx.mapping2.put_value(address2, merged);
    ctx.mapping1.remove_pending(address1);
    ctx.mapping2.remove_pending(address2);

    try_join!(object_join::join_objects(ctx, target1, target2, new_id));
    Ok(Some(merged))
}

/// Join two addresses whose equality the table cannot prove, or one of which
/// is a placeholder. The merged address points to `VOID`; the real targets
/// are brought over by the pending resolver.
fn join_unproved<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    address1: Value,
    target1: ObjectId,
    address2: Value,
    target2: ObjectId,
) -> Result<Value, Error> {
    if !target1.is_sentinel() {
        ctx.mapping1.add_pending(address1);
    }
    if !target2.is_sentinel() {
        ctx.mapping2.add_pending(address2);
    }
    let merged = merge_symbolic_values(ctx, address1, address2);
    if !ctx.dest.is_pointer(merged) {
        ctx.dest
            .add_point_to_edge(PointToEdge::new(merged, ObjectId::VOID, 0))?;
    }
    Ok(merged)
}

/// The merged address when both targets already have a common image, or
/// when one target is null and the other already has an image.
fn join_already_joined<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    pt1: &PointToEdge,
    pt2: &PointToEdge,
) -> JoinResult<Value> {
    let (target1, target2) = (pt1.object(), pt2.object());
    let null1 = target1 == ObjectId::NULL;
    let null2 = target2 == ObjectId::NULL;

    if null1 && null2 {
        return Ok(Some(Value::NULL));
    }
    let joined = if !null1 && !null2 {
        match (ctx.mapping1.get(target1), ctx.mapping2.get(target2)) {
            (Some(d1), Some(d2)) => d1 == d2,
            _ => false,
        }
    } else if !null1 {
        ctx.mapping1.contains_object(target1)
    } else {
        ctx.mapping2.contains_object(target2)
    };

    if joined {
        join_addresses(ctx, pt1, pt2).map(Some)
    } else {
        Ok(None)
    }
}

fn is_join_feasible<M: MergeTable + ?Sized>(
    ctx: &JoinContext<M>,
    target1: ObjectId,
    target2: ObjectId,
) -> bool {
    if !ctx.graph1.is_heap_object(target1) || !ctx.graph2.is_heap_object(target2) {
        return false;
    }
    let image1 = ctx.mapping1.get(target1);
    let image2 = ctx.mapping2.get(target2);
    if image1.is_some() != image2.is_some() {
        return false;
    }
    if let (Some(d1), Some(d2)) = (image1, image2) {
        if d1 != d2 {
            return false;
        }
    }
    let crossed1 = image1.map_or(false, |d| ctx.mapping2.contains_image(d));
    let crossed2 = image2.map_or(false, |d| ctx.mapping1.contains_image(d));
    !crossed1 && !crossed2
}

/// The merged graph's address for the location both `pt1` and `pt2` denote.
///
/// At least one target must already be mapped into the merged graph.
pub(crate) fn join_addresses<M: MergeTable + ?Sized>(
    ctx: &mut JoinContext<M>,
    pt1: &PointToEdge,
    pt2: &PointToEdge,
) -> Result<Value, Error> {
    let (object, offset) = if pt1.object() != ObjectId::NULL {
        let object = ctx
            .mapping1
            .get(pt1.object())
            .ok_or(Error::UnmappedObject(pt1.object()))?;
        (object, pt1.offset())
    } else {
        let object = ctx
            .mapping2
            .get(pt2.object())
            .ok_or(Error::UnmappedObject(pt2.object()))?;
        (object, pt2.offset())
    };

    if let Some(address) = ctx.dest.address_of(object, offset) {
        return Ok(address);
    }
    let address = merge_symbolic_values(ctx, pt1.value(), pt2.value());
    ctx.dest
        .add_point_to_edge(PointToEdge::new(address, object, offset))?;
    Ok(address)
}
