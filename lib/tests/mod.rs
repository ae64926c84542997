use crate::merge::{self, EquivalenceMergeTable, JoinOptions, ShapeGraphJoin};
use crate::shape::*;
use crate::types::MachineModel;
use std::collections::BTreeSet;

/// A global `head` pointing to a heap `node` through `address`.
struct Fixture {
    graph: ShapeGraph,
    head: ObjectId,
    node: ObjectId,
    address: Value,
}

fn list_graph(ids: &mut IdAllocator, node_size: u64) -> Fixture {
    let model = MachineModel::linux64();
    let mut graph = ShapeGraph::new(model.clone());
    let head = MemoryObject::region(ids.fresh_object_id(), "head", 8);
    let head_id = head.id();
    graph.add_global_object(head).unwrap();
    let fixture = Fixture {
        graph,
        head: head_id,
        node: ObjectId::NULL,
        address: Value::NULL,
    };
    with_node(fixture, ids, node_size)
}

/// Point `head` of `fixture` to a fresh heap node of `node_size` bytes.
fn with_node(mut fixture: Fixture, ids: &mut IdAllocator, node_size: u64) -> Fixture {
    let model = fixture.graph.machine_model().clone();
    let node = MemoryObject::region(ids.fresh_object_id(), "node", node_size);
    let node_id = node.id();
    let address = ids.fresh_value();
    fixture
        .graph
        .add_heap_object(node, AllocationSite::new("malloc@12"));
    fixture
        .graph
        .add_point_to_edge(PointToEdge::new(address, node_id, 0))
        .unwrap();
    fixture
        .graph
        .replace_has_value_edges(
            fixture.head,
            vec![HasValueEdge::new(
                fixture.head,
                0,
                FieldType::pointer(&model),
                address,
            )]
            .into_iter()
            .collect(),
        )
        .unwrap();
    fixture
        .graph
        .add_has_value_edge(HasValueEdge::new(
            node_id,
            0,
            FieldType::integer(4),
            ids.fresh_value(),
        ))
        .unwrap();
    fixture
        .graph
        .add_has_value_edge(HasValueEdge::new(
            node_id,
            8,
            FieldType::pointer(&model),
            Value::NULL,
        ))
        .unwrap();
    fixture.node = node_id;
    fixture.address = address;
    fixture
}

fn join_graphs(
    graph1: &ShapeGraph,
    graph2: &ShapeGraph,
    ids: &mut IdAllocator,
) -> ShapeGraphJoin {
    let mut table = EquivalenceMergeTable::new(graph1, graph2);
    ShapeGraphJoin::new(graph1, graph2, &mut table, ids, &JoinOptions::default()).unwrap()
}

fn head_value(graph: &ShapeGraph, head: ObjectId) -> Value {
    graph
        .hv_edges(&HasValueEdgeFilter::object_filter(head).at_offset(0))
        .pop()
        .unwrap()
        .value()
}

fn set<T: Ord>(items: Vec<T>) -> BTreeSet<T> {
    items.into_iter().collect()
}

fn interpreted_values(join: &ShapeGraphJoin, value: Value) -> BTreeSet<Value> {
    join.abstraction()
        .interpret(value)
        .iter()
        .map(|guarded| guarded.value())
        .collect()
}

#[test]
fn join_is_idempotent() {
    let mut ids = IdAllocator::new();
    let fixture = list_graph(&mut ids, 16);

    let join = join_graphs(&fixture.graph, &fixture.graph, &mut ids);
    assert!(join.is_defined());
    assert!(join.abstraction().is_empty());
    assert_eq!(join.merged().unwrap(), &fixture.graph);
}

#[test]
fn different_call_chains_do_not_join() {
    let mut ids = IdAllocator::new();
    let mut graph1 = ShapeGraph::new(MachineModel::linux64());
    graph1.add_stack_frame("main", None);
    let mut graph2 = ShapeGraph::new(MachineModel::linux64());
    graph2.add_stack_frame("main", None);

    let mut table = EquivalenceMergeTable::new(&graph1, &graph2);
    let merged = merge::join(
        &graph1,
        &graph2,
        &mut table,
        &mut ids,
        &JoinOptions::default(),
    )
    .unwrap();
    assert!(merged.is_some());

    let mut graph3 = ShapeGraph::new(MachineModel::linux64());
    graph3.add_stack_frame("helper", None);
    let mut table = EquivalenceMergeTable::new(&graph1, &graph3);
    let merged = merge::join(
        &graph1,
        &graph3,
        &mut table,
        &mut ids,
        &JoinOptions::default(),
    )
    .unwrap();
    assert!(merged.is_none());
}

#[test]
fn stack_depths_must_match() {
    let mut ids = IdAllocator::new();
    let mut graph1 = ShapeGraph::new(MachineModel::linux64());
    graph1.add_stack_frame("main", None);
    let mut graph2 = graph1.clone();
    graph2.add_stack_frame("helper", None);

    assert!(!join_graphs(&graph1, &graph2, &mut ids).is_defined());
}

#[test]
fn locals_join_per_frame() {
    let mut ids = IdAllocator::new();
    let mut graph = ShapeGraph::new(MachineModel::linux64());
    let ret = MemoryObject::region(ids.fresh_object_id(), "ret", 4);
    graph.add_stack_frame("main", Some(ret));
    let local = MemoryObject::region(ids.fresh_object_id(), "i", 4);
    let local_id = local.id();
    graph.add_stack_object(local, false).unwrap();

    let mut graph1 = graph.clone();
    let mut graph2 = graph;
    let (v1, v2) = (ids.fresh_value(), ids.fresh_value());
    graph1
        .add_has_value_edge(HasValueEdge::new(local_id, 0, FieldType::integer(4), v1))
        .unwrap();
    graph2
        .add_has_value_edge(HasValueEdge::new(local_id, 0, FieldType::integer(4), v2))
        .unwrap();

    let join = join_graphs(&graph1, &graph2, &mut ids);
    let merged = join.merged().unwrap();
    assert_eq!(merged.stack_frames().len(), 1);
    assert_eq!(merged.stack_frames()[0].variable("i"), Some(local_id));
    assert!(merged.stack_frames()[0].return_object().is_some());

    let value = head_value(merged, local_id);
    assert_eq!(interpreted_values(&join, value), set(vec![v1, v2]));
}

#[test]
fn variable_length_array_mismatch() {
    let mut ids = IdAllocator::new();
    let local = MemoryObject::region(ids.fresh_object_id(), "buf", 16);
    let mut graph1 = ShapeGraph::new(MachineModel::linux64());
    graph1.add_stack_frame("main", None);
    graph1.add_stack_object(local.clone(), true).unwrap();
    let mut graph2 = ShapeGraph::new(MachineModel::linux64());
    graph2.add_stack_frame("main", None);
    graph2.add_stack_object(local, false).unwrap();

    assert!(!join_graphs(&graph1, &graph2, &mut ids).is_defined());
}

#[test]
fn validity_and_reference_counts() {
    let mut ids = IdAllocator::new();
    let fixture = list_graph(&mut ids, 16);
    let mut graph1 = fixture.graph.clone();
    graph1.set_ref(fixture.node, 3);
    let mut graph2 = fixture.graph;
    graph2.set_ref(fixture.node, 5);
    graph2.set_validity(fixture.node, false);

    let join = join_graphs(&graph1, &graph2, &mut ids);
    let merged = join.merged().unwrap();
    assert_eq!(merged.ref_count(fixture.node), 3);
    assert!(!merged.is_object_valid(fixture.node));
    assert!(merged.is_object_valid(fixture.head));
}

#[test]
fn pointer_offsets_must_match() {
    let mut ids = IdAllocator::new();
    let fixture = list_graph(&mut ids, 16);
    let mut graph2 = fixture.graph.clone();
    graph2
        .add_point_to_edge(PointToEdge::new(fixture.address, fixture.node, 8))
        .unwrap();

    assert!(!join_graphs(&fixture.graph, &graph2, &mut ids).is_defined());
}

#[test]
fn pointer_and_integer_do_not_join() {
    let mut ids = IdAllocator::new();
    let fixture = list_graph(&mut ids, 16);
    let mut graph2 = fixture.graph.clone();
    let model = graph2.machine_model().clone();
    graph2
        .replace_has_value_edges(
            fixture.head,
            vec![HasValueEdge::new(
                fixture.head,
                0,
                FieldType::pointer(&model),
                ids.fresh_value(),
            )]
            .into_iter()
            .collect(),
        )
        .unwrap();

    assert!(!join_graphs(&fixture.graph, &graph2, &mut ids).is_defined());
}

#[test]
fn unproved_addresses_resolve_through_pending() {
    let mut ids = IdAllocator::new();
    let fixture1 = list_graph(&mut ids, 16);
    let head = fixture1.head;
    let mut base = fixture1.graph.clone();
    base.remove_object(fixture1.node);
    let fixture2 = with_node(
        Fixture {
            graph: base,
            head,
            node: ObjectId::NULL,
            address: Value::NULL,
        },
        &mut ids,
        16,
    );

    let join = join_graphs(&fixture1.graph, &fixture2.graph, &mut ids);
    let merged = join.merged().unwrap();

    let value = head_value(merged, head);
    assert_eq!(merged.pointer(value).unwrap().object(), ObjectId::VOID);
    assert_eq!(
        interpreted_values(&join, value),
        set(vec![fixture1.address, fixture2.address])
    );

    assert!(merged.contains_object(fixture1.node));
    assert!(merged.contains_object(fixture2.node));
    assert_eq!(
        merged.pointer(fixture1.address).unwrap().object(),
        fixture1.node
    );
    assert_eq!(
        merged.pointer(fixture2.address).unwrap().object(),
        fixture2.node
    );
    assert!(join.mapping1().pending().is_empty());
    assert!(join.mapping2().pending().is_empty());
    assert_eq!(join.mapping1().get(fixture1.node), Some(fixture1.node));
}

#[test]
fn object_admitted_by_both_sides_is_joined() {
    let mut ids = IdAllocator::new();
    let fixture = list_graph(&mut ids, 16);
    let (node, head) = (fixture.node, fixture.head);
    let model = fixture.graph.machine_model().clone();

    let mut graph1 = fixture.graph.clone();
    graph1.set_validity(node, false);
    graph1.set_ref(node, 1);
    let x1 = head_value(&graph1, node);

    // same node, reached through an unrelated address and holding another value
    let mut graph2 = fixture.graph;
    graph2.set_ref(node, 4);
    let (address2, x2) = (ids.fresh_value(), ids.fresh_value());
    graph2
        .add_point_to_edge(PointToEdge::new(address2, node, 0))
        .unwrap();
    graph2
        .replace_has_value_edges(
            head,
            set(vec![HasValueEdge::new(
                head,
                0,
                FieldType::pointer(&model),
                address2,
            )]),
        )
        .unwrap();
    graph2
        .replace_has_value_edges(
            node,
            set(vec![
                HasValueEdge::new(node, 0, FieldType::integer(4), x2),
                HasValueEdge::new(node, 8, FieldType::pointer(&model), Value::NULL),
            ]),
        )
        .unwrap();

    let join = join_graphs(&graph1, &graph2, &mut ids);
    let merged = join.merged().unwrap();

    assert!(!merged.is_object_valid(node));
    assert_eq!(merged.ref_count(node), 1);
    let fields = merged.hv_edges(&HasValueEdgeFilter::object_filter(node).at_offset(0));
    assert_eq!(fields.len(), 1);
    assert_eq!(
        interpreted_values(&join, fields[0].value()),
        set(vec![x1, x2])
    );
    assert_eq!(merged.pointer(fixture.address).unwrap().object(), node);
    assert_eq!(merged.pointer(address2).unwrap().object(), node);
    assert_eq!(join.mapping1().get(node), Some(node));
    assert_eq!(join.mapping2().get(node), Some(node));
}

#[test]
fn summary_targets_stay_apart() {
    let mut ids = IdAllocator::new();
    let fixture1 = list_graph(&mut ids, 16);
    let mut graph2 = fixture1.graph.clone();
    graph2.remove_object(fixture1.node);
    let wide = MemoryObject::region(ids.fresh_object_id(), "node", 24);
    let wide_id = wide.id();
    graph2.add_heap_object(wide, AllocationSite::new("malloc@20"));
    graph2
        .add_point_to_edge(PointToEdge::new(fixture1.address, wide_id, 0))
        .unwrap();

    let join = join_graphs(&fixture1.graph, &graph2, &mut ids);
    let merged = join.merged().unwrap();

    // the shared address is abstracted by one placeholder per side
    assert_eq!(head_value(merged, fixture1.head), fixture1.address);
    assert_eq!(
        merged.pointer(fixture1.address).unwrap().object(),
        ObjectId::VOID
    );
    let placeholders = interpreted_values(&join, fixture1.address);
    assert_eq!(placeholders.len(), 2);
    let targets: BTreeSet<ObjectId> = placeholders
        .iter()
        .map(|placeholder| merged.pointer(*placeholder).unwrap().object())
        .collect();
    assert_eq!(targets, set(vec![fixture1.node, wide_id]));
}

#[test]
fn explicit_values_share_one_value() {
    let mut ids = IdAllocator::new();
    let record = MemoryObject::region(ids.fresh_object_id(), "record", 8);
    let record_id = record.id();
    let mut graph1 = ShapeGraph::new(MachineModel::linux64());
    graph1.add_global_object(record).unwrap();
    let mut graph2 = graph1.clone();

    for graph in [&mut graph1, &mut graph2] {
        for offset in [0, 4] {
            let value = ids.fresh_value();
            graph
                .add_has_value_edge(HasValueEdge::new(
                    record_id,
                    offset,
                    FieldType::integer(4),
                    value,
                ))
                .unwrap();
            graph.put_explicit_value(value, ExplicitValue::new(5));
        }
    }

    let join = join_graphs(&graph1, &graph2, &mut ids);
    let merged = join.merged().unwrap();
    let values: BTreeSet<Value> = merged
        .hv_edges(&HasValueEdgeFilter::object_filter(record_id))
        .iter()
        .map(|edge| edge.value())
        .collect();
    assert_eq!(values.len(), 1);
    let value = *values.iter().next().unwrap();
    assert_eq!(merged.explicit_value(value), Some(&ExplicitValue::new(5)));
    assert!(join.abstraction().is_empty());
}

#[test]
fn repeated_joins_chain_abstractions() {
    let mut ids = IdAllocator::new();
    let fixture1 = list_graph(&mut ids, 16);
    let head = fixture1.head;
    let mut base = fixture1.graph.clone();
    base.remove_object(fixture1.node);
    let empty = Fixture {
        graph: base,
        head,
        node: ObjectId::NULL,
        address: Value::NULL,
    };
    let fixture2 = with_node(
        Fixture {
            graph: empty.graph.clone(),
            ..empty
        },
        &mut ids,
        16,
    );
    let fixture3 = with_node(
        Fixture {
            graph: empty.graph.clone(),
            ..empty
        },
        &mut ids,
        16,
    );

    let first = join_graphs(&fixture1.graph, &fixture2.graph, &mut ids)
        .into_merged()
        .unwrap();
    let join = join_graphs(&first, &fixture3.graph, &mut ids);
    let merged = join.merged().unwrap();

    let value = head_value(merged, head);
    let expected = set(vec![fixture1.address, fixture2.address, fixture3.address]);
    assert_eq!(interpreted_values(&join, value), expected);
    for fixture in [&fixture1, &fixture2, &fixture3] {
        assert!(merged.contains_object(fixture.node));
    }
}

#[test]
fn inequalities_survive_when_both_sides_know_them() {
    let mut ids = IdAllocator::new();
    let (a, b, c) = (ids.fresh_value(), ids.fresh_value(), ids.fresh_value());
    let mut graph1 = ShapeGraph::new(MachineModel::linux64());
    graph1.add_value(a);
    graph1.add_value(b);
    graph1.add_value(c);
    let mut graph2 = graph1.clone();
    graph1.add_neq(a, b);
    graph1.add_neq(a, c);
    graph2.add_neq(a, b);

    let join = join_graphs(&graph1, &graph2, &mut ids);
    let merged = join.merged().unwrap();
    assert!(merged.is_neq(a, b));
    assert!(!merged.is_neq(a, c));
}

#[test]
fn leaked_objects_are_kept() {
    let mut ids = IdAllocator::new();
    let fixture = list_graph(&mut ids, 16);
    let mut graph1 = fixture.graph.clone();
    let leaked = MemoryObject::region(ids.fresh_object_id(), "lost", 32);
    let leaked_id = leaked.id();
    graph1.add_heap_object(leaked, AllocationSite::new("malloc@40"));
    graph1.set_memory_leak(true);
    graph1.add_leak_edge("lost");

    let join = join_graphs(&graph1, &fixture.graph, &mut ids);
    let merged = join.merged().unwrap();
    assert!(merged.contains_object(leaked_id));
    assert!(merged.is_heap_object(leaked_id));
    assert_eq!(merged.ref_count(leaked_id), 0);
    assert!(merged.has_memory_leak());
    assert!(merged.leak_edges().contains("lost"));
}

#[test]
fn addresses_into_shared_objects_merge_by_offset() {
    let mut ids = IdAllocator::new();
    let literal = MemoryObject::region(ids.fresh_object_id(), "lit", 8)
        .with_flags(ObjectFlags::STRING_LITERAL);
    let literal_id = literal.id();
    let mut graph1 = ShapeGraph::new(MachineModel::linux64());
    graph1.add_global_object(literal).unwrap();
    let mut graph2 = graph1.clone();

    let (a0, a2) = (ids.fresh_value(), ids.fresh_value());
    graph1
        .add_point_to_edge(PointToEdge::new(a0, literal_id, 0))
        .unwrap();
    graph1
        .add_point_to_edge(PointToEdge::new(a2, literal_id, 2))
        .unwrap();
    let (b0, b6) = (ids.fresh_value(), ids.fresh_value());
    graph2
        .add_point_to_edge(PointToEdge::new(b0, literal_id, 0))
        .unwrap();
    graph2
        .add_point_to_edge(PointToEdge::new(b6, literal_id, 6))
        .unwrap();

    let join = join_graphs(&graph1, &graph2, &mut ids);
    let merged = join.merged().unwrap();

    let start = merged.address_of(literal_id, 0).unwrap();
    assert_eq!(interpreted_values(&join, start), set(vec![a0, b0]));
    assert_eq!(merged.address_of(literal_id, 2), Some(a2));
    assert_eq!(merged.address_of(literal_id, 6), Some(b6));
}

#[test]
fn globals_of_one_side_are_admitted() {
    let mut ids = IdAllocator::new();
    let message = MemoryObject::region(ids.fresh_object_id(), "msg", 4)
        .with_flags(ObjectFlags::STRING_LITERAL);
    let message_id = message.id();
    let counter = MemoryObject::region(ids.fresh_object_id(), "counter", 4);
    let counter_id = counter.id();
    let (text, count) = (ids.fresh_value(), ids.fresh_value());

    let mut graph1 = ShapeGraph::new(MachineModel::linux64());
    graph1.add_global_object(message).unwrap();
    graph1
        .add_has_value_edge(HasValueEdge::new(message_id, 0, FieldType::bytes(4), text))
        .unwrap();
    let mut graph2 = ShapeGraph::new(MachineModel::linux64());
    graph2.add_global_object(counter).unwrap();
    graph2
        .add_has_value_edge(HasValueEdge::new(counter_id, 0, FieldType::integer(4), count))
        .unwrap();

    let join = join_graphs(&graph1, &graph2, &mut ids);
    let merged = join.merged().unwrap();

    assert_eq!(merged.global("msg"), Some(message_id));
    let fields = merged.hv_edges(&HasValueEdgeFilter::object_filter(message_id));
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].value(), text);
    assert_eq!(join.mapping1().get(message_id), Some(message_id));

    // only string literals bring their fields along
    assert_eq!(merged.global("counter"), Some(counter_id));
    assert!(merged
        .hv_edges(&HasValueEdgeFilter::object_filter(counter_id))
        .is_empty());
    assert_eq!(join.mapping2().get(counter_id), Some(counter_id));
}

#[test]
fn unreachable_shared_heap_objects_are_joined() {
    let mut ids = IdAllocator::new();
    let orphan = MemoryObject::region(ids.fresh_object_id(), "orphan", 8);
    let orphan_id = orphan.id();
    let address = ids.fresh_value();
    let mut graph1 = ShapeGraph::new(MachineModel::linux64());
    graph1.add_heap_object(orphan, AllocationSite::new("malloc@7"));
    graph1
        .add_point_to_edge(PointToEdge::new(address, orphan_id, 0))
        .unwrap();
    let mut graph2 = graph1.clone();

    let (x1, x2) = (ids.fresh_value(), ids.fresh_value());
    graph1
        .add_has_value_edge(HasValueEdge::new(orphan_id, 0, FieldType::integer(4), x1))
        .unwrap();
    graph1.set_ref(orphan_id, 2);
    graph2
        .add_has_value_edge(HasValueEdge::new(orphan_id, 0, FieldType::integer(4), x2))
        .unwrap();
    graph2.set_ref(orphan_id, 7);
    graph2.set_validity(orphan_id, false);

    let join = join_graphs(&graph1, &graph2, &mut ids);
    let merged = join.merged().unwrap();

    assert!(merged.is_heap_object(orphan_id));
    assert!(!merged.is_object_valid(orphan_id));
    assert_eq!(merged.ref_count(orphan_id), 2);
    assert_eq!(merged.pointer(address).unwrap().object(), orphan_id);
    let fields = merged.hv_edges(&HasValueEdgeFilter::object_filter(orphan_id));
    assert_eq!(fields.len(), 1);
    assert_eq!(
        interpreted_values(&join, fields[0].value()),
        set(vec![x1, x2])
    );
}

#[test]
fn dangling_objects_follow_the_mappings() {
    let mut ids = IdAllocator::new();
    let fixture = list_graph(&mut ids, 16);
    let mut graph1 = fixture.graph.clone();
    graph1.add_dangling(fixture.node);
    // not in the graph, so never mapped
    graph1.add_dangling(ids.fresh_object_id());
    let mut graph2 = fixture.graph;
    graph2.add_dangling(fixture.head);

    let join = join_graphs(&graph1, &graph2, &mut ids);
    let merged = join.merged().unwrap();
    assert_eq!(
        merged.dangling_set(),
        &set(vec![fixture.head, fixture.node])
    );
}
