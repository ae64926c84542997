use crate::merge::abstraction::GuardedAbstraction;
use crate::shape::*;
use crate::types::MachineModel;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Where a heap object was allocated, e.g. the call `malloc` of a CFA edge.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct AllocationSite(String);

impl AllocationSite {
    pub fn new<S: Into<String>>(site: S) -> AllocationSite {
        AllocationSite(site.into())
    }

    pub fn site(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AllocationSite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The heap of one abstract program state.
///
/// Objects live in an arena keyed by `ObjectId`. Every other part of the
/// graph refers to objects by handle. A fresh graph already holds the `NULL`
/// and `VOID` objects and the `NULL` value pointing to `NULL`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ShapeGraph {
    machine_model: MachineModel,
    objects: BTreeMap<ObjectId, MemoryObject>,
    values: BTreeSet<Value>,
    has_value_edges: BTreeMap<ObjectId, BTreeSet<HasValueEdge>>,
    point_to_edges: BTreeMap<Value, PointToEdge>,
    validity: BTreeMap<ObjectId, bool>,
    ref_counts: BTreeMap<ObjectId, u64>,
    globals: BTreeMap<String, ObjectId>,
    stack: Vec<StackFrame>,
    heap: BTreeMap<ObjectId, AllocationSite>,
    eq: EquivalenceRelation,
    neq: InequalityRelation,
    constraints: ConstraintsPool,
    explicit_values: BTreeMap<Value, ExplicitValue>,
    size_info: BTreeMap<ObjectId, SymbolicExpression>,
    dangling: BTreeSet<ObjectId>,
    memory_leak: bool,
    leak_edges: BTreeSet<String>,
    abstraction: GuardedAbstraction,
}

impl ShapeGraph {
    pub fn new(machine_model: MachineModel) -> ShapeGraph {
        let mut graph = ShapeGraph {
            machine_model,
            objects: BTreeMap::new(),
            values: BTreeSet::new(),
            has_value_edges: BTreeMap::new(),
            point_to_edges: BTreeMap::new(),
            validity: BTreeMap::new(),
            ref_counts: BTreeMap::new(),
            globals: BTreeMap::new(),
            stack: Vec::new(),
            heap: BTreeMap::new(),
            eq: EquivalenceRelation::new(),
            neq: InequalityRelation::new(),
            constraints: ConstraintsPool::new(),
            explicit_values: BTreeMap::new(),
            size_info: BTreeMap::new(),
            dangling: BTreeSet::new(),
            memory_leak: false,
            leak_edges: BTreeSet::new(),
            abstraction: GuardedAbstraction::new(),
        };
        graph.insert_object(MemoryObject::null(), false);
        graph.insert_object(MemoryObject::void(), false);
        graph.values.insert(Value::NULL);
        graph.point_to_edges.insert(
            Value::NULL,
            PointToEdge::new(Value::NULL, ObjectId::NULL, 0),
        );
        graph
    }

    pub fn machine_model(&self) -> &MachineModel {
        &self.machine_model
    }

    fn insert_object(&mut self, object: MemoryObject, valid: bool) {
        self.validity.insert(object.id(), valid);
        self.objects.insert(object.id(), object);
    }

    fn check_object(&self, object: ObjectId) -> Result<(), Error> {
        if self.objects.contains_key(&object) {
            Ok(())
        } else {
            Err(Error::ObjectNotFound(object))
        }
    }

    /// Add a global variable. The object's label is the variable's name.
    pub fn add_global_object(&mut self, object: MemoryObject) -> Result<(), Error> {
        match self.globals.get(object.label()) {
            Some(id) if *id != object.id() => {
                return Err(Error::DuplicateGlobal(object.label().to_string()))
            }
            _ => {}
        }
        self.globals.insert(object.label().to_string(), object.id());
        self.insert_object(object, true);
        Ok(())
    }

    /// Push a new innermost stack frame.
    pub fn add_stack_frame<S: Into<String>>(
        &mut self,
        function: S,
        return_object: Option<MemoryObject>,
    ) {
        let frame = StackFrame::new(function, return_object.as_ref().map(|o| o.id()));
        if let Some(return_object) = return_object {
            self.insert_object(return_object, true);
        }
        self.stack.push(frame);
    }

    /// Add a local variable to the innermost stack frame. The object's label
    /// is the variable's name.
    pub fn add_stack_object(
        &mut self,
        object: MemoryObject,
        variable_length_array: bool,
    ) -> Result<(), Error> {
        let frame = self.stack.last_mut().ok_or(Error::EmptyStack)?;
        frame.add_variable(object.label(), object.id(), variable_length_array)?;
        self.insert_object(object, true);
        Ok(())
    }

    pub fn add_heap_object(&mut self, object: MemoryObject, site: AllocationSite) {
        self.heap.insert(object.id(), site);
        self.ref_counts.entry(object.id()).or_insert(0);
        self.insert_object(object, true);
    }

    /// Remove an object together with its has-value edges and every
    /// point-to edge into it.
    pub fn remove_object(&mut self, object: ObjectId) {
        self.objects.remove(&object);
        self.has_value_edges.remove(&object);
        self.point_to_edges.retain(|_, edge| edge.object() != object);
        self.validity.remove(&object);
        self.ref_counts.remove(&object);
        self.heap.remove(&object);
        self.size_info.remove(&object);
        self.dangling.remove(&object);
        self.globals.retain(|_, id| *id != object);
    }

    pub fn add_value(&mut self, value: Value) {
        self.values.insert(value);
    }

    pub fn add_has_value_edge(&mut self, edge: HasValueEdge) -> Result<(), Error> {
        self.check_object(edge.object())?;
        self.values.insert(edge.value());
        self.has_value_edges
            .entry(edge.object())
            .or_default()
            .insert(edge);
        Ok(())
    }

    pub fn remove_has_value_edge(&mut self, edge: &HasValueEdge) {
        if let Some(edges) = self.has_value_edges.get_mut(&edge.object()) {
            edges.remove(edge);
        }
    }

    /// Replace every has-value edge of `object` with `edges`.
    pub fn replace_has_value_edges(
        &mut self,
        object: ObjectId,
        edges: BTreeSet<HasValueEdge>,
    ) -> Result<(), Error> {
        self.check_object(object)?;
        if let Some(edge) = edges.iter().find(|edge| edge.object() != object) {
            return Err(Error::Custom(format!("{} is not an edge of {}", edge, object)));
        }
        for edge in &edges {
            self.values.insert(edge.value());
        }
        self.has_value_edges.insert(object, edges);
        Ok(())
    }

    /// Add a point-to edge, replacing any point-to edge of its value.
    pub fn add_point_to_edge(&mut self, edge: PointToEdge) -> Result<(), Error> {
        self.check_object(edge.object())?;
        self.values.insert(edge.value());
        self.point_to_edges.insert(edge.value(), edge);
        Ok(())
    }

    pub fn set_validity(&mut self, object: ObjectId, valid: bool) {
        if let Some(validity) = self.validity.get_mut(&object) {
            *validity = valid;
        }
    }

    /// Set the reference count of a heap object. Has no effect on objects
    /// whose references are not counted.
    pub fn set_ref(&mut self, object: ObjectId, count: u64) {
        if let Some(ref_count) = self.ref_counts.get_mut(&object) {
            *ref_count = count;
        }
    }

    pub fn add_neq(&mut self, a: Value, b: Value) {
        self.neq.add_relation(a, b);
    }

    pub fn add_equalities(&mut self, eq: &EquivalenceRelation) {
        self.eq.add_all(eq);
    }

    pub fn add_constraint(&mut self, constraint: SymbolicExpression) {
        self.constraints.add_constraint(constraint);
    }

    pub fn set_constraints_pool(&mut self, constraints: ConstraintsPool) {
        self.constraints = constraints;
    }

    pub fn put_explicit_value(&mut self, value: Value, explicit: ExplicitValue) {
        self.explicit_values.insert(value, explicit);
    }

    pub fn add_size_info(&mut self, object: ObjectId, size: SymbolicExpression) {
        self.size_info.insert(object, size);
    }

    pub fn add_dangling(&mut self, object: ObjectId) {
        self.dangling.insert(object);
    }

    pub fn set_dangling_set(&mut self, dangling: BTreeSet<ObjectId>) {
        self.dangling = dangling;
    }

    pub fn set_memory_leak(&mut self, memory_leak: bool) {
        self.memory_leak = memory_leak;
    }

    pub fn add_leak_edge<S: Into<String>>(&mut self, edge: S) {
        self.leak_edges.insert(edge.into());
    }

    pub fn set_leak_edges(&mut self, leak_edges: BTreeSet<String>) {
        self.leak_edges = leak_edges;
    }

    pub fn set_abstraction(&mut self, abstraction: GuardedAbstraction) {
        self.abstraction = abstraction;
    }

    /// Record that `v1` and `v2` are equal. Every use of either value is
    /// rewritten to the representative of their class.
    pub fn merge_values(&mut self, v1: Value, v2: Value) {
        if self.eq.add_relation(v1, v2) {
            return;
        }
        let representative = self.eq.representative(v1);
        for value in [v1, v2] {
            if value != representative {
                self.replace_value(representative, value);
            }
        }
    }

    fn replace_value(&mut self, new: Value, old: Value) {
        self.neq.merge_values(new, old);
        self.values.remove(&old);
        self.values.insert(new);
        for edges in self.has_value_edges.values_mut() {
            if edges.iter().any(|edge| edge.value() == old) {
                *edges = edges
                    .iter()
                    .map(|edge| {
                        if edge.value() == old {
                            edge.with_value(new)
                        } else {
                            edge.clone()
                        }
                    })
                    .collect();
            }
        }
        if let Some(edge) = self.point_to_edges.remove(&old) {
            self.point_to_edges
                .entry(new)
                .or_insert_with(|| edge.with_value(new));
        }
        if let Some(explicit) = self.explicit_values.remove(&old) {
            self.explicit_values.entry(new).or_insert(explicit);
        }
        for size in self.size_info.values_mut() {
            size.replace_value(old, new);
        }
        self.constraints.replace_value(old, new);
    }

    pub fn objects(&self) -> impl Iterator<Item = &MemoryObject> {
        self.objects.values()
    }

    pub fn object(&self, object: ObjectId) -> Option<&MemoryObject> {
        self.objects.get(&object)
    }

    pub fn contains_object(&self, object: ObjectId) -> bool {
        self.objects.contains_key(&object)
    }

    pub fn values(&self) -> &BTreeSet<Value> {
        &self.values
    }

    pub fn contains_value(&self, value: Value) -> bool {
        self.values.contains(&value)
    }

    /// Every has-value edge of this graph.
    pub fn has_value_edges(&self) -> impl Iterator<Item = &HasValueEdge> {
        self.has_value_edges.values().flat_map(|edges| edges.iter())
    }

    /// The has-value edges passing `filter`.
    pub fn hv_edges(&self, filter: &HasValueEdgeFilter) -> Vec<HasValueEdge> {
        self.has_value_edges
            .get(&filter.object())
            .map(|edges| {
                edges
                    .iter()
                    .filter(|edge| filter.holds(edge))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn point_to_edges(&self) -> &BTreeMap<Value, PointToEdge> {
        &self.point_to_edges
    }

    pub fn pointer(&self, value: Value) -> Option<&PointToEdge> {
        self.point_to_edges.get(&value)
    }

    pub fn is_pointer(&self, value: Value) -> bool {
        self.point_to_edges.contains_key(&value)
    }

    /// The address pointing to `offset` bytes into `object`, if there is one.
    pub fn address_of(&self, object: ObjectId, offset: i64) -> Option<Value> {
        self.point_to_edges
            .values()
            .find(|edge| edge.object() == object && edge.offset() == offset)
            .map(|edge| edge.value())
    }

    pub fn is_object_valid(&self, object: ObjectId) -> bool {
        self.validity.get(&object).copied().unwrap_or(false)
    }

    pub fn ref_count(&self, object: ObjectId) -> u64 {
        self.ref_counts.get(&object).copied().unwrap_or(0)
    }

    pub fn globals(&self) -> &BTreeMap<String, ObjectId> {
        &self.globals
    }

    pub fn global(&self, name: &str) -> Option<ObjectId> {
        self.globals.get(name).copied()
    }

    pub fn is_global_object(&self, object: ObjectId) -> bool {
        self.globals.values().any(|id| *id == object)
    }

    /// The stack frames, outermost first.
    pub fn stack_frames(&self) -> &[StackFrame] {
        &self.stack
    }

    pub fn is_heap_object(&self, object: ObjectId) -> bool {
        self.heap.contains_key(&object)
    }

    pub fn heap_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.heap.keys().copied()
    }

    pub fn allocation_site(&self, object: ObjectId) -> Option<&AllocationSite> {
        self.heap.get(&object)
    }

    pub fn eq(&self) -> &EquivalenceRelation {
        &self.eq
    }

    pub fn neq(&self) -> &InequalityRelation {
        &self.neq
    }

    pub fn is_neq(&self, a: Value, b: Value) -> bool {
        self.neq.exists(a, b)
    }

    pub fn constraints_pool(&self) -> &ConstraintsPool {
        &self.constraints
    }

    pub fn constraints_pool_mut(&mut self) -> &mut ConstraintsPool {
        &mut self.constraints
    }

    /// The condition under which this state was reached but the state it was
    /// last merged with was not.
    pub fn after_branch_condition(&self) -> BTreeSet<Constraint> {
        let mut condition: BTreeSet<Constraint> = self
            .constraints
            .branch_conditions()
            .iter()
            .cloned()
            .map(Constraint::Simple)
            .collect();
        if let Some(disjunction) = self.constraints.disjunction() {
            condition.insert(disjunction);
        }
        condition
    }

    pub fn explicit_values(&self) -> &BTreeMap<Value, ExplicitValue> {
        &self.explicit_values
    }

    pub fn explicit_value(&self, value: Value) -> Option<&ExplicitValue> {
        self.explicit_values.get(&value)
    }

    pub fn size_info(&self) -> &BTreeMap<ObjectId, SymbolicExpression> {
        &self.size_info
    }

    pub fn size_of_object(&self, object: ObjectId) -> Option<&SymbolicExpression> {
        self.size_info.get(&object)
    }

    pub fn dangling_set(&self) -> &BTreeSet<ObjectId> {
        &self.dangling
    }

    pub fn has_memory_leak(&self) -> bool {
        self.memory_leak
    }

    pub fn leak_edges(&self) -> &BTreeSet<String> {
        &self.leak_edges
    }

    pub fn abstraction(&self) -> &GuardedAbstraction {
        &self.abstraction
    }

    pub fn abstraction_mut(&mut self) -> &mut GuardedAbstraction {
        &mut self.abstraction
    }

    /// The offsets of the bytes of `object` known to hold zero.
    ///
    /// Only edges holding `Value::NULL` are considered, so this is exact for
    /// objects that are not zero-initialized.
    pub fn null_bytes(&self, object: ObjectId) -> BTreeSet<i64> {
        self.hv_edges(&HasValueEdgeFilter::object_filter(object).having_value(Value::NULL))
            .iter()
            .flat_map(|edge| edge.offset()..edge.end())
            .collect()
    }

    /// The offsets of the bytes of `object` covered by a non-null value.
    pub fn non_null_bytes(&self, object: ObjectId) -> BTreeSet<i64> {
        let mut bytes: BTreeSet<i64> = self
            .hv_edges(&HasValueEdgeFilter::object_filter(object).not_having_value(Value::NULL))
            .iter()
            .flat_map(|edge| edge.offset()..edge.end())
            .collect();
        for byte in self.null_bytes(object) {
            bytes.remove(&byte);
        }
        bytes
    }

    /// Render this graph as json.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for ShapeGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for object in self.objects.values() {
            writeln!(f, "{}", object)?;
            for edge in self.has_value_edges.get(&object.id()).into_iter().flatten() {
                writeln!(f, "  {}", edge)?;
            }
        }
        for edge in self.point_to_edges.values() {
            writeln!(f, "{}", edge)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_graph(ids: &mut IdAllocator) -> ShapeGraph {
        let model = MachineModel::linux64();
        let mut graph = ShapeGraph::new(model.clone());

        let global = MemoryObject::region(ids.fresh_object_id(), "head", 8);
        let node = MemoryObject::region(ids.fresh_object_id(), "node", 16);
        let (global_id, node_id) = (global.id(), node.id());
        graph.add_global_object(global).unwrap();
        graph.add_heap_object(node, AllocationSite::new("malloc@3"));

        let address = ids.fresh_value();
        let data = ids.fresh_value();
        graph
            .add_point_to_edge(PointToEdge::new(address, node_id, 0))
            .unwrap();
        graph
            .add_has_value_edge(HasValueEdge::new(
                global_id,
                0,
                FieldType::pointer(&model),
                address,
            ))
            .unwrap();
        graph
            .add_has_value_edge(HasValueEdge::new(node_id, 0, FieldType::integer(4), data))
            .unwrap();
        graph
            .add_has_value_edge(HasValueEdge::new(
                node_id,
                8,
                FieldType::pointer(&model),
                Value::NULL,
            ))
            .unwrap();
        graph
    }

    #[test]
    fn new_graph() {
        let graph = ShapeGraph::new(MachineModel::linux64());
        assert!(graph.contains_object(ObjectId::NULL));
        assert!(graph.contains_object(ObjectId::VOID));
        assert!(graph.is_pointer(Value::NULL));
        assert_eq!(graph.pointer(Value::NULL).unwrap().object(), ObjectId::NULL);
        assert!(!graph.is_object_valid(ObjectId::NULL));
    }

    #[test]
    fn add_edges() {
        let mut ids = IdAllocator::new();
        let graph = create_test_graph(&mut ids);
        let head = graph.global("head").unwrap();
        let edges = graph.hv_edges(&HasValueEdgeFilter::object_filter(head));
        assert_eq!(edges.len(), 1);

        let address = edges[0].value();
        let node = graph.pointer(address).unwrap().object();
        assert!(graph.is_heap_object(node));
        assert_eq!(graph.address_of(node, 0), Some(address));
        assert_eq!(
            graph.allocation_site(node),
            Some(&AllocationSite::new("malloc@3"))
        );
        assert!(graph.is_object_valid(node));
    }

    #[test]
    fn edge_for_missing_object() {
        let mut graph = ShapeGraph::new(MachineModel::linux64());
        let edge = HasValueEdge::new(ObjectId::new(40), 0, FieldType::integer(4), Value::new(2));
        assert!(graph.add_has_value_edge(edge).is_err());
        assert!(graph
            .add_point_to_edge(PointToEdge::new(Value::new(2), ObjectId::new(40), 0))
            .is_err());
    }

    #[test]
    fn stack_objects() {
        let mut ids = IdAllocator::new();
        let mut graph = ShapeGraph::new(MachineModel::linux64());
        let local = MemoryObject::region(ids.fresh_object_id(), "x", 4);
        assert!(graph.add_stack_object(local.clone(), false).is_err());

        graph.add_stack_frame("main", None);
        graph.add_stack_object(local.clone(), false).unwrap();
        assert_eq!(graph.stack_frames()[0].variable("x"), Some(local.id()));
        assert!(graph.add_stack_object(local, false).is_err());
    }

    #[test]
    fn null_bytes() {
        let mut ids = IdAllocator::new();
        let graph = create_test_graph(&mut ids);
        let head = graph.global("head").unwrap();
        let address = graph.hv_edges(&HasValueEdgeFilter::object_filter(head))[0].value();
        let node = graph.pointer(address).unwrap().object();

        let null = graph.null_bytes(node);
        assert_eq!(null, (8..16).collect());
        let non_null = graph.non_null_bytes(node);
        assert_eq!(non_null, (0..4).collect());
    }

    #[test]
    fn merge_values() {
        let mut ids = IdAllocator::new();
        let mut graph = create_test_graph(&mut ids);
        let head = graph.global("head").unwrap();
        let address = graph.hv_edges(&HasValueEdgeFilter::object_filter(head))[0].value();

        let alias = ids.fresh_value();
        let other = ids.fresh_value();
        graph.add_value(alias);
        graph.add_neq(alias, other);
        graph.merge_values(alias, address);

        assert!(!graph.contains_value(alias));
        assert!(graph.is_neq(address, other));
        assert!(graph.eq().is_equal(alias, address));
        assert!(graph.is_pointer(address));
    }

    #[test]
    fn to_json() {
        let mut ids = IdAllocator::new();
        let graph = create_test_graph(&mut ids);
        let json = graph.to_json().unwrap();
        let parsed: ShapeGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, graph);
    }
}
