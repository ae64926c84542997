use crate::shape::{ObjectId, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Where the objects and addresses of one input graph went in the merged
/// graph.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeMapping {
    objects: BTreeMap<ObjectId, ObjectId>,
    images: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
    replacements: BTreeMap<Value, Value>,
    pending: VecDeque<Value>,
}

impl NodeMapping {
    pub fn new() -> NodeMapping {
        NodeMapping::default()
    }

    /// Map `source` to `destination`, replacing any previous mapping of
    /// `source`.
    pub fn put_object(&mut self, source: ObjectId, destination: ObjectId) {
        if let Some(previous) = self.objects.insert(source, destination) {
            if let Some(sources) = self.images.get_mut(&previous) {
                sources.remove(&source);
                if sources.is_empty() {
                    self.images.remove(&previous);
                }
            }
        }
        self.images.entry(destination).or_default().insert(source);
    }

    pub fn get(&self, source: ObjectId) -> Option<ObjectId> {
        self.objects.get(&source).copied()
    }

    pub fn contains_object(&self, source: ObjectId) -> bool {
        self.objects.contains_key(&source)
    }

    /// Is some object mapped to `destination`.
    pub fn contains_image(&self, destination: ObjectId) -> bool {
        self.images.contains_key(&destination)
    }

    pub fn objects(&self) -> &BTreeMap<ObjectId, ObjectId> {
        &self.objects
    }

    /// Record that `address` is represented by `replacement` in the merged
    /// graph.
    pub fn put_value(&mut self, address: Value, replacement: Value) {
        self.replacements.insert(address, replacement);
    }

    pub fn replacement(&self, address: Value) -> Option<Value> {
        self.replacements.get(&address).copied()
    }

    pub fn replacements(&self) -> &BTreeMap<Value, Value> {
        &self.replacements
    }

    /// Queue `address` so its target is copied into the merged graph.
    pub fn add_pending(&mut self, address: Value) {
        if !self.pending.contains(&address) {
            self.pending.push_back(address);
        }
    }

    /// Queue `address`, which is represented by `replacement` in the merged
    /// graph.
    pub fn add_pending_with_replacement(&mut self, address: Value, replacement: Value) {
        self.put_value(address, replacement);
        self.add_pending(address);
    }

    pub fn remove_pending(&mut self, address: Value) {
        self.pending.retain(|pending| *pending != address);
    }

    pub fn pending(&self) -> &VecDeque<Value> {
        &self.pending
    }

    /// Take every pending address, in the order they were queued.
    pub fn take_pending(&mut self) -> VecDeque<Value> {
        std::mem::take(&mut self.pending)
    }

    pub fn reset_pending(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects() {
        let mut mapping = NodeMapping::new();
        let (a, b, c) = (ObjectId::new(2), ObjectId::new(3), ObjectId::new(4));
        mapping.put_object(a, c);
        assert_eq!(mapping.get(a), Some(c));
        assert!(mapping.contains_image(c));
        assert!(!mapping.contains_object(b));

        mapping.put_object(a, b);
        assert!(!mapping.contains_image(c));
        assert!(mapping.contains_image(b));
    }

    #[test]
    fn pending_is_fifo() {
        let mut mapping = NodeMapping::new();
        let (a, b, c) = (Value::new(2), Value::new(3), Value::new(4));
        mapping.add_pending(a);
        mapping.add_pending_with_replacement(b, c);
        mapping.add_pending(a);
        assert_eq!(mapping.replacement(b), Some(c));

        mapping.remove_pending(a);
        mapping.add_pending(a);
        assert_eq!(mapping.take_pending(), VecDeque::from(vec![b, a]));
        assert!(mapping.pending().is_empty());
    }
}
