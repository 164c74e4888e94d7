//! Tracking of objects not yet published to shared state.
//!
//! An object that no other worker can reach cannot participate in a race,
//! so accesses to it need not be switch points. The tracker records freshly
//! created objects as local and follows stores: writing a local value into
//! a local container keeps it local (with a dependency edge, since the
//! container's publication publishes the value); writing it anywhere shared
//! publishes it and everything reachable from it.
//!
//! The policy is conservative: anything the tracker is unsure about is
//! treated as shared.

use crate::types::ObjectRef;
use crate::util::{DetHashMap, DetHashSet};

/// Tracks which objects are still unreachable from any shared root.
#[derive(Debug, Default)]
pub struct LocalObjectTracker {
    local: DetHashSet<ObjectRef>,
    /// Edges `container -> values stored in it while both were local`.
    dependencies: DetHashMap<ObjectRef, Vec<ObjectRef>>,
}

impl LocalObjectTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly created object as local.
    pub fn register(&mut self, object: ObjectRef) {
        self.local.insert(object);
        self.dependencies.remove(&object);
    }

    /// Records a store of `value` into a field of `target`.
    ///
    /// While `target` is local, `value` inherits locality through a
    /// dependency edge. A store into a shared target publishes `value`.
    pub fn on_field_write(&mut self, target: ObjectRef, value: ObjectRef) {
        if self.local.contains(&target) {
            self.dependencies.entry(target).or_default().push(value);
        } else {
            self.publish(value);
        }
    }

    /// Publishes `object` and everything that was stored into it.
    pub fn publish(&mut self, object: ObjectRef) {
        if !self.local.remove(&object) {
            return;
        }
        if let Some(values) = self.dependencies.remove(&object) {
            for value in values {
                self.publish(value);
            }
        }
    }

    /// True when accesses to `object` cannot be observed by other workers.
    #[must_use]
    pub fn is_local(&self, object: ObjectRef) -> bool {
        self.local.contains(&object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn obj(token: usize) -> ObjectRef {
        ObjectRef::from_token(token)
    }

    #[test]
    fn fresh_objects_are_local() {
        init_test_logging();
        let mut tracker = LocalObjectTracker::new();
        tracker.register(obj(1));
        assert!(tracker.is_local(obj(1)));
        assert!(!tracker.is_local(obj(2)));
    }

    #[test]
    fn store_into_shared_target_publishes() {
        init_test_logging();
        let mut tracker = LocalObjectTracker::new();
        tracker.register(obj(1));
        // obj(9) was never registered: it is shared.
        tracker.on_field_write(obj(9), obj(1));
        assert!(!tracker.is_local(obj(1)));
    }

    #[test]
    fn store_into_local_target_keeps_locality() {
        init_test_logging();
        let mut tracker = LocalObjectTracker::new();
        tracker.register(obj(1));
        tracker.register(obj(2));
        tracker.on_field_write(obj(1), obj(2));
        assert!(tracker.is_local(obj(2)));
    }

    #[test]
    fn publication_is_transitive() {
        init_test_logging();
        crate::test_phase!("publication_is_transitive");
        let mut tracker = LocalObjectTracker::new();
        tracker.register(obj(1));
        tracker.register(obj(2));
        tracker.register(obj(3));
        tracker.on_field_write(obj(1), obj(2));
        tracker.on_field_write(obj(2), obj(3));
        // Publishing the outer container publishes the whole subgraph.
        tracker.publish(obj(1));
        assert!(!tracker.is_local(obj(1)));
        assert!(!tracker.is_local(obj(2)));
        assert!(!tracker.is_local(obj(3)));
        crate::test_complete!("publication_is_transitive");
    }

    #[test]
    fn publish_of_shared_object_is_a_no_op() {
        init_test_logging();
        let mut tracker = LocalObjectTracker::new();
        tracker.publish(obj(5));
        assert!(!tracker.is_local(obj(5)));
    }
}
