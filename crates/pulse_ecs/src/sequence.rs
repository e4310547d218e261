//! Process-wide id allocation.
//!
//! Entity ids, system ids, component kind ids, and component instance ids
//! are drawn from four independent monotonic counters, initialised once at
//! library load. Ids start at 1 and are never reused.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::component::{InstanceId, KindId};
use crate::entity::EntityId;
use crate::system::SystemId;

struct Sequences {
    entity: AtomicU64,
    system: AtomicU64,
    kind: AtomicU64,
    instance: AtomicU64,
}

static SEQUENCES: Sequences = Sequences {
    entity: AtomicU64::new(1),
    system: AtomicU64::new(1),
    kind: AtomicU64::new(1),
    instance: AtomicU64::new(1),
};

pub(crate) fn next_entity_id() -> EntityId {
    EntityId(SEQUENCES.entity.fetch_add(1, Ordering::Relaxed))
}

pub(crate) fn next_system_id() -> SystemId {
    SystemId(SEQUENCES.system.fetch_add(1, Ordering::Relaxed))
}

pub(crate) fn next_kind_id() -> KindId {
    KindId(SEQUENCES.kind.fetch_add(1, Ordering::Relaxed))
}

pub(crate) fn next_instance_id() -> InstanceId {
    InstanceId(SEQUENCES.instance.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic_within_namespace() {
        let a = next_entity_id();
        let b = next_entity_id();
        assert!(b.0 > a.0);

        let a = next_kind_id();
        let b = next_kind_id();
        assert!(b.0 > a.0);
    }

    #[test]
    fn test_namespaces_are_independent() {
        // Allocating from one namespace must not advance another.
        let before = next_system_id();
        let _ = next_instance_id();
        let _ = next_instance_id();
        let after = next_system_id();
        assert_eq!(after.0, before.0 + 1);
    }
}
