//! Entities: identities owning ordered lists of component instances.
//!
//! An entity is created standalone and becomes live once added to a
//! [`World`](crate::world::World). Component mutations notify the entity's
//! subscribers in subscription order; a containing world subscribes to keep
//! its matching index consistent.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::component::{Component, KindId};
use crate::sequence;

/// A unique entity identifier, assigned monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Change callback: receives the entity and the added or removed instance.
/// Active-flag flips are delivered with neither.
///
/// Callbacks are shared `Fn` so notification is re-entrant: a callback may
/// mutate the entity again (a world's reindexing does exactly that when a
/// hook attaches further components).
type SubscriberFn = dyn Fn(&Entity, Option<&Component>, Option<&Component>);

struct Subscriber {
    id: u64,
    callback: Rc<SubscriberFn>,
}

struct EntityInner {
    id: EntityId,
    active: bool,
    components: BTreeMap<KindId, Vec<Component>>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
}

/// An identity owning zero or more component instances per kind.
///
/// Cheap to clone; all clones refer to the same entity. Identity is the
/// entity id.
#[derive(Clone)]
pub struct Entity {
    inner: Rc<RefCell<EntityInner>>,
}

impl Entity {
    /// Create a standalone, active entity not yet known to any world.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(EntityInner {
                id: sequence::next_entity_id(),
                active: true,
                components: BTreeMap::new(),
                subscribers: Vec::new(),
                next_subscriber: 1,
            })),
        }
    }

    /// The unique identifier of this entity.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.inner.borrow().id
    }

    /// Whether the entity participates in system matching and updates.
    #[must_use]
    pub fn active(&self) -> bool {
        self.inner.borrow().active
    }

    /// Flip the active flag. A real change notifies subscribers with
    /// neither an added nor a removed instance, so a containing world can
    /// re-evaluate matching without dispatching component-change hooks.
    pub fn set_active(&self, active: bool) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.active == active {
                return;
            }
            inner.active = active;
        }
        self.notify(None, None);
    }

    /// Attach a component instance.
    ///
    /// Idempotent: re-adding an instance already present in its kind's
    /// list does nothing and notifies nobody. Otherwise the instance is
    /// appended and every subscriber observes the addition.
    pub fn add(&self, component: &Component) {
        {
            let mut inner = self.inner.borrow_mut();
            let list = inner.components.entry(component.kind()).or_default();
            if list.iter().any(|c| c.id() == component.id()) {
                return;
            }
            list.push(component.clone());
        }
        self.notify(Some(component), None);
    }

    /// Detach a component instance; a no-op when absent.
    ///
    /// The kind's list is deleted entirely once it empties, so `has`
    /// reflects "at least one instance present".
    pub fn remove(&self, component: &Component) {
        {
            let mut inner = self.inner.borrow_mut();
            let Some(list) = inner.components.get_mut(&component.kind()) else {
                return;
            };
            let Some(index) = list.iter().position(|c| c.id() == component.id()) else {
                return;
            };
            list.remove(index);
            if list.is_empty() {
                inner.components.remove(&component.kind());
            }
        }
        self.notify(None, Some(component));
    }

    /// `true` iff every given kind has at least one instance present.
    #[must_use]
    pub fn has(&self, kinds: &[KindId]) -> bool {
        let inner = self.inner.borrow();
        kinds
            .iter()
            .all(|kind| inner.components.get(kind).is_some_and(|list| !list.is_empty()))
    }

    /// All instances of one kind, in attachment order. Empty if none.
    #[must_use]
    pub fn components_of(&self, kind: KindId) -> Vec<Component> {
        self.inner
            .borrow()
            .components
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Register a change callback, invoked on every component add/remove
    /// (and active-flag flip) in subscription order.
    ///
    /// The returned [`Subscription`] removes exactly this callback when
    /// cancelled; cancelling again is a safe no-op.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Entity, Option<&Component>, Option<&Component>) + 'static,
    ) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push(Subscriber {
            id,
            callback: Rc::new(callback),
        });
        Subscription {
            entity: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Invoke every subscriber registered at the time of the mutation.
    /// No borrow is held across the callbacks, so subscribers may mutate
    /// the entity again.
    fn notify(&self, added: Option<&Component>, removed: Option<&Component>) {
        let callbacks: Vec<Rc<SubscriberFn>> = self
            .inner
            .borrow()
            .subscribers
            .iter()
            .map(|s| s.callback.clone())
            .collect();
        for callback in callbacks {
            (callback.as_ref())(self, added, removed);
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Entity")
            .field("id", &inner.id)
            .field("active", &inner.active)
            .field("kinds", &inner.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Capability returned by [`Entity::subscribe`]; removes exactly the
/// callback it was created for.
pub struct Subscription {
    entity: Weak<RefCell<EntityInner>>,
    id: u64,
}

impl Subscription {
    /// Remove the callback from the entity's subscriber list. Safe to call
    /// more than once, and after the entity is gone.
    pub fn cancel(&self) {
        if let Some(inner) = self.entity.upgrade() {
            inner.borrow_mut().subscribers.retain(|s| s.id != self.id);
        }
    }
}
