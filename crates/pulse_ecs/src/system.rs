//! Systems: behavior descriptors matched against entity signatures.
//!
//! A system carries a required-kind signature, a frequency cap, optional
//! lifecycle hooks, and an event-listener table. It holds no per-entity
//! state — membership and timing bookkeeping live in the
//! [`World`](crate::world::World).
//!
//! Hooks are installed builder-style as closures, each receiving the
//! owning world handle; state a hook needs across invocations is captured
//! in the closure. A hook may freely mutate the world and other systems,
//! but must not re-enter its own slot (a `change` hook mutating a
//! component it reacts to on the same system recurses into itself).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{Component, KindId};
use crate::entity::Entity;
use crate::error::EcsError;
use crate::iter::LazyIterator;
use crate::sequence;
use crate::world::World;

/// A unique system identifier, assigned monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(pub u64);

/// The required component-kind signature of a system or query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    /// The match-all sentinel: every live entity, regardless of composition.
    All,
    /// Entities holding at least one instance of every listed kind. An
    /// empty list is satisfied by every active entity.
    Kinds(Vec<KindId>),
}

impl Signature {
    /// The match-all sentinel.
    #[must_use]
    pub fn all() -> Self {
        Self::All
    }

    /// A signature requiring at least one instance of every given kind.
    #[must_use]
    pub fn of(kinds: impl IntoIterator<Item = KindId>) -> Self {
        Self::Kinds(kinds.into_iter().collect())
    }

    /// Whether this is the match-all sentinel.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Whether the entity's component composition satisfies the signature.
    /// The active flag is not consulted here.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => entity.has(kinds),
        }
    }

    /// Whether a mutation of the given kind is relevant to this signature.
    #[must_use]
    pub fn is_relevant(&self, kind: KindId) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

type UpdateFn = Box<dyn FnMut(&World, f64, f64, &Entity)>;
type TransitionFn = Box<dyn FnMut(&World, &Entity)>;
type ChangeFn = Box<dyn FnMut(&World, &Entity, Option<&Component>, Option<&Component>)>;
type BeforeAllFn = Box<dyn FnMut(&World, f64)>;
type AfterAllFn = Box<dyn FnMut(&World, f64, &[Entity])>;
type ListenerFn = Rc<RefCell<dyn FnMut(&World, &Value, &LazyIterator<Entity>)>>;

#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) id: u64,
    pub(crate) once: bool,
    pub(crate) callback: ListenerFn,
}

struct SystemInner {
    id: SystemId,
    signature: Signature,
    frequency: f64,
    update: RefCell<Option<UpdateFn>>,
    enter: RefCell<Option<TransitionFn>>,
    exit: RefCell<Option<TransitionFn>>,
    change: RefCell<Option<ChangeFn>>,
    before_update_all: RefCell<Option<BeforeAllFn>>,
    after_update_all: RefCell<Option<AfterAllFn>>,
    listeners: RefCell<HashMap<String, Vec<Listener>>>,
    next_listener: Cell<u64>,
}

/// A behavior run against the entities matching its signature.
///
/// Cheap to clone; all clones refer to the same system. Identity is the
/// system id.
#[derive(Clone)]
pub struct System {
    inner: Rc<SystemInner>,
}

impl System {
    /// Create a system with a required-kind signature and a frequency cap
    /// in executions per second (0 = run on every update tick).
    ///
    /// # Errors
    ///
    /// Fails if `frequency_hz` is negative or not finite.
    pub fn new(signature: Signature, frequency_hz: f64) -> Result<Self, EcsError> {
        if !frequency_hz.is_finite() || frequency_hz < 0.0 {
            return Err(EcsError::InvalidFrequency(frequency_hz));
        }
        Ok(Self {
            inner: Rc::new(SystemInner {
                id: sequence::next_system_id(),
                signature,
                frequency: frequency_hz,
                update: RefCell::new(None),
                enter: RefCell::new(None),
                exit: RefCell::new(None),
                change: RefCell::new(None),
                before_update_all: RefCell::new(None),
                after_update_all: RefCell::new(None),
                listeners: RefCell::new(HashMap::new()),
                next_listener: Cell::new(1),
            }),
        })
    }

    /// The unique identifier of this system.
    #[must_use]
    pub fn id(&self) -> SystemId {
        self.inner.id
    }

    /// The required-kind signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    /// The frequency cap in executions per second (0 = unthrottled).
    #[must_use]
    pub fn frequency(&self) -> f64 {
        self.inner.frequency
    }

    /// Install the per-entity update hook:
    /// `(world, game_time, elapsed_since_last_run, entity)`.
    #[must_use]
    pub fn on_update(self, hook: impl FnMut(&World, f64, f64, &Entity) + 'static) -> Self {
        *self.inner.update.borrow_mut() = Some(Box::new(hook));
        self
    }

    /// Install the hook fired once when an entity starts matching.
    #[must_use]
    pub fn on_enter(self, hook: impl FnMut(&World, &Entity) + 'static) -> Self {
        *self.inner.enter.borrow_mut() = Some(Box::new(hook));
        self
    }

    /// Install the hook fired once when an entity stops matching,
    /// including when the entity or this system leaves the world.
    #[must_use]
    pub fn on_exit(self, hook: impl FnMut(&World, &Entity) + 'static) -> Self {
        *self.inner.exit.borrow_mut() = Some(Box::new(hook));
        self
    }

    /// Install the hook fired when a signature-relevant component mutation
    /// happens on an already-matching entity. At least one of
    /// added/removed is `Some`.
    #[must_use]
    pub fn on_change(
        self,
        hook: impl FnMut(&World, &Entity, Option<&Component>, Option<&Component>) + 'static,
    ) -> Self {
        *self.inner.change.borrow_mut() = Some(Box::new(hook));
        self
    }

    /// Install the hook fired once per frame before this system's first
    /// `update` call of the frame.
    #[must_use]
    pub fn on_before_update_all(self, hook: impl FnMut(&World, f64) + 'static) -> Self {
        *self.inner.before_update_all.borrow_mut() = Some(Box::new(hook));
        self
    }

    /// Install the hook fired once per frame after the full entity pass,
    /// with the entities this system updated that frame.
    #[must_use]
    pub fn on_after_update_all(self, hook: impl FnMut(&World, f64, &[Entity]) + 'static) -> Self {
        *self.inner.after_update_all.borrow_mut() = Some(Box::new(hook));
        self
    }

    /// Subscribe to a world-broadcast event. The callback receives the
    /// payload and this system's current query iterator. With `once`, the
    /// listener deregisters itself after its first invocation.
    pub fn listen_to(
        &self,
        event: &str,
        callback: impl FnMut(&World, &Value, &LazyIterator<Entity>) + 'static,
        once: bool,
    ) {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(Listener {
                id,
                once,
                callback: Rc::new(RefCell::new(callback)),
            });
    }

    pub(crate) fn has_update(&self) -> bool {
        self.inner.update.borrow().is_some()
    }

    pub(crate) fn has_change(&self) -> bool {
        self.inner.change.borrow().is_some()
    }

    pub(crate) fn run_update(&self, world: &World, game_time: f64, elapsed: f64, entity: &Entity) {
        let mut slot = self.inner.update.borrow_mut();
        if let Some(hook) = slot.as_mut() {
            hook(world, game_time, elapsed, entity);
        }
    }

    pub(crate) fn run_enter(&self, world: &World, entity: &Entity) {
        let mut slot = self.inner.enter.borrow_mut();
        if let Some(hook) = slot.as_mut() {
            hook(world, entity);
        }
    }

    pub(crate) fn run_exit(&self, world: &World, entity: &Entity) {
        let mut slot = self.inner.exit.borrow_mut();
        if let Some(hook) = slot.as_mut() {
            hook(world, entity);
        }
    }

    pub(crate) fn run_change(
        &self,
        world: &World,
        entity: &Entity,
        added: Option<&Component>,
        removed: Option<&Component>,
    ) {
        let mut slot = self.inner.change.borrow_mut();
        if let Some(hook) = slot.as_mut() {
            hook(world, entity, added, removed);
        }
    }

    pub(crate) fn run_before_update_all(&self, world: &World, game_time: f64) {
        let mut slot = self.inner.before_update_all.borrow_mut();
        if let Some(hook) = slot.as_mut() {
            hook(world, game_time);
        }
    }

    pub(crate) fn run_after_update_all(&self, world: &World, game_time: f64, updated: &[Entity]) {
        let mut slot = self.inner.after_update_all.borrow_mut();
        if let Some(hook) = slot.as_mut() {
            hook(world, game_time, updated);
        }
    }

    /// Snapshot of the listeners registered for an event at dispatch time.
    pub(crate) fn listeners_for(&self, event: &str) -> Vec<Listener> {
        self.inner
            .listeners
            .borrow()
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn remove_listener(&self, event: &str, id: u64) {
        let mut listeners = self.inner.listeners.borrow_mut();
        if let Some(list) = listeners.get_mut(event) {
            list.retain(|l| l.id != id);
            if list.is_empty() {
                listeners.remove(event);
            }
        }
    }
}

impl PartialEq for System {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for System {}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("id", &self.inner.id)
            .field("signature", &self.inner.signature)
            .field("frequency", &self.inner.frequency)
            .finish()
    }
}
