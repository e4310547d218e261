//! The world: owner and scheduler of all entities and systems.
//!
//! The world keeps three indices keyed by entity: the systems currently
//! matching it, and the per-(entity, system) real/game timestamps used for
//! frequency throttling. Membership transitions are driven incrementally by
//! entity change notifications rather than per-frame rescans.
//!
//! Everything runs on one logical thread: hooks execute synchronously, and
//! internal state is only borrowed between hook invocations, so hooks are
//! free to add and remove entities, systems, and components mid-frame.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::clock::{Clock, MonotonicClock};
use crate::component::Component;
use crate::entity::{Entity, EntityId, Subscription};
use crate::iter::LazyIterator;
use crate::system::{Signature, System, SystemId};

/// Last-invocation timestamps for one (entity, system) pair. Exists iff
/// the pair is currently in the matching index.
#[derive(Debug, Clone, Copy)]
struct Stamp {
    real: f64,
    game: f64,
}

struct WorldState {
    entities: Vec<Entity>,
    systems: Vec<System>,
    /// Matching index: systems currently applying to each entity.
    matching: HashMap<EntityId, Vec<System>>,
    /// Throttling state per (entity, system) pair.
    stamps: HashMap<EntityId, HashMap<SystemId, Stamp>>,
    /// Change-notification subscriptions held on live entities.
    subscriptions: HashMap<EntityId, Subscription>,
    clock: Rc<dyn Clock>,
    time_scale: f64,
    last_frame: f64,
    game_time: f64,
}

/// The owner and scheduler of all entities and systems.
///
/// Cheap to clone; all clones refer to the same world. Hooks receive a
/// world handle and may call any public operation on it.
#[derive(Clone)]
pub struct World {
    state: Rc<RefCell<WorldState>>,
}

impl World {
    /// Create a world driven by wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Rc::new(MonotonicClock::new()))
    }

    /// Create a world reading real time from the given clock.
    #[must_use]
    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        let last_frame = clock.now_ms();
        Self {
            state: Rc::new(RefCell::new(WorldState {
                entities: Vec::new(),
                systems: Vec::new(),
                matching: HashMap::new(),
                stamps: HashMap::new(),
                subscriptions: HashMap::new(),
                clock,
                time_scale: 1.0,
                last_frame,
                game_time: 0.0,
            })),
        }
    }

    /// The scaled game-time accumulator, in milliseconds.
    #[must_use]
    pub fn game_time(&self) -> f64 {
        self.state.borrow().game_time
    }

    /// The factor applied to real elapsed time when advancing game time.
    #[must_use]
    pub fn time_scale(&self) -> f64 {
        self.state.borrow().time_scale
    }

    /// Set the game-time scale factor.
    pub fn set_time_scale(&self, time_scale: f64) {
        self.state.borrow_mut().time_scale = time_scale;
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.state.borrow().entities.len()
    }

    /// Number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.state.borrow().systems.len()
    }

    /// Look up a live entity by id.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<Entity> {
        self.state
            .borrow()
            .entities
            .iter()
            .find(|e| e.id() == id)
            .cloned()
    }

    /// The systems currently matching an entity, in match order.
    #[must_use]
    pub fn matching_systems(&self, id: EntityId) -> Vec<System> {
        self.state
            .borrow()
            .matching
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    fn contains_entity(&self, id: EntityId) -> bool {
        self.state.borrow().matching.contains_key(&id)
    }

    /// Register an entity, subscribe to its change notifications, and
    /// evaluate it against every current system. A no-op if the entity is
    /// already present.
    pub fn add_entity(&self, entity: &Entity) {
        let id = entity.id();
        let stale = {
            let mut state = self.state.borrow_mut();
            if state.entities.iter().any(|e| e.id() == id) {
                return;
            }
            state.entities.push(entity.clone());
            state.matching.insert(id, Vec::new());
            state.stamps.insert(id, HashMap::new());
            state.subscriptions.remove(&id)
        };
        // A stale subscription can only exist if the same entity was
        // previously removed without its capability being dropped; replace
        // it so the world is notified exactly once per mutation.
        if let Some(stale) = stale {
            stale.cancel();
        }

        let weak = Rc::downgrade(&self.state);
        let subscription = entity.subscribe(move |entity, added, removed| {
            if let Some(state) = weak.upgrade() {
                World { state }.on_entity_event(entity, added, removed);
            }
        });
        self.state.borrow_mut().subscriptions.insert(id, subscription);

        debug!(entity = id.0, "entity added");
        self.reindex_entity(entity);
    }

    /// Remove an entity: release its change subscription, fire `exit` on
    /// every system it matches, and delete its bookkeeping. A no-op if the
    /// entity is not present.
    pub fn remove_entity(&self, entity: &Entity) {
        self.remove_entity_by_id(entity.id());
    }

    /// Remove an entity by id. A no-op if not found.
    pub fn remove_entity_by_id(&self, id: EntityId) {
        let (entity, matched, subscription) = {
            let mut state = self.state.borrow_mut();
            let Some(position) = state.entities.iter().position(|e| e.id() == id) else {
                return;
            };
            let entity = state.entities.remove(position);
            let matched = state.matching.remove(&id).unwrap_or_default();
            state.stamps.remove(&id);
            let subscription = state.subscriptions.remove(&id);
            (entity, matched, subscription)
        };
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        debug!(entity = id.0, "entity removed");
        for system in matched {
            trace!(entity = id.0, system = system.id().0, "match exit");
            system.run_exit(self, &entity);
        }
    }

    /// Register a system and evaluate every current entity against it,
    /// possibly firing `enter`. A no-op if the system is already present.
    pub fn add_system(&self, system: &System) {
        {
            let mut state = self.state.borrow_mut();
            if state.systems.iter().any(|s| s.id() == system.id()) {
                return;
            }
            state.systems.push(system.clone());
        }
        debug!(system = system.id().0, "system added");
        let entities = self.state.borrow().entities.clone();
        for entity in &entities {
            self.index_pair(entity, system);
        }
    }

    /// Remove a system, firing `exit` for every entity currently matching
    /// it. A no-op if the system is not present.
    pub fn remove_system(&self, system: &System) {
        let affected = {
            let mut state = self.state.borrow_mut();
            let Some(position) = state.systems.iter().position(|s| s.id() == system.id()) else {
                return;
            };
            state.systems.remove(position);

            let mut affected = Vec::new();
            let entities = state.entities.clone();
            for entity in entities {
                let id = entity.id();
                let was_matched = state
                    .matching
                    .get_mut(&id)
                    .map(|list| {
                        let before = list.len();
                        list.retain(|s| s.id() != system.id());
                        list.len() != before
                    })
                    .unwrap_or(false);
                if was_matched {
                    if let Some(stamps) = state.stamps.get_mut(&id) {
                        stamps.remove(&system.id());
                    }
                    affected.push(entity);
                }
            }
            affected
        };
        debug!(system = system.id().0, "system removed");
        for entity in affected {
            trace!(entity = entity.id().0, system = system.id().0, "match exit");
            system.run_exit(self, &entity);
        }
    }

    /// Lazily yield entities in insertion order. The match-all sentinel
    /// yields every entity regardless of the active flag; otherwise only
    /// active entities satisfying every required kind are produced.
    ///
    /// The returned iterator caches produced entities, so consuming it
    /// again replays the identical sequence.
    #[must_use]
    pub fn query(&self, signature: &Signature) -> LazyIterator<Entity> {
        let snapshot = self.state.borrow().entities.clone();
        let signature = signature.clone();
        let mut index = 0;
        LazyIterator::new(move || {
            while index < snapshot.len() {
                let entity = snapshot[index].clone();
                index += 1;
                if signature.is_all() {
                    return Some(entity);
                }
                if entity.active() && signature.matches(&entity) {
                    return Some(entity);
                }
            }
            None
        })
    }

    /// Broadcast a custom event: every system holding listeners for
    /// `event` receives each listener call with the payload and that
    /// system's current query iterator.
    pub fn trigger(&self, event: &str, payload: &Value) {
        let systems = self.state.borrow().systems.clone();
        for system in systems {
            let listeners = system.listeners_for(event);
            if listeners.is_empty() {
                continue;
            }
            trace!(system = system.id().0, event, "event dispatch");
            let matches = self.query(system.signature());
            for listener in listeners {
                {
                    let mut callback = listener.callback.borrow_mut();
                    (&mut *callback)(self, payload, &matches);
                }
                if listener.once {
                    system.remove_listener(event, listener.id);
                }
            }
        }
    }

    /// The frame tick. Advances the scaled game clock, removes entities
    /// found inactive, and runs every due (entity, system) pair.
    ///
    /// The entity list and each entity's matching-system list are walked
    /// as frame-start snapshots: systems added or removed mid-pass do not
    /// retroactively affect this frame, while an entity removed mid-frame
    /// is skipped for its remaining systems.
    pub fn update(&self) {
        let (now, entities) = {
            let mut state = self.state.borrow_mut();
            let now = state.clock.now_ms();
            let delta = now - state.last_frame;
            state.game_time += delta * state.time_scale;
            state.last_frame = now;
            (now, state.entities.clone())
        };
        trace!(
            game_time = self.game_time(),
            entities = entities.len(),
            "frame update"
        );

        // Systems touched this frame, in first-touch order, with the
        // entities they updated.
        let mut touched: Vec<(System, Vec<Entity>)> = Vec::new();

        for entity in &entities {
            if !self.contains_entity(entity.id()) {
                continue;
            }
            if !entity.active() {
                self.remove_entity(entity);
                continue;
            }

            // Snapshots taken at this entity's visit: a system removed (or
            // unmatched) by a hook later in this pass still completes its
            // run over this entity, using the timing state it had when the
            // visit began.
            let systems = self.matching_systems(entity.id());
            let visit_stamps: HashMap<SystemId, Stamp> = self
                .state
                .borrow()
                .stamps
                .get(&entity.id())
                .cloned()
                .unwrap_or_default();

            for system in systems {
                if !self.contains_entity(entity.id()) {
                    break;
                }
                if !system.has_update() {
                    continue;
                }

                let due = {
                    let mut state = self.state.borrow_mut();
                    let game_time = state.game_time;
                    let live = state
                        .stamps
                        .get_mut(&entity.id())
                        .and_then(|stamps| stamps.get_mut(&system.id()));
                    let previous = match &live {
                        Some(stamp) => Some(**stamp),
                        None => visit_stamps.get(&system.id()).copied(),
                    };
                    previous.and_then(|previous| {
                        let mut real_elapsed = now - previous.real;
                        let game_elapsed = game_time - previous.game;
                        let next = if system.frequency() > 0.0 {
                            let interval = 1000.0 / system.frequency();
                            if real_elapsed < interval {
                                return None;
                            }
                            // Carry the remainder forward instead of
                            // resetting to `now`, so irregular frame
                            // timing does not accumulate drift.
                            real_elapsed %= interval;
                            Stamp {
                                real: now - real_elapsed,
                                game: game_time,
                            }
                        } else {
                            Stamp {
                                real: now,
                                game: game_time,
                            }
                        };
                        // Only a still-matching pair keeps timing state.
                        if let Some(stamp) = live {
                            *stamp = next;
                        }
                        Some((game_time, game_elapsed))
                    })
                };
                let Some((game_time, game_elapsed)) = due else {
                    continue;
                };

                match touched.iter_mut().find(|(s, _)| s.id() == system.id()) {
                    Some((_, updated)) => updated.push(entity.clone()),
                    None => {
                        system.run_before_update_all(self, game_time);
                        touched.push((system.clone(), vec![entity.clone()]));
                    }
                }
                system.run_update(self, game_time, game_elapsed, entity);
            }
        }

        let game_time = self.game_time();
        for (system, updated) in touched {
            system.run_after_update_all(self, game_time, &updated);
        }
    }

    /// Remove every entity (firing exits), then every system, leaving the
    /// world empty and inert.
    pub fn destroy(&self) {
        let entities = self.state.borrow().entities.clone();
        for entity in entities {
            self.remove_entity(&entity);
        }
        let systems = self.state.borrow().systems.clone();
        for system in systems {
            self.remove_system(&system);
        }
        debug!("world destroyed");
    }

    /// Entry point for entity change notifications. Component mutations
    /// dispatch `change` against the pre-mutation matching index first,
    /// then reindex; active-flag flips only reindex.
    fn on_entity_event(
        &self,
        entity: &Entity,
        added: Option<&Component>,
        removed: Option<&Component>,
    ) {
        if added.is_some() || removed.is_some() {
            self.dispatch_change(entity, added, removed);
        }
        self.reindex_entity(entity);
    }

    /// Dispatch `change` to every currently-matching system for which the
    /// mutation is signature-relevant. Match-all systems observe every
    /// mutation unfiltered.
    fn dispatch_change(
        &self,
        entity: &Entity,
        added: Option<&Component>,
        removed: Option<&Component>,
    ) {
        let matching = self.matching_systems(entity.id());
        for system in matching {
            if !system.has_change() {
                continue;
            }
            let relevant_added = added.filter(|c| system.signature().is_relevant(c.kind()));
            let relevant_removed = removed.filter(|c| system.signature().is_relevant(c.kind()));
            if relevant_added.is_none() && relevant_removed.is_none() {
                continue;
            }
            system.run_change(self, entity, relevant_added, relevant_removed);
        }
    }

    /// Re-evaluate one entity against every registered system.
    fn reindex_entity(&self, entity: &Entity) {
        let systems = self.state.borrow().systems.clone();
        for system in &systems {
            self.index_pair(entity, system);
        }
    }

    /// Evaluate one (entity, system) pair and apply the unmatched/matched
    /// transition if it changed: entering seeds the timing state to "now"
    /// and fires `enter`; leaving deletes the timing state and fires
    /// `exit`.
    fn index_pair(&self, entity: &Entity, system: &System) {
        enum Transition {
            Enter,
            Exit,
        }

        let id = entity.id();
        let transition = {
            let mut state = self.state.borrow_mut();
            let in_world = state.systems.iter().any(|s| s.id() == system.id());
            let Some(list) = state.matching.get_mut(&id) else {
                // Entity not (or no longer) in this world.
                return;
            };
            let already = list.iter().any(|s| s.id() == system.id());
            let matched = in_world && entity.active() && system.signature().matches(entity);

            if matched && !already {
                list.push(system.clone());
                let now = state.clock.now_ms();
                let game = state.game_time;
                if let Some(stamps) = state.stamps.get_mut(&id) {
                    stamps.insert(system.id(), Stamp { real: now, game });
                }
                Some(Transition::Enter)
            } else if !matched && already {
                list.retain(|s| s.id() != system.id());
                if let Some(stamps) = state.stamps.get_mut(&id) {
                    stamps.remove(&system.id());
                }
                Some(Transition::Exit)
            } else {
                None
            }
        };

        match transition {
            Some(Transition::Enter) => {
                trace!(entity = id.0, system = system.id().0, "match enter");
                system.run_enter(self, entity);
            }
            Some(Transition::Exit) => {
                trace!(entity = id.0, system = system.id().0, "match exit");
                system.run_exit(self, entity);
            }
            None => {}
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
