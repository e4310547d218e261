//! # pulse_ecs
//!
//! A minimal dynamic entity-component-system runtime. Entities are opaque
//! identities owning ordered lists of dynamically-registered component
//! instances; systems are behaviors matched against required-kind
//! signatures; the [`World`] owns both, keeps the entity→system matching
//! index consistent through change notifications, and drives the frame
//! update with per-system frequency throttling and scaled game time.
//!
//! This crate provides:
//!
//! - [`Kind`] — dynamic component-type registration with default field
//!   mappings, in two flavors ([`Kind::register`], [`Kind::from_fields`]).
//! - [`Component`] — one attached field-map value of a kind.
//! - [`Entity`] — an identity with per-kind instance lists and change
//!   subscribers.
//! - [`System`] — signature, frequency cap, lifecycle hooks, and event
//!   listeners.
//! - [`World`] — the owner/scheduler: matching index, frame update loop,
//!   queries, and event broadcast.
//! - [`LazyIterator`] — the cached pull-based sequence behind queries.
//!
//! The runtime is single-threaded by design: hooks run synchronously on
//! the caller's thread, and one `update()` runs to completion before the
//! next begins.

pub mod clock;
pub mod component;
pub mod entity;
pub mod error;
pub mod iter;
mod sequence;
pub mod system;
pub mod world;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use component::{Component, FieldMap, InstanceId, Kind, KindId};
pub use entity::{Entity, EntityId, Subscription};
pub use error::EcsError;
pub use iter::LazyIterator;
pub use system::{Signature, System, SystemId};
pub use world::World;
