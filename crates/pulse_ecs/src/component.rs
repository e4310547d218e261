//! Component kinds and instances.
//!
//! A *kind* is a dynamically registered component type: an integer identity
//! plus a default field mapping used as the template for new instances. An
//! *instance* is one attached value of a kind — a field map initialised from
//! the kind's defaults and overridden by constructor arguments, plus a
//! free-form `attr` map for runtime-only metadata.
//!
//! Kinds are registered in two flavors with the identical contract:
//!
//! - [`Kind::register`] wraps an existing Rust value template — the
//!   serialised `Default` of the type becomes the field defaults.
//! - [`Kind::from_fields`] takes the default field mapping directly.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::entity::Entity;
use crate::error::{json_type_name, EcsError};
use crate::sequence;

/// A unique identifier for a component kind, assigned monotonically at
/// registration time and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KindId(pub u64);

/// A unique identifier for one component instance.
///
/// Instance identity is what makes idempotent attach/detach well defined:
/// two instances of the same kind with equal field values are still
/// distinct, while re-adding the same instance is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

/// A JSON field mapping, the payload shape of every component instance.
pub type FieldMap = serde_json::Map<String, Value>;

struct KindInner {
    id: KindId,
    name: String,
    defaults: FieldMap,
}

/// A registration handle for one component kind.
///
/// Cheap to clone; all clones refer to the same registered kind.
#[derive(Clone)]
pub struct Kind {
    inner: Rc<KindInner>,
}

impl Kind {
    fn new(name: String, defaults: FieldMap) -> Self {
        let id = sequence::next_kind_id();
        debug!(kind = id.0, name = %name, "component kind registered");
        Self {
            inner: Rc::new(KindInner { id, name, defaults }),
        }
    }

    /// Register a kind from an existing value template.
    ///
    /// `T::default()` is serialised to a JSON object whose fields become
    /// the defaults for new instances.
    ///
    /// # Errors
    ///
    /// Fails if `T` cannot be serialised, or serialises to something other
    /// than a JSON object.
    pub fn register<T: Serialize + Default>() -> Result<Self, EcsError> {
        let defaults = match serde_json::to_value(T::default())? {
            Value::Object(defaults) => defaults,
            other => {
                return Err(EcsError::InvalidDefaults {
                    found: json_type_name(&other),
                })
            }
        };
        let name = std::any::type_name::<T>()
            .rsplit("::")
            .next()
            .unwrap_or("unnamed")
            .to_string();
        Ok(Self::new(name, defaults))
    }

    /// Register a kind from an explicit default field mapping.
    ///
    /// # Errors
    ///
    /// Fails unless `fields` is a JSON object.
    pub fn from_fields(fields: Value) -> Result<Self, EcsError> {
        let defaults = match fields {
            Value::Object(defaults) => defaults,
            other => {
                return Err(EcsError::InvalidDefaults {
                    found: json_type_name(&other),
                })
            }
        };
        Ok(Self::new("unnamed".to_string(), defaults))
    }

    /// The integer identity of this kind.
    #[must_use]
    pub fn id(&self) -> KindId {
        self.inner.id
    }

    /// The registration name (the template type's name, or `"unnamed"`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The default field mapping applied to new instances.
    #[must_use]
    pub fn defaults(&self) -> &FieldMap {
        &self.inner.defaults
    }

    /// Construct a detached instance: defaults merged with `overrides`
    /// (overrides win, and may introduce fields absent from the defaults).
    ///
    /// # Errors
    ///
    /// Fails unless `overrides` is a JSON object.
    pub fn instance(&self, overrides: Value) -> Result<Component, EcsError> {
        let overrides = match overrides {
            Value::Object(overrides) => overrides,
            other => {
                return Err(EcsError::InvalidOverrides {
                    found: json_type_name(&other),
                })
            }
        };
        let mut data = self.inner.defaults.clone();
        for (field, value) in overrides {
            data.insert(field, value);
        }
        Ok(Component {
            inner: Rc::new(ComponentInner {
                id: sequence::next_instance_id(),
                kind: self.inner.id,
                data: RefCell::new(data),
                attr: RefCell::new(FieldMap::new()),
            }),
        })
    }

    /// All instances of this kind on `entity`, in attachment order.
    /// Empty if none.
    #[must_use]
    pub fn all_from(&self, entity: &Entity) -> Vec<Component> {
        entity.components_of(self.inner.id)
    }

    /// The first instance of this kind on `entity`, if any.
    #[must_use]
    pub fn one_from(&self, entity: &Entity) -> Option<Component> {
        entity.components_of(self.inner.id).into_iter().next()
    }

    /// Construct an instance and attach it to `entity`, notifying the
    /// entity's subscribers with the added instance.
    ///
    /// # Errors
    ///
    /// Fails unless `overrides` is a JSON object.
    pub fn add(&self, entity: &Entity, overrides: Value) -> Result<Component, EcsError> {
        let component = self.instance(overrides)?;
        entity.add(&component);
        Ok(component)
    }

    /// Detach an instance from `entity` if present; a no-op otherwise.
    pub fn remove(&self, entity: &Entity, component: &Component) {
        entity.remove(component);
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kind")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

struct ComponentInner {
    id: InstanceId,
    kind: KindId,
    data: RefCell<FieldMap>,
    attr: RefCell<FieldMap>,
}

/// One attached (or attachable) value of a component kind.
///
/// Cheap to clone; all clones refer to the same instance, and instance
/// identity — not field equality — decides attach/detach idempotence. An
/// instance is owned by at most one entity's per-kind list at a time; it
/// can be re-added elsewhere only after being removed.
#[derive(Clone)]
pub struct Component {
    inner: Rc<ComponentInner>,
}

impl Component {
    /// The unique identity of this instance.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.inner.id
    }

    /// The kind this instance belongs to.
    #[must_use]
    pub fn kind(&self) -> KindId {
        self.inner.kind
    }

    /// Read one data field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        self.inner.data.borrow().get(field).cloned()
    }

    /// Read one data field as an `f64`.
    #[must_use]
    pub fn number(&self, field: &str) -> Option<f64> {
        self.inner.data.borrow().get(field).and_then(Value::as_f64)
    }

    /// Write one data field.
    pub fn set(&self, field: &str, value: impl Into<Value>) {
        self.inner
            .data
            .borrow_mut()
            .insert(field.to_string(), value.into());
    }

    /// Snapshot of the full field mapping.
    #[must_use]
    pub fn fields(&self) -> FieldMap {
        self.inner.data.borrow().clone()
    }

    /// Read one runtime-only attribute, if present.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<Value> {
        self.inner.attr.borrow().get(key).cloned()
    }

    /// Write one runtime-only attribute. Attributes never participate in
    /// defaults or field merging.
    pub fn set_attr(&self, key: &str, value: impl Into<Value>) {
        self.inner
            .attr
            .borrow_mut()
            .insert(key.to_string(), value.into());
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Component {}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("data", &*self.inner.data.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize)]
    struct Health {
        current: f64,
        max: f64,
    }

    impl Default for Health {
        fn default() -> Self {
            Self {
                current: 100.0,
                max: 100.0,
            }
        }
    }

    #[test]
    fn test_registrations_never_share_an_identity() {
        let a = Kind::register::<Health>().unwrap();
        let b = Kind::register::<Health>().unwrap();
        let c = Kind::from_fields(json!({ "x": 0.0 })).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
    }

    #[test]
    fn test_register_takes_defaults_from_template() {
        let health = Kind::register::<Health>().unwrap();
        assert_eq!(health.name(), "Health");
        let instance = health.instance(json!({})).unwrap();
        assert_eq!(instance.number("current"), Some(100.0));
        assert_eq!(instance.number("max"), Some(100.0));
    }

    #[test]
    fn test_overrides_win_over_defaults() {
        let health = Kind::register::<Health>().unwrap();
        let instance = health.instance(json!({ "current": 25.0 })).unwrap();
        assert_eq!(instance.number("current"), Some(25.0));
        assert_eq!(instance.number("max"), Some(100.0));
    }

    #[test]
    fn test_overrides_may_introduce_new_fields() {
        let kind = Kind::from_fields(json!({ "x": 0.0 })).unwrap();
        let instance = kind.instance(json!({ "tag": "boss" })).unwrap();
        assert_eq!(instance.number("x"), Some(0.0));
        assert_eq!(instance.get("tag"), Some(json!("boss")));
    }

    #[test]
    fn test_registration_flavors_share_the_contract() {
        let by_template = Kind::register::<Health>().unwrap();
        let by_fields = Kind::from_fields(json!({ "current": 100.0, "max": 100.0 })).unwrap();

        for kind in [&by_template, &by_fields] {
            let entity = Entity::new();
            assert!(kind.all_from(&entity).is_empty());
            assert!(kind.one_from(&entity).is_none());

            let attached = kind.add(&entity, json!({ "current": 50.0 })).unwrap();
            assert_eq!(kind.all_from(&entity).len(), 1);
            assert_eq!(kind.one_from(&entity).unwrap(), attached);
            assert_eq!(attached.number("current"), Some(50.0));

            kind.remove(&entity, &attached);
            assert!(kind.one_from(&entity).is_none());
        }
    }

    #[test]
    fn test_equal_values_are_distinct_instances() {
        let kind = Kind::from_fields(json!({ "x": 1.0 })).unwrap();
        let a = kind.instance(json!({})).unwrap();
        let b = kind.instance(json!({})).unwrap();
        assert_eq!(a.fields(), b.fields());
        assert_ne!(a, b);
    }

    #[test]
    fn test_attr_is_separate_from_data() {
        let kind = Kind::from_fields(json!({ "x": 1.0 })).unwrap();
        let instance = kind.instance(json!({})).unwrap();
        instance.set_attr("node", 42);
        assert_eq!(instance.attr("node"), Some(json!(42)));
        assert_eq!(instance.get("node"), None);
    }

    #[test]
    fn test_non_object_defaults_are_rejected() {
        let err = Kind::from_fields(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, EcsError::InvalidDefaults { found: "array" }));
    }

    #[test]
    fn test_non_object_overrides_are_rejected() {
        let kind = Kind::from_fields(json!({ "x": 0.0 })).unwrap();
        let err = kind.instance(json!(7)).unwrap_err();
        assert!(matches!(err, EcsError::InvalidOverrides { found: "number" }));
    }

    #[test]
    fn test_remove_foreign_instance_is_a_noop() {
        let position = Kind::from_fields(json!({ "x": 0.0 })).unwrap();
        let velocity = Kind::from_fields(json!({ "x": 0.0 })).unwrap();
        let entity = Entity::new();
        let pos = position.add(&entity, json!({})).unwrap();
        let stray = velocity.instance(json!({})).unwrap();

        position.remove(&entity, &stray);
        assert_eq!(position.all_from(&entity), vec![pos]);
    }
}
