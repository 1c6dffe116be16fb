//! Models: observable attribute holders with change tracking.
//!
//! A [`Model`] stores one value per attribute declared on its
//! [`ModelClass`]. Every write goes through the attribute's pipeline
//! (`before_set`, the optional set hook, `after_set`) and is recorded only if
//! the attribute judges the result different from what is stored. The first
//! uncommitted change to an attribute captures its previous value, so
//! [`rollback`](Model::rollback) can restore it and
//! [`get_changes`](Model::get_changes) can report it.
//!
//! # Events
//!
//! | Event | Arguments |
//! |-------|-----------|
//! | `change:<attr>` | model, new value, old value |
//! | `change` | model, attribute name, new value, old value |
//! | `idchange` | model, new id, old id |
//! | `commit`, `rollback` | model |
//! | `load`, `save` | model |
//! | `beforedestroy`, `destroy` | model |
//!
//! # Example
//!
//! ```
//! use horizon_data::{Attribute, ModelClass, Value};
//!
//! let class = ModelClass::builder("Note")
//!     .attribute("id")
//!     .attribute(Attribute::string("title").default_value("untitled"))
//!     .build()
//!     .unwrap();
//!
//! let note = class.new_model(Value::Undefined).unwrap();
//! assert_eq!(note.get("title").unwrap(), Value::from("untitled"));
//! assert!(!note.is_dirty());
//!
//! note.set("title", "groceries").unwrap();
//! assert!(note.is_modified("title"));
//! note.rollback();
//! assert_eq!(note.get("title").unwrap(), Value::from("untitled"));
//! ```

mod cache;
mod class;
mod persist;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::attribute::{Attribute, SetOutcome, nested_is_modified};
use crate::convert::{self, ConvertOptions, NativeObject};
use crate::error::{DataError, Result};
use crate::logging::targets;
use crate::observable::{Event, EventName, HandlerResult, ListenerId, Observable};
use crate::value::Value;

pub use class::{InitHook, ModelClass, ModelClassBuilder};
pub use persist::PersistOptions;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a model or collection instance.
///
/// Assigned at construction and never reused. Unlike the persistence id it
/// exists from the start and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Subscription of a parent model to an embedded child.
struct EmbeddedLink {
    source: Observable,
    listener: ListenerId,
}

#[derive(Default)]
struct ModelState {
    data: HashMap<String, Value>,
    /// Rollback targets. `Undefined` means the attribute had no value.
    modified: HashMap<String, Value>,
    dirty: bool,
    destroyed: bool,
    loading: bool,
    saving: bool,
    /// Set while commit or rollback walks embedded children.
    cascading: bool,
    links: HashMap<String, EmbeddedLink>,
}

pub(crate) struct ModelInner {
    client_id: ClientId,
    class: ModelClass,
    observable: Observable,
    state: Mutex<ModelState>,
}

impl Drop for ModelInner {
    fn drop(&mut self) {
        for (_, link) in self.state.get_mut().links.drain() {
            link.source.remove_listener(link.listener);
        }
    }
}

/// An instance of a [`ModelClass`].
///
/// `Model` is a cheap, clonable handle; clones refer to the same instance.
/// State is guarded by a `parking_lot::Mutex` that is never held while hooks
/// or listeners run.
#[derive(Clone)]
pub struct Model {
    pub(crate) inner: Arc<ModelInner>,
}

impl Model {
    /// Construct an instance of `class`.
    ///
    /// `data` must be an object, or `Undefined`/`Null` for no data. Every
    /// declared attribute present in `data`, or else having a default, is
    /// set through the normal pipeline; the instance then starts clean.
    /// Keys that are not declared attributes are an error.
    pub fn new(class: &ModelClass, data: impl Into<Value>) -> Result<Model> {
        let mut data = match data.into() {
            Value::Object(map) => map,
            Value::Undefined | Value::Null => Default::default(),
            other => {
                return Err(DataError::type_mismatch(
                    class.name(),
                    "an object",
                    other.type_name(),
                ));
            }
        };
        if let Some(unknown) = data.keys().find(|key| !class.has_attribute(key)) {
            return Err(DataError::unknown_attribute(class.name(), unknown.as_str()));
        }

        let observable = Observable::new();
        observable.add_events([
            EventName::Change,
            EventName::Commit,
            EventName::Rollback,
            EventName::IdChange,
            EventName::Load,
            EventName::Save,
            EventName::BeforeDestroy,
            EventName::Destroy,
        ]);
        let model = Model {
            inner: Arc::new(ModelInner {
                client_id: ClientId::next(),
                class: class.clone(),
                observable,
                state: Mutex::new(ModelState::default()),
            }),
        };

        for attribute in class.attributes() {
            let initial = data
                .remove(attribute.name())
                .or_else(|| attribute.default_value());
            if let Some(value) = initial {
                model.set_attribute(attribute, value)?;
            }
        }
        model.clear_modifications();

        tracing::trace!(target: targets::MODEL, class = class.name(), client_id = %model.client_id(), "constructed model");

        if let Some(hook) = class.init_hook() {
            hook(&model);
        }
        Ok(model)
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub fn client_id(&self) -> ClientId {
        self.inner.client_id
    }

    pub fn class(&self) -> &ModelClass {
        &self.inner.class
    }

    /// The event hub of this model.
    pub fn observable(&self) -> &Observable {
        &self.inner.observable
    }

    /// Whether two handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<ModelInner>) -> Option<Model> {
        weak.upgrade().map(|inner| Model { inner })
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.class().has_attribute(name)
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.class().attribute_names()
    }

    fn attribute(&self, name: &str) -> Result<&Attribute> {
        self.class()
            .attribute(name)
            .ok_or_else(|| DataError::unknown_attribute(self.class().name(), name))
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// The value of `name`, through its `get` hook.
    pub fn get(&self, name: &str) -> Result<Value> {
        let attribute = self.attribute(name)?;
        Ok(self.read_attribute(attribute, false))
    }

    /// The value of `name`, through its `raw` hook.
    ///
    /// Without a `raw` hook this is the stored value; the `get` hook is not
    /// consulted.
    pub fn raw(&self, name: &str) -> Result<Value> {
        let attribute = self.attribute(name)?;
        Ok(self.read_attribute(attribute, true))
    }

    pub(crate) fn read_attribute(&self, attribute: &Attribute, raw: bool) -> Value {
        let stored = self.stored(attribute.name());
        if raw {
            attribute.raw(self, &stored)
        } else {
            attribute.get(self, &stored)
        }
    }

    fn stored(&self, name: &str) -> Value {
        self.inner
            .state
            .lock()
            .data
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Set one attribute.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let attribute = self.attribute(name)?.clone();
        self.set_attribute(&attribute, value.into())
    }

    /// Set every key of an object, in key order.
    ///
    /// Each key is applied on its own, so hooks of later keys observe the
    /// effect of earlier ones. Stops at the first error; keys applied before
    /// it stay applied.
    pub fn set_many(&self, values: impl Into<Value>) -> Result<()> {
        match values.into() {
            Value::Object(map) => {
                for (name, value) in map {
                    self.set(&name, value)?;
                }
                Ok(())
            }
            other => Err(DataError::type_mismatch(
                self.class().name(),
                "an object",
                other.type_name(),
            )),
        }
    }

    fn set_attribute(&self, attribute: &Attribute, value: Value) -> Result<()> {
        let name = attribute.name();
        let (old, had_value) = {
            let state = self.inner.state.lock();
            match state.data.get(name) {
                Some(old) => (old.clone(), true),
                None => (Value::Undefined, false),
            }
        };

        let value = attribute.before_set(self, &old, value)?;
        let value = match attribute.apply_set_hook(self, value.clone(), &old) {
            None => value,
            Some(SetOutcome::Store(value)) => value,
            Some(SetOutcome::Notify) => {
                let current = self.read_attribute(attribute, false);
                let previous = attribute.get(self, &old);
                self.fire_change(attribute, current, previous);
                return Ok(());
            }
        };
        let value = attribute.after_set(self, value)?;

        if had_value && attribute.values_are_equal(&old, &value) {
            return Ok(());
        }

        {
            let mut state = self.inner.state.lock();
            if !state.modified.contains_key(name) {
                state.modified.insert(name.to_string(), old.clone());
            }
            state.data.insert(name.to_string(), value.clone());
            state.dirty = true;
        }
        tracing::trace!(target: targets::MODEL, client_id = %self.client_id(), attribute = name, "attribute changed");

        if attribute.is_embedded() {
            self.relink_embedded(attribute, &value);
        }
        let current = attribute.get(self, &value);
        let previous = attribute.get(self, &old);
        if name == self.class().id_attribute_name() {
            self.update_identity(&old, &value);
            self.emit(
                EventName::IdChange,
                vec![current.clone(), previous.clone()],
            );
        }
        self.fire_change(attribute, current, previous);
        Ok(())
    }

    fn fire_change(&self, attribute: &Attribute, current: Value, previous: Value) {
        let name = attribute.name();
        self.emit(
            EventName::attribute_change(name),
            vec![current.clone(), previous.clone()],
        );
        self.emit(
            EventName::Change,
            vec![Value::from(name), current, previous],
        );
    }

    fn update_identity(&self, old: &Value, new: &Value) {
        if let Some(key) = old.id_key() {
            cache::unregister(self, &key);
        }
        if let Some(key) = new.id_key() {
            cache::register(self, &key);
        }
    }

    /// Fire `name` with this model prepended to `args`.
    fn emit(&self, name: EventName, mut args: Vec<Value>) -> bool {
        args.insert(0, Value::from(self));
        self.inner.observable.fire_event(name, args)
    }

    // =========================================================================
    // Embedded children
    // =========================================================================

    /// Subscribe to the embedded child now stored under `attribute`, dropping
    /// the subscription to the previous one.
    fn relink_embedded(&self, attribute: &Attribute, value: &Value) {
        let name = attribute.name().to_string();
        let previous = self.inner.state.lock().links.remove(&name);
        if let Some(link) = previous {
            link.source.remove_listener(link.listener);
        }

        let (source, filter_members) = match value {
            Value::Model(child) => (child.observable().clone(), false),
            Value::Collection(child) => (child.observable().clone(), true),
            _ => return,
        };
        let parent = self.downgrade();
        let propagating = AtomicBool::new(false);
        let attribute_name = name.clone();
        let handler = move |event: &Event| {
            if filter_members
                && !matches!(
                    event.name,
                    EventName::Add | EventName::Remove | EventName::Change
                )
            {
                return HandlerResult::Continue;
            }
            let Some(parent) = Model::from_weak(&parent) else {
                return HandlerResult::Continue;
            };
            // Two models embedding each other would otherwise recurse.
            if propagating.swap(true, Ordering::AcqRel) {
                return HandlerResult::Continue;
            }
            parent.propagate_child_change(&attribute_name);
            propagating.store(false, Ordering::Release);
            HandlerResult::Continue
        };
        let listener = if filter_members {
            source.add_listener(EventName::All, handler)
        } else {
            source.add_listener(EventName::Change, handler)
        };
        self.inner
            .state
            .lock()
            .links
            .insert(name, EmbeddedLink { source, listener });
    }

    fn propagate_child_change(&self, name: &str) {
        let Some(attribute) = self.class().attribute(name) else {
            return;
        };
        tracing::trace!(target: targets::MODEL, client_id = %self.client_id(), attribute = name, "embedded child changed");
        let current = self.read_attribute(attribute, false);
        self.fire_change(attribute, current.clone(), current);
    }

    /// Embedded child values, for cascading commit and rollback.
    fn embedded_children(&self, state: &ModelState) -> Vec<Value> {
        self.class()
            .attributes()
            .iter()
            .filter(|attribute| attribute.is_embedded())
            .filter_map(|attribute| state.data.get(attribute.name()))
            .filter(|value| matches!(value, Value::Model(_) | Value::Collection(_)))
            .cloned()
            .collect()
    }

    // =========================================================================
    // Change tracking
    // =========================================================================

    /// Whether any attribute changed since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// Whether `name` changed since the last commit.
    ///
    /// For embedded attributes this also reports changes inside the child.
    pub fn is_modified(&self, name: &str) -> bool {
        let (recorded, stored) = {
            let state = self.inner.state.lock();
            (
                state.modified.contains_key(name),
                state.data.get(name).cloned(),
            )
        };
        if recorded {
            return true;
        }
        let embedded = self
            .class()
            .attribute(name)
            .is_some_and(Attribute::is_embedded);
        embedded && stored.as_ref().is_some_and(nested_is_modified)
    }

    /// Names of the attributes changed since the last commit, in declaration
    /// order.
    ///
    /// Embedded attributes are included when the child itself has changes.
    pub fn changed_attribute_names(&self) -> Vec<String> {
        let candidates: Vec<(String, bool, Option<Value>)> = {
            let state = self.inner.state.lock();
            self.class()
                .attributes()
                .iter()
                .map(|attribute| {
                    let name = attribute.name();
                    let recorded = state.modified.contains_key(name);
                    let child = (!recorded && attribute.is_embedded())
                        .then(|| state.data.get(name).cloned())
                        .flatten();
                    (name.to_string(), recorded, child)
                })
                .collect()
        };
        // Children are inspected without holding this model's lock.
        candidates
            .into_iter()
            .filter(|(_, recorded, child)| {
                *recorded || child.as_ref().is_some_and(nested_is_modified)
            })
            .map(|(name, _, _)| name)
            .collect()
    }

    /// A plain copy of the attribute values.
    pub fn get_data(&self, options: &ConvertOptions) -> NativeObject {
        convert::convert_model(self, options)
    }

    /// Like [`get_data`](Self::get_data), restricted to changed attributes.
    pub fn get_changes(&self, options: &ConvertOptions) -> NativeObject {
        let changed = self.changed_attribute_names();
        let names: Vec<String> = match &options.attribute_names {
            Some(requested) => changed
                .into_iter()
                .filter(|name| requested.contains(name))
                .collect(),
            None => changed,
        };
        convert::convert_model(self, &options.clone().with_attribute_names(names))
    }

    /// Accept the current values as the new baseline and fire `commit`.
    ///
    /// Embedded children are committed too.
    pub fn commit(&self) {
        let children = {
            let mut state = self.inner.state.lock();
            if state.cascading {
                return;
            }
            state.cascading = true;
            state.modified.clear();
            state.dirty = false;
            self.embedded_children(&state)
        };
        for child in &children {
            match child {
                Value::Model(model) => model.commit(),
                Value::Collection(collection) => collection.commit(),
                _ => {}
            }
        }
        self.inner.state.lock().cascading = false;
        tracing::trace!(target: targets::MODEL, client_id = %self.client_id(), "committed");
        self.emit(EventName::Commit, Vec::new());
    }

    fn clear_modifications(&self) {
        let mut state = self.inner.state.lock();
        state.modified.clear();
        state.dirty = false;
    }

    /// Restore every changed attribute to its value at the last commit and
    /// fire `rollback`.
    ///
    /// No change events fire for the restored attributes. Embedded child
    /// models are rolled back too; collection membership is not restored.
    pub fn rollback(&self) {
        let (restored, children) = {
            let mut state = self.inner.state.lock();
            if state.cascading {
                return;
            }
            state.cascading = true;
            let targets: Vec<(String, Value)> = state.modified.drain().collect();
            let mut restored = Vec::with_capacity(targets.len());
            for (name, target) in targets {
                let replaced = if target.is_undefined() {
                    state.data.remove(&name)
                } else {
                    state.data.insert(name.clone(), target)
                };
                restored.push((name, replaced.unwrap_or_default()));
            }
            state.dirty = false;
            (restored, self.embedded_children(&state))
        };

        for (name, replaced) in &restored {
            let Some(attribute) = self.class().attribute(name) else {
                continue;
            };
            if attribute.is_embedded() {
                let value = self.stored(name);
                self.relink_embedded(attribute, &value);
            }
            if name == self.class().id_attribute_name() {
                let value = self.stored(name);
                self.update_identity(replaced, &value);
            }
        }
        for child in &children {
            if let Value::Model(model) = child {
                model.rollback();
            }
        }
        self.inner.state.lock().cascading = false;
        tracing::trace!(target: targets::MODEL, client_id = %self.client_id(), restored = restored.len(), "rolled back");
        self.emit(EventName::Rollback, Vec::new());
    }

    // =========================================================================
    // Persistence identity
    // =========================================================================

    /// The value of the id attribute, `Undefined` when unset.
    ///
    /// Fails when the class does not declare its id attribute.
    pub fn get_id(&self) -> Result<Value> {
        match self.class().id_attribute() {
            Some(attribute) => Ok(self.read_attribute(attribute, false)),
            None => Err(DataError::MissingIdAttribute {
                model: self.class().name().to_string(),
                attribute: self.id_attribute_name().to_string(),
            }),
        }
    }

    pub fn has_id_attribute(&self) -> bool {
        self.class().id_attribute().is_some()
    }

    pub fn id_attribute_name(&self) -> &str {
        self.class().id_attribute_name()
    }

    /// Whether the model has no usable id yet.
    pub fn is_new(&self) -> bool {
        self.get_id()
            .map(|id| id.id_key().is_none())
            .unwrap_or(true)
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    pub fn is_saving(&self) -> bool {
        self.inner.state.lock().saving
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Listen to an event of this model.
    pub fn on<F, R>(&self, name: impl Into<EventName>, handler: F) -> ListenerId
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<HandlerResult>,
    {
        self.inner.observable.add_listener(name, handler)
    }

    /// Fire an event with this model as the first argument.
    pub fn fire_event(&self, name: impl Into<EventName>, args: Vec<Value>) -> bool {
        self.emit(name.into(), args)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Model")
            .field("class", &self.class().name())
            .field("client_id", &self.inner.client_id)
            .field("dirty", &state.dirty)
            .field("modified", &state.modified.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Model: Send, Sync);
