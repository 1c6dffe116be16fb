//! Ordered, indexed sets of models.
//!
//! A [`Collection`] holds models in order, indexed by client id and, once
//! they have one, by persistence id. It relays every event of its members:
//! a member firing `e` with `(model, args...)` makes the collection fire `e`
//! with `(collection, model, args...)`. The relay exists exactly while the
//! model is a member.
//!
//! A member that is destroyed leaves every collection holding it when it
//! fires `beforedestroy`, so its `destroy` event is never relayed.
//!
//! # Example
//!
//! ```
//! use horizon_data::{Collection, CollectionClass, ModelClass, Value};
//!
//! let item = ModelClass::builder("Item").attributes(["id", "label"]).build().unwrap();
//! let items = CollectionClass::builder("Items").model_class(&item).build();
//!
//! let collection = Collection::new(&items);
//! let added = collection
//!     .add(Value::array([
//!         Value::object([("id", Value::from(1)), ("label", Value::from("a"))]),
//!         Value::object([("id", Value::from(2)), ("label", Value::from("b"))]),
//!     ]))
//!     .unwrap();
//!
//! assert_eq!(collection.get_count(), 2);
//! assert!(collection.get_by_id(2).unwrap().ptr_eq(&added[1]));
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::convert::{self, ConvertOptions, NativeArray};
use crate::error::{DataError, Result};
use crate::logging::targets;
use crate::model::{ClientId, Model, ModelClass};
use crate::observable::{Event, EventName, HandlerResult, ListenerId, Observable};
use crate::value::Value;

/// Orders members of a sorted collection.
pub type Comparator = Arc<dyn Fn(&Model, &Model) -> CmpOrdering + Send + Sync>;

/// Hook run once at the end of collection construction.
pub type CollectionInitHook = Arc<dyn Fn(&Collection) + Send + Sync>;

static BASE_CLASS: OnceLock<CollectionClass> = OnceLock::new();

struct CollectionClassInner {
    name: String,
    parent: Option<CollectionClass>,
    model_class: Option<ModelClass>,
    sort_by: Option<Comparator>,
    init: Option<CollectionInitHook>,
}

/// A collection type: the model class raw data is instantiated with, an
/// optional ordering and an init hook. Cloning is cheap.
#[derive(Clone)]
pub struct CollectionClass {
    inner: Arc<CollectionClassInner>,
}

impl CollectionClass {
    pub fn builder(name: impl Into<String>) -> CollectionClassBuilder {
        CollectionClassBuilder {
            name: name.into(),
            parent: None,
            model_class: None,
            sort_by: None,
            init: None,
        }
    }

    /// The class used for collections created without one.
    pub fn base() -> CollectionClass {
        BASE_CLASS
            .get_or_init(|| CollectionClass::builder("Collection").build())
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&CollectionClass> {
        self.inner.parent.as_ref()
    }

    /// The class raw member data is instantiated with.
    pub fn model_class(&self) -> Option<&ModelClass> {
        self.inner.model_class.as_ref()
    }

    pub fn is_sorted(&self) -> bool {
        self.inner.sort_by.is_some()
    }

    /// Whether this class is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &CollectionClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.ptr_eq(other) {
                return true;
            }
            current = class.parent();
        }
        false
    }

    pub fn ptr_eq(&self, other: &CollectionClass) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A new collection holding `items`, starting unmodified.
    pub fn create(&self, items: Vec<Value>) -> Result<Collection> {
        let collection = Collection::new(self);
        collection.add(Value::Array(items))?;
        collection.inner.state.lock().modified = false;
        Ok(collection)
    }
}

impl fmt::Debug for CollectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionClass")
            .field("name", &self.inner.name)
            .field("model_class", &self.model_class().map(ModelClass::name))
            .field("sorted", &self.is_sorted())
            .finish()
    }
}

/// Builder for [`CollectionClass`].
pub struct CollectionClassBuilder {
    name: String,
    parent: Option<CollectionClass>,
    model_class: Option<ModelClass>,
    sort_by: Option<Comparator>,
    init: Option<CollectionInitHook>,
}

impl CollectionClassBuilder {
    /// Inherit model class, ordering and init hook from `parent`.
    pub fn extends(mut self, parent: &CollectionClass) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn model_class(mut self, class: &ModelClass) -> Self {
        self.model_class = Some(class.clone());
        self
    }

    /// Keep members ordered by `comparator`. The sort is stable.
    pub fn sort_by<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&Model, &Model) -> CmpOrdering + Send + Sync + 'static,
    {
        self.sort_by = Some(Arc::new(comparator));
        self
    }

    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Collection) + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> CollectionClass {
        let parent = self.parent;
        let model_class = self
            .model_class
            .or_else(|| parent.as_ref().and_then(|p| p.inner.model_class.clone()));
        let sort_by = self
            .sort_by
            .or_else(|| parent.as_ref().and_then(|p| p.inner.sort_by.clone()));
        let init = self
            .init
            .or_else(|| parent.as_ref().and_then(|p| p.inner.init.clone()));
        CollectionClass {
            inner: Arc::new(CollectionClassInner {
                name: self.name,
                parent,
                model_class,
                sort_by,
                init,
            }),
        }
    }
}

/// Listeners a collection keeps on one member.
#[derive(Clone, Copy)]
struct MemberLinks {
    relay: ListenerId,
    id_change: ListenerId,
}

/// A member as indexed by client id. Links are set once the listeners are
/// attached.
struct Member {
    model: Model,
    links: Option<MemberLinks>,
}

#[derive(Default)]
struct CollectionState {
    models: Vec<Model>,
    by_client_id: HashMap<ClientId, Member>,
    by_id: HashMap<String, Model>,
    modified: bool,
}

pub(crate) struct CollectionInner {
    client_id: ClientId,
    class: CollectionClass,
    observable: Observable,
    state: Mutex<CollectionState>,
}

impl Drop for CollectionInner {
    fn drop(&mut self) {
        for member in self.state.get_mut().by_client_id.values() {
            if let Some(links) = member.links {
                member
                    .model
                    .observable()
                    .remove_listeners([links.relay, links.id_change]);
            }
        }
    }
}

/// An ordered set of models.
///
/// `Collection` is a cheap, clonable handle; clones refer to the same
/// collection.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    /// An empty collection of `class`.
    pub fn new(class: &CollectionClass) -> Collection {
        let observable = Observable::new();
        observable.add_events([EventName::Add, EventName::Remove]);
        // Bubbling stops here; members reach the collection through relaying.
        observable.set_bubble_target(Some(&observable));
        let collection = Collection {
            inner: Arc::new(CollectionInner {
                client_id: ClientId::next(),
                class: class.clone(),
                observable,
                state: Mutex::new(CollectionState::default()),
            }),
        };
        if let Some(hook) = &class.inner.init {
            hook(&collection);
        }
        collection
    }

    /// A collection of the base class holding `items`, which must be models.
    pub fn from_items(items: Vec<Value>) -> Result<Collection> {
        CollectionClass::base().create(items)
    }

    fn from_weak(weak: &Weak<CollectionInner>) -> Option<Collection> {
        weak.upgrade().map(|inner| Collection { inner })
    }

    pub fn client_id(&self) -> ClientId {
        self.inner.client_id
    }

    pub fn class(&self) -> &CollectionClass {
        &self.inner.class
    }

    /// The event hub of this collection.
    pub fn observable(&self) -> &Observable {
        &self.inner.observable
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Append a model, raw data, or an array of either.
    ///
    /// Raw data is instantiated with the class's model class. Models already
    /// held are skipped. Fires `add` with `(collection, added, index)` if
    /// anything was added, and returns the added models.
    pub fn add(&self, items: impl Into<Value>) -> Result<Vec<Model>> {
        let models = self.instantiate_all(items.into())?;
        Ok(self.insert_models(models, None))
    }

    /// Like [`add`](Self::add), inserting at `index` (clamped to the count).
    ///
    /// A sorted collection re-sorts after inserting.
    pub fn insert(&self, items: impl Into<Value>, index: usize) -> Result<Vec<Model>> {
        let models = self.instantiate_all(items.into())?;
        Ok(self.insert_models(models, Some(index)))
    }

    fn instantiate_all(&self, items: Value) -> Result<Vec<Model>> {
        let items = match items {
            Value::Array(items) => items,
            other => vec![other],
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::Model(model) => Ok(model),
                data => match self.class().model_class() {
                    Some(class) => class.create(data),
                    None => Err(DataError::MissingModelClass {
                        collection: self.class().name().to_string(),
                    }),
                },
            })
            .collect()
    }

    fn insert_models(&self, models: Vec<Model>, index: Option<usize>) -> Vec<Model> {
        let mut accepted: Vec<Model> = Vec::with_capacity(models.len());
        let position = {
            let mut state = self.inner.state.lock();
            let start = index.map_or(state.models.len(), |i| i.min(state.models.len()));
            let mut at = start;
            for model in models {
                if state.by_client_id.contains_key(&model.client_id()) {
                    continue;
                }
                state.by_client_id.insert(
                    model.client_id(),
                    Member {
                        model: model.clone(),
                        links: None,
                    },
                );
                state.models.insert(at, model.clone());
                at += 1;
                accepted.push(model);
            }
            if !accepted.is_empty() {
                state.modified = true;
            }
            start
        };
        if accepted.is_empty() {
            return accepted;
        }

        for model in &accepted {
            let links = self.link(model);
            let id_key = model.get_id().ok().and_then(|id| id.id_key());
            let mut state = self.inner.state.lock();
            if let Some(member) = state.by_client_id.get_mut(&model.client_id()) {
                member.links = Some(links);
            }
            if let Some(key) = id_key {
                state.by_id.insert(key, model.clone());
            }
        }
        let position = if self.sort() {
            self.index_of(&accepted[0]).unwrap_or(position)
        } else {
            position
        };

        tracing::debug!(target: targets::COLLECTION, collection = %self.client_id(), added = accepted.len(), position, "added models");
        self.inner.observable.fire_event(
            EventName::Add,
            vec![
                Value::from(self),
                Value::from(accepted.as_slice()),
                Value::from(position),
            ],
        );
        accepted
    }

    fn link(&self, model: &Model) -> MemberLinks {
        let weak = Arc::downgrade(&self.inner);
        let relay = model.on(EventName::All, move |event: &Event| {
            let Some(collection) = Collection::from_weak(&weak) else {
                return HandlerResult::Continue;
            };
            collection.relay(event)
        });
        let weak = Arc::downgrade(&self.inner);
        let id_change = model.on(EventName::IdChange, move |event: &Event| {
            if let Some(collection) = Collection::from_weak(&weak)
                && let Some(model) = event.arg(0).as_model()
            {
                collection.reindex(model, event.arg(2), event.arg(1));
            }
        });
        MemberLinks { relay, id_change }
    }

    fn relay(&self, event: &Event) -> HandlerResult {
        match &event.name {
            EventName::BeforeDestroy => {
                if let Some(model) = event.arg(0).as_model() {
                    self.remove(model);
                }
                HandlerResult::Continue
            }
            EventName::Destroy => HandlerResult::Continue,
            name => {
                let mut args = Vec::with_capacity(event.args.len() + 1);
                args.push(Value::from(self));
                args.extend(event.args.iter().cloned());
                self.inner.observable.fire_event(name.clone(), args).into()
            }
        }
    }

    fn reindex(&self, model: &Model, old: &Value, new: &Value) {
        let mut state = self.inner.state.lock();
        if !state.by_client_id.contains_key(&model.client_id()) {
            return;
        }
        if let Some(key) = old.id_key()
            && state.by_id.get(&key).is_some_and(|held| held.ptr_eq(model))
        {
            state.by_id.remove(&key);
        }
        if let Some(key) = new.id_key() {
            state.by_id.insert(key, model.clone());
        }
    }

    /// Reorder by the class comparator. Returns `false` for unsorted classes.
    fn sort(&self) -> bool {
        let Some(comparator) = self.class().inner.sort_by.clone() else {
            return false;
        };
        let mut models = self.get_models();
        models.sort_by(|a, b| comparator(a, b));
        self.inner.state.lock().models = models;
        true
    }

    /// Remove a model, an id, or an array of either.
    ///
    /// Fires `remove` with `(collection, removed)` if anything was removed,
    /// and returns the removed models.
    pub fn remove(&self, items: impl Into<Value>) -> Vec<Model> {
        let items = match items.into() {
            Value::Array(items) => items,
            other => vec![other],
        };
        let mut removed = Vec::new();
        let mut links = Vec::new();
        {
            let mut state = self.inner.state.lock();
            for item in items {
                let model = match item {
                    Value::Model(model) => model,
                    id => match id.id_key().and_then(|key| state.by_id.get(&key).cloned()) {
                        Some(model) => model,
                        None => continue,
                    },
                };
                let Some(member) = state.by_client_id.remove(&model.client_id()) else {
                    continue;
                };
                if let Some(position) = state.models.iter().position(|held| held.ptr_eq(&model)) {
                    state.models.remove(position);
                }
                state.by_id.retain(|_, held| !held.ptr_eq(&model));
                links.extend(member.links.map(|link| (model.clone(), link)));
                removed.push(model);
            }
            if !removed.is_empty() {
                state.modified = true;
            }
        }
        if removed.is_empty() {
            return removed;
        }

        for (model, link) in links {
            model
                .observable()
                .remove_listeners([link.relay, link.id_change]);
        }
        tracing::debug!(target: targets::COLLECTION, collection = %self.client_id(), removed = removed.len(), "removed models");
        self.inner.observable.fire_event(
            EventName::Remove,
            vec![Value::from(self), Value::from(removed.as_slice())],
        );
        removed
    }

    /// Remove every member.
    pub fn remove_all(&self) -> Vec<Model> {
        let models = self.get_models();
        self.remove(models)
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn get_at(&self, index: usize) -> Option<Model> {
        self.inner.state.lock().models.get(index).cloned()
    }

    pub fn get_first(&self) -> Option<Model> {
        self.inner.state.lock().models.first().cloned()
    }

    pub fn get_last(&self) -> Option<Model> {
        self.inner.state.lock().models.last().cloned()
    }

    /// Members from `start` to `end`, inclusive. Both bounds are clamped to
    /// the valid indexes and default to the first and last member.
    pub fn get_range(&self, start: Option<usize>, end: Option<usize>) -> Vec<Model> {
        let state = self.inner.state.lock();
        let Some(last) = state.models.len().checked_sub(1) else {
            return Vec::new();
        };
        let start = start.unwrap_or(0).min(last);
        let end = end.unwrap_or(last).min(last);
        if start > end {
            return Vec::new();
        }
        state.models[start..=end].to_vec()
    }

    /// A snapshot of the members, in order.
    pub fn get_models(&self) -> Vec<Model> {
        self.inner.state.lock().models.clone()
    }

    pub fn get_count(&self) -> usize {
        self.inner.state.lock().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.get_count() == 0
    }

    pub fn get_by_client_id(&self, client_id: ClientId) -> Option<Model> {
        self.inner
            .state
            .lock()
            .by_client_id
            .get(&client_id)
            .map(|member| member.model.clone())
    }

    /// The member with persistence id `id`.
    pub fn get_by_id(&self, id: impl Into<Value>) -> Option<Model> {
        let key = id.into().id_key()?;
        self.inner.state.lock().by_id.get(&key).cloned()
    }

    pub fn has(&self, model: &Model) -> bool {
        self.inner
            .state
            .lock()
            .by_client_id
            .contains_key(&model.client_id())
    }

    /// The position of `model`, or `None` if it is not a member.
    pub fn index_of(&self, model: &Model) -> Option<usize> {
        let state = self.inner.state.lock();
        if !state.by_client_id.contains_key(&model.client_id()) {
            return None;
        }
        state.models.iter().position(|held| held.ptr_eq(model))
    }

    /// The position of the member with persistence id `id`.
    pub fn index_of_id(&self, id: impl Into<Value>) -> Option<usize> {
        let model = self.get_by_id(id)?;
        self.index_of(&model)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// The first member whose `attribute` is strictly equal to `value`.
    pub fn find(&self, attribute: &str, value: impl Into<Value>) -> Result<Option<Model>> {
        self.find_from(attribute, value, 0)
    }

    /// Like [`find`](Self::find), starting at `start`.
    pub fn find_from(
        &self,
        attribute: &str,
        value: impl Into<Value>,
        start: usize,
    ) -> Result<Option<Model>> {
        let value = value.into();
        for model in self.get_models().into_iter().skip(start) {
            if model.get(attribute)?.strict_eq(&value) {
                return Ok(Some(model));
            }
        }
        Ok(None)
    }

    /// The first member for which `predicate(model, index)` holds.
    pub fn find_by<F>(&self, predicate: F) -> Option<Model>
    where
        F: FnMut(&Model, usize) -> bool,
    {
        self.find_by_from(predicate, 0)
    }

    /// Like [`find_by`](Self::find_by), starting at `start`.
    pub fn find_by_from<F>(&self, mut predicate: F, start: usize) -> Option<Model>
    where
        F: FnMut(&Model, usize) -> bool,
    {
        self.get_models()
            .into_iter()
            .enumerate()
            .skip(start)
            .find(|(index, model)| predicate(model, *index))
            .map(|(_, model)| model)
    }

    /// Every member for which `predicate(model, index)` holds.
    pub fn filter_by<F>(&self, mut predicate: F) -> Vec<Model>
    where
        F: FnMut(&Model, usize) -> bool,
    {
        self.get_models()
            .into_iter()
            .enumerate()
            .filter(|(index, model)| predicate(model, *index))
            .map(|(_, model)| model)
            .collect()
    }

    /// Call `f(model, index)` for each member until it returns `false`.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&Model, usize) -> bool,
    {
        for (index, model) in self.get_models().iter().enumerate() {
            if !f(model, index) {
                break;
            }
        }
    }

    // =========================================================================
    // Change tracking
    // =========================================================================

    /// Whether membership changed since the last commit, or any member is
    /// dirty.
    pub fn is_modified(&self) -> bool {
        if self.inner.state.lock().modified {
            return true;
        }
        self.get_models().iter().any(Model::is_dirty)
    }

    /// Clear the membership flag and commit every member.
    pub fn commit(&self) {
        self.inner.state.lock().modified = false;
        for model in self.get_models() {
            model.commit();
        }
    }

    /// A plain copy of the members.
    pub fn get_data(&self, options: &ConvertOptions) -> NativeArray {
        convert::convert_collection(self, options)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Listen to an event of this collection, including relayed member
    /// events.
    pub fn on<F, R>(&self, name: impl Into<EventName>, handler: F) -> ListenerId
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<HandlerResult>,
    {
        self.inner.observable.add_listener(name, handler)
    }

    /// Fire an event with this collection as the first argument.
    pub fn fire_event(&self, name: impl Into<EventName>, mut args: Vec<Value>) -> bool {
        args.insert(0, Value::from(self));
        self.inner.observable.fire_event(name, args)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Collection")
            .field("class", &self.class().name())
            .field("client_id", &self.inner.client_id)
            .field("count", &state.models.len())
            .field("modified", &state.modified)
            .finish()
    }
}

static_assertions::assert_impl_all!(Collection: Send, Sync);
static_assertions::assert_impl_all!(CollectionClass: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn item_class() -> ModelClass {
        ModelClass::builder("CollectionItem")
            .attributes(["id", "attr"])
            .build()
            .unwrap()
    }

    fn items(class: &ModelClass) -> CollectionClass {
        CollectionClass::builder("CollectionItems")
            .model_class(class)
            .build()
    }

    #[test]
    fn test_add_skips_duplicates() {
        let class = item_class();
        let collection = Collection::new(&items(&class));
        let model = class.new_model(Value::object([("attr", 1)])).unwrap();

        assert_eq!(collection.add(&model).unwrap().len(), 1);
        assert!(collection.add(&model).unwrap().is_empty());
        assert_eq!(collection.get_count(), 1);
    }

    #[test]
    fn test_add_event_carries_models_and_position() {
        let class = item_class();
        let collection = Collection::new(&items(&class));
        collection.add(Value::object([("attr", 0)])).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        collection.on("add", move |event: &Event| sink.lock().push(event.args.clone()));

        let added = collection
            .add(Value::array([
                Value::object([("attr", 1)]),
                Value::object([("attr", 2)]),
            ]))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][1], Value::from(added));
        assert_eq!(seen[0][2], Value::from(1));
    }

    #[test]
    fn test_raw_data_requires_model_class() {
        let collection = Collection::new(&CollectionClass::builder("Untyped").build());
        assert!(matches!(
            collection.add(Value::object([("attr", 1)])),
            Err(DataError::MissingModelClass { .. })
        ));
    }

    #[test]
    fn test_insert_at_index() {
        let class = item_class();
        let collection = Collection::new(&items(&class));
        let added = collection
            .add(Value::array([
                Value::object([("attr", "a")]),
                Value::object([("attr", "c")]),
            ]))
            .unwrap();
        let inserted = collection
            .insert(Value::object([("attr", "b")]), 1)
            .unwrap();

        assert_eq!(collection.index_of(&inserted[0]), Some(1));
        assert_eq!(collection.index_of(&added[1]), Some(2));
    }

    #[test]
    fn test_sorted_collection() {
        let class = item_class();
        let sorted = CollectionClass::builder("Sorted")
            .model_class(&class)
            .sort_by(|a, b| {
                let a = a.get("attr").ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
                let b = b.get("attr").ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
                a.total_cmp(&b)
            })
            .build();
        let collection = sorted
            .create(vec![
                Value::object([("attr", 3)]),
                Value::object([("attr", 1)]),
                Value::object([("attr", 2)]),
            ])
            .unwrap();

        let order: Vec<Value> = collection
            .get_models()
            .iter()
            .map(|m| m.get("attr").unwrap())
            .collect();
        assert_eq!(order, vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert!(!collection.is_modified());
    }

    #[test]
    fn test_sorted_add_reports_final_position() {
        let class = item_class();
        let sorted = CollectionClass::builder("SortedPositions")
            .model_class(&class)
            .sort_by(|a, b| {
                let a = a.get("attr").ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
                let b = b.get("attr").ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
                a.total_cmp(&b)
            })
            .build();
        let collection = sorted
            .create(vec![Value::object([("attr", 10)]), Value::object([("attr", 20)])])
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        collection.on("add", move |event: &Event| sink.lock().push(event.arg(2).clone()));

        let added = collection.add(Value::object([("attr", 5)])).unwrap();

        assert_eq!(collection.index_of(&added[0]), Some(0));
        assert_eq!(*seen.lock(), vec![Value::from(0)]);
    }

    #[test]
    fn test_get_by_client_id() {
        let class = item_class();
        let collection = Collection::new(&items(&class));
        let model = collection.add(Value::object([("attr", 1)])).unwrap().remove(0);
        let outsider = class.new_model(Value::Undefined).unwrap();

        assert!(collection.get_by_client_id(model.client_id()).unwrap().ptr_eq(&model));
        assert!(collection.get_by_client_id(outsider.client_id()).is_none());

        collection.remove(&model);
        assert!(collection.get_by_client_id(model.client_id()).is_none());
    }

    #[test]
    fn test_collection_is_its_own_bubble_target() {
        let class = item_class();
        let collection = Collection::new(&items(&class));
        let target = collection.observable().bubble_target().unwrap();
        assert!(target.ptr_eq(collection.observable()));

        collection.observable().enable_bubble("ping", None);
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        collection.on("ping", move |_: &Event| *sink.lock() += 1);
        collection.observable().fire_event("ping", Vec::new());
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_get_range_clamps_inclusive() {
        let class = item_class();
        let collection = items(&class)
            .create((0..5).map(|i| Value::object([("attr", i)])).collect())
            .unwrap();

        assert_eq!(collection.get_range(Some(1), Some(3)).len(), 3);
        assert_eq!(collection.get_range(None, Some(99)).len(), 5);
        assert_eq!(collection.get_range(Some(4), Some(2)).len(), 0);
        assert!(Collection::new(&items(&class)).get_range(None, None).is_empty());
    }

    #[test]
    fn test_index_by_id_follows_id_changes() {
        let class = item_class();
        let collection = Collection::new(&items(&class));
        let model = collection.add(Value::object([("attr", 1)])).unwrap().remove(0);
        assert!(collection.get_by_id(10).is_none());

        model.set("id", 10).unwrap();
        assert!(collection.get_by_id(10).unwrap().ptr_eq(&model));
        assert_eq!(collection.index_of_id(10), Some(0));

        model.set("id", 11).unwrap();
        assert!(collection.get_by_id(10).is_none());
        assert!(collection.get_by_id("11").is_some());
    }

    #[test]
    fn test_remove_by_id_and_remove_all() {
        let class = item_class();
        let collection = items(&class)
            .create(vec![
                Value::object([("id", 1)]),
                Value::object([("id", 2)]),
                Value::object([("id", 3)]),
            ])
            .unwrap();

        assert_eq!(collection.remove(2).len(), 1);
        assert_eq!(collection.get_count(), 2);
        assert!(collection.remove(2).is_empty());
        assert_eq!(collection.remove_all().len(), 2);
        assert!(collection.is_empty());
        assert!(collection.is_modified());
    }

    #[test]
    fn test_find_and_find_by() {
        let class = item_class();
        let collection = items(&class)
            .create(vec![
                Value::object([("attr", "x")]),
                Value::object([("attr", "y")]),
                Value::object([("attr", "x")]),
            ])
            .unwrap();

        let first = collection.find("attr", "x").unwrap().unwrap();
        assert_eq!(collection.index_of(&first), Some(0));
        let later = collection.find_from("attr", "x", 1).unwrap().unwrap();
        assert_eq!(collection.index_of(&later), Some(2));
        assert!(collection.find("attr", "z").unwrap().is_none());
        assert!(collection.find("missing", "x").is_err());

        let by = collection.find_by(|_, index| index == 1).unwrap();
        assert_eq!(by.get("attr").unwrap(), Value::from("y"));
        assert_eq!(
            collection
                .filter_by(|model, _| model.get("attr").unwrap() == Value::from("x"))
                .len(),
            2
        );
    }

    #[test]
    fn test_find_is_strict() {
        let class = item_class();
        let collection = items(&class)
            .create(vec![Value::object([("attr", 1)])])
            .unwrap();
        assert!(collection.find("attr", "1").unwrap().is_none());
        assert!(collection.find("attr", 1).unwrap().is_some());
    }

    #[test]
    fn test_each_stops_early() {
        let class = item_class();
        let collection = items(&class)
            .create((0..4).map(|i| Value::object([("attr", i)])).collect())
            .unwrap();
        let mut visited = 0;
        collection.each(|_, index| {
            visited += 1;
            index < 1
        });
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_is_modified_tracks_members() {
        let class = item_class();
        let collection = items(&class)
            .create(vec![Value::object([("attr", 1)])])
            .unwrap();
        assert!(!collection.is_modified());

        collection.get_first().unwrap().set("attr", 2).unwrap();
        assert!(collection.is_modified());

        collection.commit();
        assert!(!collection.is_modified());
    }

    #[test]
    fn test_dropped_collection_stops_relaying() {
        let class = item_class();
        let model = class.new_model(Value::Undefined).unwrap();
        {
            let collection = Collection::new(&items(&class));
            collection.add(&model).unwrap();
            assert_eq!(model.observable().listener_count(EventName::All), 1);
        }
        assert_eq!(model.observable().listener_count(EventName::All), 0);
    }
}
