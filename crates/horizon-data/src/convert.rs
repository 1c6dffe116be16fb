//! Flattening model graphs into plain data.
//!
//! [`convert`] walks a model or collection and produces a tree of
//! [`NativeValue`]s: an object per model, an array per collection. Containers
//! are shared handles, so a model reachable along several paths converts to
//! a single container referenced from each of them, and a cycle in the model
//! graph becomes a cycle in the output instead of infinite recursion.
//!
//! Each model or collection is converted once per call. Its container is
//! registered by client id before its contents are converted, so a path that
//! loops back to it finds the container that is still being filled.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::attribute::{Attribute, AttributeKind};
use crate::collection::Collection;
use crate::error::{DataError, Result};
use crate::logging::{PerfSpan, span_names};
use crate::model::{ClientId, Model};
use crate::value::{Value, number_to_json};

/// Options for [`convert`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Only these attributes of the root model. Nested models are always
    /// converted in full.
    pub attribute_names: Option<Vec<String>>,
    /// Skip attributes that are not persisted.
    pub persisted_only: bool,
    /// Read attributes through their `raw` hooks and use compact references
    /// for non-embedded nested data.
    pub raw: bool,
}

impl ConvertOptions {
    /// The options proxies use to build payloads: persisted attributes, raw.
    pub fn persisted_raw() -> Self {
        Self {
            attribute_names: None,
            persisted_only: true,
            raw: true,
        }
    }

    /// Restrict the root model to `names`.
    pub fn with_attribute_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute_names = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// A shared, mutable map of plain values.
#[derive(Clone, Default)]
pub struct NativeObject(Arc<RwLock<BTreeMap<String, NativeValue>>>);

impl NativeObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<NativeValue> {
        self.0.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: NativeValue) -> Option<NativeValue> {
        self.0.write().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<NativeValue> {
        self.0.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Whether two handles refer to the same container.
    pub fn ptr_eq(&self, other: &NativeObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Convert to JSON. Fails on circular structures.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        NativeValue::Object(self.clone()).to_json()
    }
}

/// A shared, mutable list of plain values.
#[derive(Clone, Default)]
pub struct NativeArray(Arc<RwLock<Vec<NativeValue>>>);

impl NativeArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<NativeValue> {
        self.0.read().get(index).cloned()
    }

    pub fn push(&self, value: NativeValue) {
        self.0.write().push(value);
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// A snapshot of the items.
    pub fn to_vec(&self) -> Vec<NativeValue> {
        self.0.read().clone()
    }

    /// Whether two handles refer to the same container.
    pub fn ptr_eq(&self, other: &NativeArray) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Convert to JSON. Fails on circular structures.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        NativeValue::Array(self.clone()).to_json()
    }
}

/// A plain value produced by conversion.
#[derive(Clone, Default)]
pub enum NativeValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(NativeArray),
    Object(NativeObject),
}

impl NativeValue {
    pub fn as_object(&self) -> Option<&NativeObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NativeArray> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    /// The member `key` of an object value.
    pub fn get(&self, key: &str) -> Option<NativeValue> {
        self.as_object().and_then(|object| object.get(key))
    }

    /// The item at `index` of an array value.
    pub fn at(&self, index: usize) -> Option<NativeValue> {
        self.as_array().and_then(|array| array.get(index))
    }

    /// Whether both values are the same container.
    ///
    /// Primitives are never identical.
    pub fn ptr_eq(&self, other: &NativeValue) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The primitive as a [`Value`], or `None` for containers.
    pub fn to_primitive(&self) -> Option<Value> {
        Some(match self {
            Self::Undefined => Value::Undefined,
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Date(d) => Value::Date(*d),
            Self::Array(_) | Self::Object(_) => return None,
        })
    }

    /// Convert to JSON.
    ///
    /// Shared containers are written out once per reference; a container
    /// that contains itself fails with [`DataError::CircularStructure`].
    /// Undefined object members are omitted.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut visiting = HashSet::new();
        self.to_json_inner(&mut visiting)
    }

    fn to_json_inner(&self, visiting: &mut HashSet<usize>) -> Result<serde_json::Value> {
        Ok(match self {
            Self::Undefined | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Date(d) => serde_json::Value::String(d.to_rfc3339()),
            Self::Array(array) => {
                let addr = array.addr();
                if !visiting.insert(addr) {
                    return Err(DataError::CircularStructure);
                }
                let items = array
                    .to_vec()
                    .iter()
                    .map(|item| item.to_json_inner(visiting))
                    .collect::<Result<Vec<_>>>()?;
                visiting.remove(&addr);
                serde_json::Value::Array(items)
            }
            Self::Object(object) => {
                let addr = object.addr();
                if !visiting.insert(addr) {
                    return Err(DataError::CircularStructure);
                }
                let entries = object.0.read().clone();
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    if !matches!(value, Self::Undefined) {
                        map.insert(key, value.to_json_inner(visiting)?);
                    }
                }
                visiting.remove(&addr);
                serde_json::Value::Object(map)
            }
        })
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
            // Containers may be circular.
            Self::Array(a) => write!(f, "Array(len={})", a.len()),
            Self::Object(o) => write!(f, "Object({:?})", o.keys()),
        }
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeObject({:?})", self.keys())
    }
}

impl fmt::Debug for NativeArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeArray(len={})", self.len())
    }
}

/// Convert a value, which may be or contain models and collections.
pub fn convert(root: &Value, options: &ConvertOptions) -> NativeValue {
    let _span = PerfSpan::new(span_names::CONVERT);
    let mut converter = Converter::new(options);
    match root {
        Value::Model(model) => converter.root_model(model),
        Value::Collection(collection) => converter.root_collection(collection),
        other => converter.value(other, None),
    }
}

/// Convert a model into an object.
pub fn convert_model(model: &Model, options: &ConvertOptions) -> NativeObject {
    let _span = PerfSpan::new(span_names::CONVERT);
    let mut converter = Converter::new(options);
    match converter.root_model(model) {
        NativeValue::Object(object) => object,
        _ => NativeObject::new(),
    }
}

/// Convert a collection into an array.
pub fn convert_collection(collection: &Collection, options: &ConvertOptions) -> NativeArray {
    let _span = PerfSpan::new(span_names::CONVERT);
    let mut converter = Converter::new(options);
    match converter.root_collection(collection) {
        NativeValue::Array(array) => array,
        _ => NativeArray::new(),
    }
}

struct Converter<'a> {
    options: &'a ConvertOptions,
    cache: HashMap<ClientId, NativeValue>,
}

impl<'a> Converter<'a> {
    fn new(options: &'a ConvertOptions) -> Self {
        Self {
            options,
            cache: HashMap::new(),
        }
    }

    fn root_model(&mut self, model: &Model) -> NativeValue {
        let object = NativeObject::new();
        self.cache
            .insert(model.client_id(), NativeValue::Object(object.clone()));
        self.fill_model(model, &object, true);
        NativeValue::Object(object)
    }

    fn root_collection(&mut self, collection: &Collection) -> NativeValue {
        let array = NativeArray::new();
        self.cache
            .insert(collection.client_id(), NativeValue::Array(array.clone()));
        self.fill_collection(collection, &array, None);
        NativeValue::Array(array)
    }

    fn fill_model(&mut self, model: &Model, object: &NativeObject, is_root: bool) {
        for attribute in model.class().attributes() {
            if is_root
                && let Some(names) = &self.options.attribute_names
                && !names.iter().any(|name| name == attribute.name())
            {
                continue;
            }
            if self.options.persisted_only && !attribute.is_persisted() {
                continue;
            }
            let value = model.read_attribute(attribute, self.options.raw);
            let converted = self.value(&value, Some(attribute));
            object.insert(attribute.name(), converted);
        }
    }

    fn fill_collection(
        &mut self,
        collection: &Collection,
        array: &NativeArray,
        via: Option<&Attribute>,
    ) {
        let references_only = self.options.raw
            && via.is_some_and(|attribute| {
                attribute.kind() == AttributeKind::Collection && !attribute.is_embedded()
            });
        for member in collection.get_models() {
            let item = if references_only {
                Self::reference(&member)
            } else {
                self.model(&member, None)
            };
            array.push(item);
        }
    }

    /// `{ idAttribute: id }` for a model reached through a non-embedded
    /// collection.
    fn reference(model: &Model) -> NativeValue {
        let object = NativeObject::new();
        if let Some(attribute) = model.class().id_attribute() {
            let id = model.read_attribute(attribute, true);
            object.insert(attribute.name(), Self::primitive(&id));
        }
        NativeValue::Object(object)
    }

    fn model(&mut self, model: &Model, via: Option<&Attribute>) -> NativeValue {
        if self.options.raw && via.is_some_and(Attribute::is_persist_id_only) {
            return match model.class().id_attribute() {
                Some(attribute) => Self::primitive(&model.read_attribute(attribute, true)),
                None => NativeValue::Null,
            };
        }
        if let Some(cached) = self.cache.get(&model.client_id()) {
            return cached.clone();
        }
        let object = NativeObject::new();
        self.cache
            .insert(model.client_id(), NativeValue::Object(object.clone()));
        self.fill_model(model, &object, false);
        NativeValue::Object(object)
    }

    fn collection(&mut self, collection: &Collection, via: Option<&Attribute>) -> NativeValue {
        if let Some(cached) = self.cache.get(&collection.client_id()) {
            return cached.clone();
        }
        let array = NativeArray::new();
        self.cache
            .insert(collection.client_id(), NativeValue::Array(array.clone()));
        self.fill_collection(collection, &array, via);
        NativeValue::Array(array)
    }

    fn value(&mut self, value: &Value, via: Option<&Attribute>) -> NativeValue {
        match value {
            Value::Model(model) => self.model(model, via),
            Value::Collection(collection) => self.collection(collection, via),
            Value::Array(items) => {
                let array = NativeArray::new();
                for item in items {
                    let converted = self.value(item, None);
                    array.push(converted);
                }
                NativeValue::Array(array)
            }
            Value::Object(map) => {
                let object = NativeObject::new();
                for (key, item) in map {
                    let converted = self.value(item, None);
                    object.insert(key.clone(), converted);
                }
                NativeValue::Object(object)
            }
            other => Self::primitive(other),
        }
    }

    fn primitive(value: &Value) -> NativeValue {
        match value {
            Value::Undefined => NativeValue::Undefined,
            Value::Null => NativeValue::Null,
            Value::Bool(b) => NativeValue::Bool(*b),
            Value::Number(n) => NativeValue::Number(*n),
            Value::String(s) => NativeValue::String(s.clone()),
            Value::Date(d) => NativeValue::Date(*d),
            Value::Model(model) => NativeValue::String(model.client_id().to_string()),
            Value::Collection(collection) => {
                NativeValue::String(collection.client_id().to_string())
            }
            Value::Array(_) | Value::Object(_) => NativeValue::Null,
        }
    }
}
