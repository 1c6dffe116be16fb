//! Attribute descriptors.
//!
//! An [`Attribute`] describes one named field of a model class: how incoming
//! values are coerced, what the default is, whether the field is persisted,
//! and how reads are computed. Descriptors are immutable once built and are
//! shared by every instance of the class.
//!
//! # Set pipeline
//!
//! When a model stores a value it runs, in order:
//!
//! 1. [`Attribute::before_set`]: the kind's coercion (booleans, numbers,
//!    strings, dates, nested instantiation).
//! 2. The custom set hook, if any (see [`AttributeBuilder::on_set`]).
//! 3. [`Attribute::after_set`]: the kind's post-store check.
//!
//! Reads go through the `get` hook ([`Attribute::get`]) or, for persistence,
//! the `raw` hook ([`Attribute::raw`]).
//!
//! # Example
//!
//! ```
//! use horizon_data::attribute::Attribute;
//! use horizon_data::Value;
//!
//! let price = Attribute::float("price").use_null(true).build().unwrap();
//! assert_eq!(price.default_value(), Some(Value::Null));
//! ```

pub mod coerce;
mod nested;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::collection::CollectionClass;
use crate::error::{DataError, Result};
use crate::model::{Model, ModelClass};
use crate::value::Value;

pub use nested::{ClassFactory, ClassRef, NamedClass};
pub(crate) use nested::{LazyClass, nested_is_modified};

/// The family an attribute belongs to, which selects its coercion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Any value, stored as given.
    Mixed,
    /// Strings.
    String,
    /// Whole numbers, truncated toward zero.
    Integer,
    /// Floating-point numbers.
    Float,
    /// Booleans.
    Boolean,
    /// Dates.
    Date,
    /// A nested model.
    Model,
    /// A nested collection.
    Collection,
}

impl AttributeKind {
    /// Whether values of this kind are models or collections.
    pub fn is_nested(self) -> bool {
        matches!(self, Self::Model | Self::Collection)
    }
}

/// A closure producing a value.
pub type Producer = Arc<dyn Fn() -> Value + Send + Sync>;

/// A composite default whose leaves may be producers.
///
/// Materialising a template invokes every producer it contains, so defaults
/// such as `{ id: next_id() }` are fresh for every model.
#[derive(Clone)]
pub enum DefaultTemplate {
    /// A literal value, cloned on each use.
    Literal(Value),
    /// A producer, invoked on each use.
    Producer(Producer),
    /// An array of templates.
    Array(Vec<DefaultTemplate>),
    /// An object of templates.
    Object(Vec<(String, DefaultTemplate)>),
}

impl DefaultTemplate {
    /// A producer leaf.
    pub fn producer<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::Producer(Arc::new(f))
    }

    /// An object template from key/template pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DefaultTemplate)>,
    {
        Self::Object(entries.into_iter().map(|(k, t)| (k.into(), t)).collect())
    }

    /// Produce a fresh value from the template.
    pub fn materialize(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Producer(producer) => producer(),
            Self::Array(items) => Value::Array(items.iter().map(Self::materialize).collect()),
            Self::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, template)| (key.clone(), template.materialize()))
                    .collect::<BTreeMap<_, _>>(),
            ),
        }
    }
}

impl From<Value> for DefaultTemplate {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

/// An explicitly configured default.
#[derive(Clone)]
pub enum DefaultValue {
    /// A literal value.
    Literal(Value),
    /// A producer invoked for every model.
    Producer(Producer),
    /// A composite template materialised for every model.
    Template(DefaultTemplate),
}

impl DefaultValue {
    fn materialize(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Producer(producer) => producer(),
            Self::Template(template) => template.materialize(),
        }
    }
}

/// What a custom set hook decided.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    /// Store this value, subject to the usual change detection.
    Store(Value),
    /// The hook already updated the model as a side effect. Nothing is
    /// stored, but change events are fired with the attribute's current
    /// value.
    Notify,
}

impl From<Value> for SetOutcome {
    fn from(value: Value) -> Self {
        Self::Store(value)
    }
}

/// Custom set hook: `(model, new value, current value)`.
pub type SetHook = Arc<dyn Fn(&Model, Value, &Value) -> SetOutcome + Send + Sync>;

/// Read hook: `(model, stored value)`.
pub type ReadHook = Arc<dyn Fn(&Model, &Value) -> Value + Send + Sync>;

/// Equality predicate: `(old, new)`.
pub type EqualityFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

struct AttributeInner {
    name: String,
    kind: AttributeKind,
    default: Option<DefaultValue>,
    persist: bool,
    use_null: bool,
    strip: Option<Regex>,
    set_hook: Option<SetHook>,
    get_hook: Option<ReadHook>,
    raw_hook: Option<ReadHook>,
    equality: Option<EqualityFn>,
    embedded: bool,
    persist_id_only: bool,
    model_class: Option<LazyClass<ModelClass>>,
    collection_class: Option<LazyClass<CollectionClass>>,
}

/// An immutable attribute descriptor.
///
/// Cloning is cheap; clones share the same descriptor.
#[derive(Clone)]
pub struct Attribute {
    inner: Arc<AttributeInner>,
}

impl Attribute {
    /// Start configuring an attribute of the given kind.
    pub fn builder(name: impl Into<String>, kind: AttributeKind) -> AttributeBuilder {
        AttributeBuilder::new(name.into(), kind)
    }

    /// An attribute that stores values unchanged.
    pub fn mixed(name: impl Into<String>) -> AttributeBuilder {
        Self::builder(name, AttributeKind::Mixed)
    }

    /// A string attribute.
    pub fn string(name: impl Into<String>) -> AttributeBuilder {
        Self::builder(name, AttributeKind::String)
    }

    /// An integer attribute.
    pub fn integer(name: impl Into<String>) -> AttributeBuilder {
        Self::builder(name, AttributeKind::Integer)
    }

    /// A float attribute.
    pub fn float(name: impl Into<String>) -> AttributeBuilder {
        Self::builder(name, AttributeKind::Float)
    }

    /// A boolean attribute.
    pub fn boolean(name: impl Into<String>) -> AttributeBuilder {
        Self::builder(name, AttributeKind::Boolean)
    }

    /// A date attribute.
    pub fn date(name: impl Into<String>) -> AttributeBuilder {
        Self::builder(name, AttributeKind::Date)
    }

    /// A nested-model attribute.
    pub fn model(name: impl Into<String>) -> AttributeBuilder {
        Self::builder(name, AttributeKind::Model)
    }

    /// A nested-collection attribute.
    pub fn collection(name: impl Into<String>) -> AttributeBuilder {
        Self::builder(name, AttributeKind::Collection)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> AttributeKind {
        self.inner.kind
    }

    /// Whether the attribute takes part in persisted views of the data.
    pub fn is_persisted(&self) -> bool {
        self.inner.persist
    }

    pub fn uses_null(&self) -> bool {
        self.inner.use_null
    }

    /// Whether changes inside the nested value count as changes of this
    /// attribute.
    pub fn is_embedded(&self) -> bool {
        self.inner.embedded
    }

    /// Whether only the nested model's id is persisted.
    pub fn is_persist_id_only(&self) -> bool {
        self.inner.persist_id_only
    }

    pub fn has_get_hook(&self) -> bool {
        self.inner.get_hook.is_some()
    }

    pub fn has_raw_hook(&self) -> bool {
        self.inner.raw_hook.is_some()
    }

    /// Whether two handles share the same descriptor.
    pub fn ptr_eq(&self, other: &Attribute) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The nested model class, resolving it on first use.
    pub fn model_class(&self) -> Result<Option<ModelClass>> {
        self.inner
            .model_class
            .as_ref()
            .map(LazyClass::resolve)
            .transpose()
    }

    /// The nested collection class, resolving it on first use.
    pub fn collection_class(&self) -> Result<Option<CollectionClass>> {
        self.inner
            .collection_class
            .as_ref()
            .map(LazyClass::resolve)
            .transpose()
    }

    /// A fresh default value, or `None` when the attribute has no default.
    ///
    /// Explicit defaults are materialised on every call. Otherwise booleans
    /// default to `false`, numbers to `0` and strings to `""` (all `null` when
    /// the attribute uses null); the other kinds have no default.
    pub fn default_value(&self) -> Option<Value> {
        if let Some(default) = &self.inner.default {
            return Some(default.materialize());
        }
        let use_null = self.inner.use_null;
        match self.inner.kind {
            _ if use_null && matches!(
                self.inner.kind,
                AttributeKind::Boolean
                    | AttributeKind::Integer
                    | AttributeKind::Float
                    | AttributeKind::String
            ) =>
            {
                Some(Value::Null)
            }
            AttributeKind::Boolean => Some(Value::Bool(false)),
            AttributeKind::Integer | AttributeKind::Float => Some(Value::Number(0.0)),
            AttributeKind::String => Some(Value::String(String::new())),
            _ => None,
        }
    }

    /// Coerce an incoming value according to the attribute's kind.
    pub fn before_set(&self, _model: &Model, _old: &Value, new: Value) -> Result<Value> {
        let use_null = self.inner.use_null;
        Ok(match self.inner.kind {
            AttributeKind::Mixed => new,
            AttributeKind::Boolean => coerce::to_boolean(&new, use_null),
            AttributeKind::Integer | AttributeKind::Float => coerce::to_number(
                &new,
                self.inner.strip.as_ref().unwrap_or(&coerce::DEFAULT_STRIP),
                use_null,
                self.inner.kind == AttributeKind::Integer,
            ),
            AttributeKind::String => coerce::to_string(&new, use_null),
            AttributeKind::Date => coerce::to_date(&new),
            AttributeKind::Model => nested::model_before_set(self.inner.model_class.as_ref(), new)?,
            AttributeKind::Collection => {
                nested::collection_before_set(self.inner.collection_class.as_ref(), new)?
            }
        })
    }

    /// Run the custom set hook, if one is configured.
    pub fn apply_set_hook(&self, model: &Model, new: Value, old: &Value) -> Option<SetOutcome> {
        self.inner.set_hook.as_ref().map(|hook| hook(model, new, old))
    }

    /// Check the value about to be stored.
    ///
    /// Nested kinds reject values that are not instances of their class.
    pub fn after_set(&self, _model: &Model, value: Value) -> Result<Value> {
        match self.inner.kind {
            AttributeKind::Model => {
                nested::model_after_set(&self.inner.name, self.inner.model_class.as_ref(), value)
            }
            AttributeKind::Collection => nested::collection_after_set(
                &self.inner.name,
                self.inner.collection_class.as_ref(),
                value,
            ),
            _ => Ok(value),
        }
    }

    /// The value a model read returns for `stored`.
    pub fn get(&self, model: &Model, stored: &Value) -> Value {
        match &self.inner.get_hook {
            Some(hook) => hook(model, stored),
            None => stored.clone(),
        }
    }

    /// The value a persistence read returns for `stored`.
    ///
    /// Falls back to the stored value, not to the `get` hook.
    pub fn raw(&self, model: &Model, stored: &Value) -> Value {
        match &self.inner.raw_hook {
            Some(hook) => hook(model, stored),
            None => stored.clone(),
        }
    }

    /// Whether storing `new` over `old` is a change.
    pub fn values_are_equal(&self, old: &Value, new: &Value) -> bool {
        match &self.inner.equality {
            Some(equal) => equal(old, new),
            None => old == new,
        }
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("persist", &self.inner.persist)
            .field("use_null", &self.inner.use_null)
            .field("embedded", &self.inner.embedded)
            .finish_non_exhaustive()
    }
}

enum ClassConfig<C> {
    Omitted,
    Undefined,
    Given(ClassRef<C>),
}

/// Builder for [`Attribute`].
pub struct AttributeBuilder {
    name: String,
    kind: AttributeKind,
    default: Option<DefaultValue>,
    persist: bool,
    use_null: bool,
    strip: Option<Regex>,
    set_hook: Option<SetHook>,
    get_hook: Option<ReadHook>,
    raw_hook: Option<ReadHook>,
    equality: Option<EqualityFn>,
    embedded: bool,
    persist_id_only: bool,
    model_class: ClassConfig<ModelClass>,
    collection_class: ClassConfig<CollectionClass>,
}

impl AttributeBuilder {
    fn new(name: String, kind: AttributeKind) -> Self {
        Self {
            name,
            kind,
            default: None,
            persist: true,
            use_null: false,
            strip: None,
            set_hook: None,
            get_hook: None,
            raw_hook: None,
            equality: None,
            embedded: false,
            persist_id_only: false,
            model_class: ClassConfig::Omitted,
            collection_class: ClassConfig::Omitted,
        }
    }

    /// Use a literal default.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Compute the default for every model.
    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    /// Materialise a composite default for every model.
    pub fn default_template(mut self, template: DefaultTemplate) -> Self {
        self.default = Some(DefaultValue::Template(template));
        self
    }

    /// Include the attribute in persisted views (default `true`).
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Map blank input to `null` instead of the kind's empty value.
    pub fn use_null(mut self, use_null: bool) -> Self {
        self.use_null = use_null;
        self
    }

    /// Characters stripped from numeric input before parsing.
    pub fn strip_chars(mut self, pattern: Regex) -> Self {
        self.strip = Some(pattern);
        self
    }

    /// Custom set hook, run after the kind's coercion.
    ///
    /// Return a value (or [`SetOutcome::Store`]) to store it, or
    /// [`SetOutcome::Notify`] after updating the model through other means.
    pub fn on_set<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&Model, Value, &Value) -> R + Send + Sync + 'static,
        R: Into<SetOutcome>,
    {
        self.set_hook = Some(Arc::new(move |model: &Model, new: Value, old: &Value| {
            hook(model, new, old).into()
        }));
        self
    }

    /// Computed read hook.
    pub fn on_get<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model, &Value) -> Value + Send + Sync + 'static,
    {
        self.get_hook = Some(Arc::new(hook));
        self
    }

    /// Persistence read hook.
    pub fn on_raw<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model, &Value) -> Value + Send + Sync + 'static,
    {
        self.raw_hook = Some(Arc::new(hook));
        self
    }

    /// Replace the equality used for change detection.
    pub fn equality<F>(mut self, equal: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.equality = Some(Arc::new(equal));
        self
    }

    /// Treat changes inside the nested value as changes of this attribute.
    pub fn embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    /// Persist only the nested model's id.
    pub fn persist_id_only(mut self, persist_id_only: bool) -> Self {
        self.persist_id_only = persist_id_only;
        self
    }

    /// The class nested model values belong to.
    pub fn model_class(mut self, class: impl Into<ClassRef<ModelClass>>) -> Self {
        self.model_class = ClassConfig::Given(class.into());
        self
    }

    /// Like [`model_class`](Self::model_class), but a `None` is recorded as
    /// a misconfiguration and reported by [`build`](Self::build).
    pub fn try_model_class(mut self, class: Option<ClassRef<ModelClass>>) -> Self {
        self.model_class = class.map_or(ClassConfig::Undefined, ClassConfig::Given);
        self
    }

    /// The class nested collection values belong to.
    pub fn collection_class(mut self, class: impl Into<ClassRef<CollectionClass>>) -> Self {
        self.collection_class = ClassConfig::Given(class.into());
        self
    }

    /// Like [`collection_class`](Self::collection_class), but a `None` is
    /// recorded as a misconfiguration and reported by [`build`](Self::build).
    pub fn try_collection_class(mut self, class: Option<ClassRef<CollectionClass>>) -> Self {
        self.collection_class = class.map_or(ClassConfig::Undefined, ClassConfig::Given);
        self
    }

    /// Finish configuration.
    ///
    /// Fails if the name is empty or a class reference was undefined.
    pub fn build(self) -> Result<Attribute> {
        if self.name.trim().is_empty() {
            return Err(DataError::MissingAttributeName);
        }
        let model_class = match self.model_class {
            ClassConfig::Omitted => None,
            ClassConfig::Undefined => {
                return Err(DataError::UndefinedClassReference {
                    attribute: self.name,
                    key: "modelClass",
                });
            }
            ClassConfig::Given(reference) => Some(LazyClass::new(reference)),
        };
        let collection_class = match self.collection_class {
            ClassConfig::Omitted => None,
            ClassConfig::Undefined => {
                return Err(DataError::UndefinedClassReference {
                    attribute: self.name,
                    key: "collectionClass",
                });
            }
            ClassConfig::Given(reference) => Some(LazyClass::new(reference)),
        };

        Ok(Attribute {
            inner: Arc::new(AttributeInner {
                name: self.name,
                kind: self.kind,
                default: self.default,
                persist: self.persist,
                use_null: self.use_null,
                strip: self.strip,
                set_hook: self.set_hook,
                get_hook: self.get_hook,
                raw_hook: self.raw_hook,
                equality: self.equality,
                embedded: self.embedded,
                persist_id_only: self.persist_id_only,
                model_class,
                collection_class,
            }),
        })
    }
}

/// Anything a model class builder accepts as an attribute declaration.
pub trait IntoAttribute {
    /// Produce the attribute, reporting configuration errors.
    fn into_attribute(self) -> Result<Attribute>;
}

impl IntoAttribute for Attribute {
    fn into_attribute(self) -> Result<Attribute> {
        Ok(self)
    }
}

impl IntoAttribute for AttributeBuilder {
    fn into_attribute(self) -> Result<Attribute> {
        self.build()
    }
}

impl IntoAttribute for &str {
    fn into_attribute(self) -> Result<Attribute> {
        Attribute::mixed(self).build()
    }
}

impl IntoAttribute for String {
    fn into_attribute(self) -> Result<Attribute> {
        Attribute::mixed(self).build()
    }
}

static_assertions::assert_impl_all!(Attribute: Send, Sync);
