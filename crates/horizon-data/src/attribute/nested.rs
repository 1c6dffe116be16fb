//! Nested model and collection attributes.
//!
//! A nested attribute names the class its values are instances of. The class
//! can be given directly, through a closure evaluated on first use, or by a
//! registered name (see [`crate::registry`]); the latter two let classes refer
//! to each other before both are defined.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::collection::{Collection, CollectionClass};
use crate::error::{DataError, Result};
use crate::logging::targets;
use crate::model::ModelClass;
use crate::registry;
use crate::value::Value;

/// A class that can be looked up by name in the registry.
pub trait NamedClass: Clone + Send + Sync + 'static {
    /// Human-readable description of the class family, for error messages.
    const FAMILY: &'static str;

    /// Find a registered class by name.
    fn lookup(name: &str) -> Option<Self>;

    /// The class name.
    fn class_name(&self) -> String;
}

impl NamedClass for ModelClass {
    const FAMILY: &'static str = "model class";

    fn lookup(name: &str) -> Option<Self> {
        registry::model_class(name)
    }

    fn class_name(&self) -> String {
        self.name().to_string()
    }
}

impl NamedClass for CollectionClass {
    const FAMILY: &'static str = "collection class";

    fn lookup(name: &str) -> Option<Self> {
        registry::collection_class(name)
    }

    fn class_name(&self) -> String {
        self.name().to_string()
    }
}

/// A closure producing a class on demand.
pub type ClassFactory<C> = Arc<dyn Fn() -> Option<C> + Send + Sync>;

/// How a nested attribute refers to its class.
#[derive(Clone)]
pub enum ClassRef<C> {
    /// The class itself.
    Direct(C),
    /// A closure evaluated the first time the class is needed.
    Deferred(ClassFactory<C>),
    /// A name looked up in the class registry the first time the class is
    /// needed.
    Named(String),
}

impl<C> ClassRef<C> {
    /// Refer to a class through a closure evaluated on first use.
    pub fn deferred<F>(factory: F) -> Self
    where
        F: Fn() -> Option<C> + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(factory))
    }

    /// Refer to a class by its registered name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl<C: NamedClass> fmt::Debug for ClassRef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(class) => write!(f, "Direct({})", class.class_name()),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Named(name) => write!(f, "Named({name})"),
        }
    }
}

impl From<ModelClass> for ClassRef<ModelClass> {
    fn from(class: ModelClass) -> Self {
        Self::Direct(class)
    }
}

impl From<&ModelClass> for ClassRef<ModelClass> {
    fn from(class: &ModelClass) -> Self {
        Self::Direct(class.clone())
    }
}

impl From<&str> for ClassRef<ModelClass> {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<CollectionClass> for ClassRef<CollectionClass> {
    fn from(class: CollectionClass) -> Self {
        Self::Direct(class)
    }
}

impl From<&CollectionClass> for ClassRef<CollectionClass> {
    fn from(class: &CollectionClass) -> Self {
        Self::Direct(class.clone())
    }
}

impl From<&str> for ClassRef<CollectionClass> {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

/// A class reference that is resolved once and then cached.
pub(crate) struct LazyClass<C> {
    reference: ClassRef<C>,
    resolved: OnceLock<C>,
}

impl<C: NamedClass> LazyClass<C> {
    pub(crate) fn new(reference: ClassRef<C>) -> Self {
        let resolved = OnceLock::new();
        if let ClassRef::Direct(class) = &reference {
            let _ = resolved.set(class.clone());
        }
        Self {
            reference,
            resolved,
        }
    }

    pub(crate) fn resolve(&self) -> Result<C> {
        if let Some(class) = self.resolved.get() {
            return Ok(class.clone());
        }
        let class = match &self.reference {
            ClassRef::Direct(class) => Some(class.clone()),
            ClassRef::Deferred(factory) => factory(),
            ClassRef::Named(name) => C::lookup(name),
        }
        .ok_or_else(|| DataError::UnresolvedClass {
            name: self.describe(),
        })?;
        tracing::debug!(target: targets::ATTRIBUTE, class = %class.class_name(), "resolved nested {}", C::FAMILY);
        Ok(self.resolved.get_or_init(|| class).clone())
    }

    fn describe(&self) -> String {
        match &self.reference {
            ClassRef::Direct(class) => class.class_name(),
            ClassRef::Deferred(_) => format!("<deferred {}>", C::FAMILY),
            ClassRef::Named(name) => name.clone(),
        }
    }
}

impl<C: NamedClass> fmt::Debug for LazyClass<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.reference, f)
    }
}

/// Normalise a value assigned to a nested-model attribute.
///
/// Models pass through, plain objects are instantiated through the class,
/// anything else becomes `null`.
pub(crate) fn model_before_set(class: Option<&LazyClass<ModelClass>>, value: Value) -> Result<Value> {
    match value {
        Value::Model(_) => Ok(value),
        Value::Object(_) => match class {
            Some(class) => Ok(Value::Model(class.resolve()?.create(value)?)),
            None => Ok(Value::Null),
        },
        _ => Ok(Value::Null),
    }
}

/// Check that a nested-model value is null or an instance of the class.
pub(crate) fn model_after_set(
    attribute: &str,
    class: Option<&LazyClass<ModelClass>>,
    value: Value,
) -> Result<Value> {
    match &value {
        Value::Null => Ok(value),
        Value::Model(model) => match class {
            None => Ok(value),
            Some(class) => {
                let expected = class.resolve()?;
                if model.class().is_subclass_of(&expected) {
                    Ok(value)
                } else {
                    Err(DataError::type_mismatch(
                        attribute,
                        expected.name(),
                        model.class().name(),
                    ))
                }
            }
        },
        other => Err(DataError::type_mismatch(
            attribute,
            class
                .map(LazyClass::describe)
                .unwrap_or_else(|| "a model".to_string()),
            other.type_name(),
        )),
    }
}

/// Normalise a value assigned to a nested-collection attribute.
///
/// Collections pass through, arrays are instantiated through the class,
/// anything else becomes `null`.
pub(crate) fn collection_before_set(
    class: Option<&LazyClass<CollectionClass>>,
    value: Value,
) -> Result<Value> {
    match value {
        Value::Collection(_) => Ok(value),
        Value::Array(items) => match class {
            Some(class) => Ok(Value::Collection(class.resolve()?.create(items)?)),
            None => Ok(Value::Collection(Collection::from_items(items)?)),
        },
        _ => Ok(Value::Null),
    }
}

/// Check that a nested-collection value is null or an instance of the class.
pub(crate) fn collection_after_set(
    attribute: &str,
    class: Option<&LazyClass<CollectionClass>>,
    value: Value,
) -> Result<Value> {
    match &value {
        Value::Null => Ok(value),
        Value::Collection(collection) => match class {
            None => Ok(value),
            Some(class) => {
                let expected = class.resolve()?;
                if collection.class().is_subclass_of(&expected) {
                    Ok(value)
                } else {
                    Err(DataError::type_mismatch(
                        attribute,
                        expected.name(),
                        collection.class().name(),
                    ))
                }
            }
        },
        other => Err(DataError::type_mismatch(
            attribute,
            class
                .map(LazyClass::describe)
                .unwrap_or_else(|| "a collection".to_string()),
            other.type_name(),
        )),
    }
}

/// Whether a nested value counts as modified, for embedded attributes.
pub(crate) fn nested_is_modified(value: &Value) -> bool {
    match value {
        Value::Model(model) => model.is_dirty(),
        Value::Collection(collection) => collection.is_modified(),
        _ => false,
    }
}
