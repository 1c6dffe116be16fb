//! Model classes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Model, cache};
use crate::attribute::{Attribute, IntoAttribute};
use crate::error::{DataError, Result};
use crate::logging::targets;
use crate::proxy::Proxy;
use crate::value::Value;

/// Hook run once at the end of model construction.
pub type InitHook = Arc<dyn Fn(&Model) + Send + Sync>;

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

struct ModelClassInner {
    id: u64,
    name: String,
    parent: Option<ModelClass>,
    attributes: Vec<Attribute>,
    index: HashMap<String, usize>,
    id_attribute: String,
    proxy: Option<Arc<dyn Proxy>>,
    init: Option<InitHook>,
}

/// A model type: its merged attribute table and class-level configuration.
///
/// Built once with [`ModelClass::builder`] and shared by every instance.
/// Cloning is cheap.
///
/// # Inheritance
///
/// A class built with [`extends`](ModelClassBuilder::extends) starts from
/// its parent's attribute table. Attributes declared again by name replace
/// the inherited descriptor in place; new names are appended. The id
/// attribute name, proxy and init hook are inherited unless overridden.
///
/// ```
/// use horizon_data::{Attribute, ModelClass};
///
/// let person = ModelClass::builder("Person")
///     .attribute("id")
///     .attribute(Attribute::string("name"))
///     .build()
///     .unwrap();
/// let employee = ModelClass::builder("Employee")
///     .extends(&person)
///     .attribute(Attribute::string("name").use_null(true))
///     .attribute(Attribute::float("salary"))
///     .build()
///     .unwrap();
///
/// assert_eq!(employee.attribute_names(), vec!["id", "name", "salary"]);
/// assert!(employee.is_subclass_of(&person));
/// ```
#[derive(Clone)]
pub struct ModelClass {
    inner: Arc<ModelClassInner>,
}

impl ModelClass {
    /// Start configuring a model class.
    pub fn builder(name: impl Into<String>) -> ModelClassBuilder {
        ModelClassBuilder::new(name.into())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Process-unique identity of the class.
    pub fn class_id(&self) -> u64 {
        self.inner.id
    }

    pub fn parent(&self) -> Option<&ModelClass> {
        self.inner.parent.as_ref()
    }

    /// The merged attribute table, in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.inner.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.inner
            .index
            .get(name)
            .map(|&position| &self.inner.attributes[position])
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.index.contains_key(name)
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.inner.attributes.iter().map(Attribute::name).collect()
    }

    /// The name of the attribute holding the persistence id.
    pub fn id_attribute_name(&self) -> &str {
        &self.inner.id_attribute
    }

    /// The id attribute, if the class declares it.
    pub fn id_attribute(&self) -> Option<&Attribute> {
        self.attribute(&self.inner.id_attribute)
    }

    pub fn proxy(&self) -> Option<&Arc<dyn Proxy>> {
        self.inner.proxy.as_ref()
    }

    pub(crate) fn init_hook(&self) -> Option<&InitHook> {
        self.inner.init.as_ref()
    }

    /// Whether this class is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &ModelClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.ptr_eq(other) {
                return true;
            }
            current = class.parent();
        }
        false
    }

    /// Whether two handles refer to the same class.
    pub fn ptr_eq(&self, other: &ModelClass) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Construct a new instance without looking in the identity cache.
    pub fn new_model(&self, data: impl Into<Value>) -> Result<Model> {
        Model::new(self, data)
    }

    /// Construct an instance through the identity cache.
    ///
    /// If `data` carries an id and a live instance of this class already has
    /// that id, `data` is applied to it and committed, and that instance is
    /// returned. Otherwise a new instance is constructed.
    pub fn create(&self, data: impl Into<Value>) -> Result<Model> {
        let data = data.into();
        let id_key = data
            .as_object()
            .and_then(|map| map.get(self.id_attribute_name()))
            .and_then(Value::id_key);

        if let Some(key) = &id_key
            && let Some(existing) = cache::lookup(self, key)
        {
            tracing::trace!(target: targets::MODEL, class = self.name(), id = %key, "identity cache hit");
            existing.set_many(data)?;
            existing.commit();
            return Ok(existing);
        }

        // Setting the id during construction registers the new instance.
        Model::new(self, data)
    }
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.inner.name)
            .field("attributes", &self.attribute_names())
            .field("id_attribute", &self.inner.id_attribute)
            .field("has_proxy", &self.inner.proxy.is_some())
            .finish()
    }
}

/// Builder for [`ModelClass`].
pub struct ModelClassBuilder {
    name: String,
    parent: Option<ModelClass>,
    declared: Vec<Attribute>,
    error: Option<DataError>,
    id_attribute: Option<String>,
    proxy: Option<Arc<dyn Proxy>>,
    init: Option<InitHook>,
}

impl ModelClassBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            parent: None,
            declared: Vec::new(),
            error: None,
            id_attribute: None,
            proxy: None,
            init: None,
        }
    }

    /// Inherit from `parent`.
    pub fn extends(mut self, parent: &ModelClass) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Declare one attribute.
    pub fn attribute(mut self, attribute: impl IntoAttribute) -> Self {
        match attribute.into_attribute() {
            Ok(attribute) => merge_into(&mut self.declared, attribute),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    /// Declare several attributes of the same form.
    pub fn attributes<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoAttribute,
    {
        for attribute in attributes {
            self = self.attribute(attribute);
        }
        self
    }

    /// Declare further attributes on top of the ones already given.
    ///
    /// Behaves like [`attributes`](Self::attributes); kept as a separate entry
    /// point for subclasses that only extend their parent's table.
    pub fn add_attributes<I>(self, attributes: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoAttribute,
    {
        self.attributes(attributes)
    }

    /// The attribute holding the persistence id (default `"id"`).
    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = Some(name.into());
        self
    }

    /// The proxy used by `load`, `save` and `destroy`.
    pub fn proxy(mut self, proxy: Arc<dyn Proxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Hook run at the end of every construction.
    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model) + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(hook));
        self
    }

    /// Merge the attribute tables and finish configuration.
    pub fn build(self) -> Result<ModelClass> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let mut attributes = self
            .parent
            .as_ref()
            .map(|parent| parent.attributes().to_vec())
            .unwrap_or_default();
        for attribute in self.declared {
            merge_into(&mut attributes, attribute);
        }
        let index = attributes
            .iter()
            .enumerate()
            .map(|(position, attribute)| (attribute.name().to_string(), position))
            .collect();

        let parent = self.parent;
        let id_attribute = self
            .id_attribute
            .or_else(|| parent.as_ref().map(|p| p.id_attribute_name().to_string()))
            .unwrap_or_else(|| "id".to_string());
        let proxy = self
            .proxy
            .or_else(|| parent.as_ref().and_then(|p| p.proxy().cloned()));
        let init = self
            .init
            .or_else(|| parent.as_ref().and_then(|p| p.init_hook().cloned()));

        tracing::debug!(
            target: targets::MODEL,
            class = %self.name,
            parent = parent.as_ref().map(ModelClass::name),
            attributes = attributes.len(),
            "built model class"
        );

        Ok(ModelClass {
            inner: Arc::new(ModelClassInner {
                id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
                name: self.name,
                parent,
                attributes,
                index,
                id_attribute,
                proxy,
                init,
            }),
        })
    }
}

/// Replace a same-named attribute in place, or append.
fn merge_into(attributes: &mut Vec<Attribute>, attribute: Attribute) {
    match attributes
        .iter()
        .position(|existing| existing.name() == attribute.name())
    {
        Some(position) => attributes[position] = attribute,
        None => attributes.push(attribute),
    }
}

static_assertions::assert_impl_all!(ModelClass: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeKind;

    #[test]
    fn test_merge_replaces_in_place() {
        let base = ModelClass::builder("Base")
            .attributes(["id", "a", "b"])
            .build()
            .unwrap();
        let derived = ModelClass::builder("Derived")
            .extends(&base)
            .attribute(Attribute::integer("a"))
            .add_attributes(["c"])
            .build()
            .unwrap();

        assert_eq!(derived.attribute_names(), vec!["id", "a", "b", "c"]);
        assert_eq!(
            derived.attribute("a").unwrap().kind(),
            AttributeKind::Integer
        );
        assert_eq!(base.attribute("a").unwrap().kind(), AttributeKind::Mixed);
        assert!(!base.has_attribute("c"));
    }

    #[test]
    fn test_inherits_configuration() {
        let base = ModelClass::builder("Base")
            .attribute("key")
            .id_attribute("key")
            .on_init(|_| {})
            .build()
            .unwrap();
        let derived = ModelClass::builder("Derived")
            .extends(&base)
            .build()
            .unwrap();

        assert_eq!(derived.id_attribute_name(), "key");
        assert!(derived.id_attribute().is_some());
        assert!(derived.init_hook().is_some());
        assert!(derived.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&derived));
    }

    #[test]
    fn test_attribute_errors_surface_at_build() {
        let err = ModelClass::builder("Broken")
            .attribute("")
            .build()
            .unwrap_err();
        assert_eq!(err, DataError::MissingAttributeName);
    }

    #[test]
    fn test_class_ids_are_unique() {
        let a = ModelClass::builder("A").build().unwrap();
        let b = ModelClass::builder("A").build().unwrap();
        assert_ne!(a.class_id(), b.class_id());
        assert!(!a.ptr_eq(&b));
    }
}
