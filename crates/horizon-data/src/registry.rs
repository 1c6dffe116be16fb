//! Global registry of named model and collection classes.
//!
//! Nested attributes can refer to their class by name
//! ([`ClassRef::Named`](crate::attribute::ClassRef::Named)). The name is
//! looked up here the first time the attribute needs the class, so two
//! classes may refer to each other regardless of which one is built first.
//!
//! ```
//! use horizon_data::{ModelClass, registry};
//!
//! let user = ModelClass::builder("User").attribute("id").build().unwrap();
//! registry::register_model_class(&user);
//! assert!(registry::model_class("User").is_some());
//! ```

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::collection::CollectionClass;
use crate::model::ModelClass;

/// Global class registry.
static CLASS_REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();

/// Name to class tables for model and collection classes.
pub struct ClassRegistry {
    models: RwLock<HashMap<String, ModelClass>>,
    collections: RwLock<HashMap<String, CollectionClass>>,
}

impl ClassRegistry {
    fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a model class under its name, replacing any previous entry.
    pub fn register_model_class(&self, class: &ModelClass) {
        crate::data_debug!(class = class.name(), "registered model class");
        self.models
            .write()
            .insert(class.name().to_string(), class.clone());
    }

    /// Register a collection class under its name, replacing any previous entry.
    pub fn register_collection_class(&self, class: &CollectionClass) {
        crate::data_debug!(class = class.name(), "registered collection class");
        self.collections
            .write()
            .insert(class.name().to_string(), class.clone());
    }

    pub fn model_class(&self, name: &str) -> Option<ModelClass> {
        self.models.read().get(name).cloned()
    }

    pub fn collection_class(&self, name: &str) -> Option<CollectionClass> {
        self.collections.read().get(name).cloned()
    }

    /// Remove a model class. Returns the removed class, if any.
    pub fn unregister_model_class(&self, name: &str) -> Option<ModelClass> {
        self.models.write().remove(name)
    }

    /// Remove a collection class. Returns the removed class, if any.
    pub fn unregister_collection_class(&self, name: &str) -> Option<CollectionClass> {
        self.collections.write().remove(name)
    }
}

/// Get the global class registry.
pub fn class_registry() -> &'static ClassRegistry {
    CLASS_REGISTRY.get_or_init(ClassRegistry::new)
}

/// Register a model class in the global registry.
pub fn register_model_class(class: &ModelClass) {
    class_registry().register_model_class(class);
}

/// Register a collection class in the global registry.
pub fn register_collection_class(class: &CollectionClass) {
    class_registry().register_collection_class(class);
}

/// Look up a model class in the global registry.
pub fn model_class(name: &str) -> Option<ModelClass> {
    class_registry().model_class(name)
}

/// Look up a collection class in the global registry.
pub fn collection_class(name: &str) -> Option<CollectionClass> {
    class_registry().collection_class(name)
}

/// Remove a model class from the global registry.
pub fn unregister_model_class(name: &str) -> Option<ModelClass> {
    class_registry().unregister_model_class(name)
}

/// Remove a collection class from the global registry.
pub fn unregister_collection_class(name: &str) -> Option<CollectionClass> {
    class_registry().unregister_collection_class(name)
}
