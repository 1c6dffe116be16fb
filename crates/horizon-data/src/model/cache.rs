//! Identity cache: at most one live model per class and id.

use std::collections::HashMap;
use std::sync::{OnceLock, Weak};

use parking_lot::Mutex;

use super::{Model, ModelClass, ModelInner};

/// Global identity cache.
static MODEL_CACHE: OnceLock<ModelCache> = OnceLock::new();

/// Weak references to live models, keyed by class id and id key.
///
/// Entries never keep a model alive; dead entries are pruned whenever the
/// table grows past its previous high-water mark.
struct ModelCache {
    entries: Mutex<CacheTable>,
}

#[derive(Default)]
struct CacheTable {
    models: HashMap<(u64, String), Weak<ModelInner>>,
    prune_at: usize,
}

fn model_cache() -> &'static ModelCache {
    MODEL_CACHE.get_or_init(|| ModelCache {
        entries: Mutex::new(CacheTable {
            models: HashMap::new(),
            prune_at: 64,
        }),
    })
}

/// The live instance of `class` with id `key`, if any.
pub(super) fn lookup(class: &ModelClass, key: &str) -> Option<Model> {
    let table = model_cache().entries.lock();
    table
        .models
        .get(&(class.class_id(), key.to_string()))
        .and_then(Weak::upgrade)
        .map(|inner| Model { inner })
}

/// Record `model` as the live instance for its class and `key`.
pub(super) fn register(model: &Model, key: &str) {
    let mut table = model_cache().entries.lock();
    table.models.insert(
        (model.class().class_id(), key.to_string()),
        std::sync::Arc::downgrade(&model.inner),
    );
    if table.models.len() > table.prune_at {
        table.models.retain(|_, weak| weak.strong_count() > 0);
        table.prune_at = (table.models.len() * 2).max(64);
    }
}

/// Drop the entry for `key` if it points at `model`.
pub(super) fn unregister(model: &Model, key: &str) {
    let mut table = model_cache().entries.lock();
    let entry_key = (model.class().class_id(), key.to_string());
    let points_here = table
        .models
        .get(&entry_key)
        .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), std::sync::Arc::as_ptr(&model.inner)));
    if points_here {
        table.models.remove(&entry_key);
    }
}
