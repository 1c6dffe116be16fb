//! Loading, saving and destroying models through their class's proxy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::Model;
use crate::error::{DataError, Result};
use crate::logging::{PerfSpan, span_names, targets};
use crate::observable::EventName;
use crate::proxy::{Proxy, ProxyError, ProxyOptions};
use crate::value::Value;

type ModelCallback = Box<dyn FnOnce(&Model) + Send>;
type ModelErrorCallback = Box<dyn FnOnce(&Model, &ProxyError) + Send>;

/// Options for [`Model::load`], [`Model::save`] and [`Model::destroy`].
///
/// ```
/// use horizon_data::model::PersistOptions;
///
/// let options = PersistOptions::new()
///     .on_success(|model| println!("saved {}", model.client_id()))
///     .on_error(|_, err| eprintln!("save failed: {err}"));
/// # let _ = options;
/// ```
pub struct PersistOptions {
    asynchronous: bool,
    success: Option<ModelCallback>,
    error: Option<ModelErrorCallback>,
    complete: Option<ModelCallback>,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistOptions {
    /// Asynchronous options without callbacks.
    pub fn new() -> Self {
        Self {
            asynchronous: true,
            success: None,
            error: None,
            complete: None,
        }
    }

    /// Ask the proxy to complete before returning.
    pub fn synchronous() -> Self {
        Self::new().asynchronous(false)
    }

    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Called after the model has applied a successful response.
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Model) + Send + 'static,
    {
        self.success = Some(Box::new(callback));
        self
    }

    /// Called when the proxy reports a failure. The model is left untouched.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Model, &ProxyError) + Send + 'static,
    {
        self.error = Some(Box::new(callback));
        self
    }

    /// Called after success or error.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Model) + Send + 'static,
    {
        self.complete = Some(Box::new(callback));
        self
    }

    /// Build the proxy-level options, wiring the model's own handling in
    /// front of the caller's callbacks.
    fn into_proxy_options<S>(self, model: &Model, on_success: S) -> ProxyOptions
    where
        S: FnOnce(&Model, Option<Value>) + Send + 'static,
    {
        let Self {
            asynchronous,
            success,
            error,
            complete,
        } = self;
        let (for_success, for_error, for_complete) = (model.clone(), model.clone(), model.clone());
        ProxyOptions::new(
            asynchronous,
            move |response| {
                on_success(&for_success, response);
                if let Some(callback) = success {
                    callback(&for_success);
                }
            },
            move |err| {
                for_error.finish_operation();
                tracing::warn!(target: targets::MODEL, client_id = %for_error.client_id(), error = %err, "persistence operation failed");
                if let Some(callback) = error {
                    callback(&for_error, &err);
                }
            },
            move || {
                if let Some(callback) = complete {
                    callback(&for_complete);
                }
            },
        )
    }
}

impl fmt::Debug for PersistOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistOptions")
            .field("asynchronous", &self.asynchronous)
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

impl Model {
    fn require_proxy(&self) -> Result<Arc<dyn Proxy>> {
        self.class()
            .proxy()
            .cloned()
            .ok_or_else(|| DataError::MissingProxy {
                model: self.class().name().to_string(),
            })
    }

    fn finish_operation(&self) {
        let mut state = self.inner.state.lock();
        state.loading = false;
        state.saving = false;
    }

    /// Apply response data from a store. Keys that are not declared
    /// attributes, or that are listed in `skip`, are ignored.
    fn apply_response(&self, response: Value, skip: &[String]) -> Result<Vec<String>> {
        let Value::Object(map) = response else {
            return Ok(Vec::new());
        };
        let mut applied = Vec::with_capacity(map.len());
        for (name, value) in map {
            if !self.has_attribute(&name) {
                tracing::trace!(target: targets::MODEL, attribute = %name, "ignoring undeclared key in response");
                continue;
            }
            if skip.contains(&name) {
                tracing::trace!(target: targets::MODEL, attribute = %name, "keeping value edited while saving");
                continue;
            }
            self.set(&name, value)?;
            applied.push(name);
        }
        Ok(applied)
    }

    /// Fetch this model's data through the proxy.
    ///
    /// On success the response is applied, the model is committed and `load`
    /// fires. Fails immediately if the class has no proxy.
    pub fn load(&self, options: PersistOptions) -> Result<()> {
        let proxy = self.require_proxy()?;
        let _span = PerfSpan::new(span_names::PERSIST);
        self.inner.state.lock().loading = true;
        tracing::debug!(target: targets::MODEL, client_id = %self.client_id(), "loading");

        let proxy_options = options.into_proxy_options(self, |model, response| {
            model.finish_operation();
            if let Some(response) = response
                && let Err(err) = model.apply_response(response, &[])
            {
                tracing::warn!(target: targets::MODEL, error = %err, "could not apply loaded data");
            }
            model.commit();
            model.emit(EventName::Load, Vec::new());
        });
        proxy.read(self, proxy_options);
        Ok(())
    }

    /// Store this model through the proxy: `create` when it has no id yet,
    /// `update` otherwise.
    ///
    /// The data is snapshotted when the request is issued. On success the
    /// model is committed; attributes that changed again while the request
    /// was in flight are then marked modified once more, with their
    /// snapshotted value as rollback target, and `save` fires. A create
    /// response is applied except for attributes edited in flight. An update
    /// response is not applied. Fails immediately if the class has no proxy.
    pub fn save(&self, options: PersistOptions) -> Result<()> {
        let proxy = self.require_proxy()?;
        let _span = PerfSpan::new(span_names::PERSIST);
        let is_new = self.is_new();
        let snapshot = {
            let mut state = self.inner.state.lock();
            state.saving = true;
            state.data.clone()
        };
        tracing::debug!(target: targets::MODEL, client_id = %self.client_id(), is_new, "saving");

        let proxy_options = options.into_proxy_options(self, move |model, response| {
            model.finish_operation();
            let mut snapshot = snapshot;
            match response {
                Some(response) if is_new => {
                    let edited: Vec<String> = model
                        .changes_since(&snapshot)
                        .into_iter()
                        .map(|(name, _)| name)
                        .collect();
                    match model.apply_response(response, &edited) {
                        Ok(applied) => {
                            let state = model.inner.state.lock();
                            for name in applied {
                                let value = state.data.get(&name).cloned().unwrap_or_default();
                                snapshot.insert(name, value);
                            }
                        }
                        Err(err) => {
                            tracing::warn!(target: targets::MODEL, error = %err, "could not apply save response");
                        }
                    }
                }
                Some(_) => {
                    tracing::trace!(target: targets::MODEL, client_id = %model.client_id(), "ignoring update response data");
                }
                None => {}
            }
            model.commit();
            model.remark_changes_since(&snapshot);
            model.emit(EventName::Save, Vec::new());
        });
        if is_new {
            proxy.create(self, proxy_options);
        } else {
            proxy.update(self, proxy_options);
        }
        Ok(())
    }

    /// Attributes whose stored value differs from `snapshot`, paired with
    /// their snapshot value.
    fn changes_since(&self, snapshot: &HashMap<String, Value>) -> Vec<(String, Value)> {
        let state = self.inner.state.lock();
        self.class()
            .attributes()
            .iter()
            .filter_map(|attribute| {
                let name = attribute.name();
                let before = snapshot.get(name);
                let differs = match (before, state.data.get(name)) {
                    (Some(before), Some(now)) => !attribute.values_are_equal(before, now),
                    (None, None) => false,
                    _ => true,
                };
                differs.then(|| (name.to_string(), before.cloned().unwrap_or_default()))
            })
            .collect()
    }

    /// Mark every attribute whose stored value differs from `snapshot` as
    /// modified, with the snapshot value as its rollback target.
    fn remark_changes_since(&self, snapshot: &HashMap<String, Value>) {
        let changes = self.changes_since(snapshot);
        if changes.is_empty() {
            return;
        }
        let remarked = changes.len();
        {
            let mut state = self.inner.state.lock();
            state.modified.extend(changes);
            state.dirty = true;
        }
        tracing::debug!(target: targets::MODEL, client_id = %self.client_id(), remarked, "attributes changed while saving");
    }

    /// Delete this model through the proxy.
    ///
    /// On success the model is marked destroyed and fires `beforedestroy`
    /// followed by `destroy`. Collections drop the model on `beforedestroy`.
    /// Fails immediately if the class has no proxy.
    pub fn destroy(&self, options: PersistOptions) -> Result<()> {
        let proxy = self.require_proxy()?;
        let _span = PerfSpan::new(span_names::PERSIST);
        tracing::debug!(target: targets::MODEL, client_id = %self.client_id(), "destroying");

        let proxy_options = options.into_proxy_options(self, |model, _response| {
            model.finish_operation();
            model.inner.state.lock().destroyed = true;
            if let Ok(id) = model.get_id()
                && let Some(key) = id.id_key()
            {
                super::cache::unregister(model, &key);
            }
            model.emit(EventName::BeforeDestroy, Vec::new());
            model.emit(EventName::Destroy, Vec::new());
        });
        proxy.destroy(self, proxy_options);
        Ok(())
    }
}
