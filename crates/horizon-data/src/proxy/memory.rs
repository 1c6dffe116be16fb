//! In-memory proxy.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use parking_lot::Mutex;

use super::{Proxy, ProxyError, ProxyOptions};
use crate::convert::ConvertOptions;
use crate::logging::targets;
use crate::model::Model;
use crate::value::Value;

type PendingCompletion = Box<dyn FnOnce() + Send>;

struct MemoryState {
    records: BTreeMap<String, serde_json::Value>,
    next_id: u64,
    hold: bool,
    pending: VecDeque<PendingCompletion>,
    fail_next: Option<ProxyError>,
}

/// A proxy that keeps records in memory, keyed by id.
///
/// `create` assigns ascending numeric ids. Records are stored in their JSON
/// form, so nested models are flattened the same way a remote store would
/// see them.
///
/// With [`hold_completions`](Self::hold_completions) enabled, asynchronous
/// operations do their work immediately but their callbacks wait until
/// [`complete_pending`](Self::complete_pending) is called. This simulates a
/// request that is still in flight.
pub struct MemoryProxy {
    state: Mutex<MemoryState>,
}

impl Default for MemoryProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProxy {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                records: BTreeMap::new(),
                next_id: 1,
                hold: false,
                pending: VecDeque::new(),
                fail_next: None,
            }),
        }
    }

    /// Hold asynchronous completions until [`complete_pending`](Self::complete_pending).
    pub fn hold_completions(&self, hold: bool) {
        self.state.lock().hold = hold;
    }

    /// Deliver every held completion, oldest first. Returns how many ran.
    pub fn complete_pending(&self) -> usize {
        let mut count = 0;
        // Completions may start new operations, which may be held again.
        loop {
            let next = self.state.lock().pending.pop_front();
            let Some(completion) = next else {
                break;
            };
            completion();
            count += 1;
        }
        count
    }

    /// The number of held completions.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Make the next operation fail with `error`.
    pub fn fail_next(&self, error: ProxyError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Put a record directly into the store.
    pub fn insert_record(&self, id: impl Into<String>, record: serde_json::Value) {
        self.state.lock().records.insert(id.into(), record);
    }

    /// A stored record.
    pub fn record(&self, id: &str) -> Option<serde_json::Value> {
        self.state.lock().records.get(id).cloned()
    }

    /// The number of stored records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run an operation, honouring `fail_next`, and deliver its outcome.
    fn run<F>(&self, options: ProxyOptions, operation: F)
    where
        F: FnOnce() -> Result<Option<Value>, ProxyError>,
    {
        let failure = self.state.lock().fail_next.take();
        let outcome = match failure {
            Some(err) => Err(err),
            None => operation(),
        };
        if let Err(err) = &outcome {
            tracing::warn!(target: targets::PROXY, error = %err, "memory proxy operation failed");
        }

        let held = options.asynchronous && self.state.lock().hold;
        let deliver = move || match outcome {
            Ok(response) => options.succeed(response),
            Err(err) => options.fail(err),
        };
        if held {
            self.state.lock().pending.push_back(Box::new(deliver));
        } else {
            deliver();
        }
    }

    fn create_record(&self, model: &Model) -> Result<Option<Value>, ProxyError> {
        let mut record = persisted_payload(model)?;
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            id
        };
        let id_attribute = model.id_attribute_name().to_string();
        if let serde_json::Value::Object(map) = &mut record {
            map.insert(id_attribute.clone(), serde_json::Value::from(id));
        }
        self.state.lock().records.insert(id.to_string(), record);
        tracing::debug!(target: targets::PROXY, id, "memory proxy created record");
        Ok(Some(Value::object([(id_attribute, Value::from(id))])))
    }

    fn read_record(&self, model: &Model) -> Result<Option<Value>, ProxyError> {
        let key = model_key(model)?;
        let record = self.state.lock().records.get(&key).cloned();
        match record {
            Some(record) => Ok(Some(Value::from(record))),
            None => Err(ProxyError::NotFound { id: key }),
        }
    }

    fn update_record(&self, model: &Model) -> Result<Option<Value>, ProxyError> {
        if model
            .get_changes(&ConvertOptions::persisted_raw())
            .is_empty()
        {
            return Ok(None);
        }
        let key = model_key(model)?;
        let record = persisted_payload(model)?;
        tracing::debug!(target: targets::PROXY, id = %key, "memory proxy updated record");
        self.state.lock().records.insert(key, record);
        Ok(None)
    }

    fn destroy_record(&self, model: &Model) -> Result<Option<Value>, ProxyError> {
        let key = model_key(model)?;
        tracing::debug!(target: targets::PROXY, id = %key, "memory proxy removed record");
        self.state.lock().records.remove(&key);
        Ok(None)
    }
}

fn persisted_payload(model: &Model) -> Result<serde_json::Value, ProxyError> {
    let data = model.get_data(&ConvertOptions::persisted_raw());
    Ok(data.to_json()?)
}

fn model_key(model: &Model) -> Result<String, ProxyError> {
    let id = model.get_id()?;
    id.id_key().ok_or(ProxyError::MissingId)
}

impl Proxy for MemoryProxy {
    fn create(&self, model: &Model, options: ProxyOptions) {
        self.run(options, || self.create_record(model));
    }

    fn read(&self, model: &Model, options: ProxyOptions) {
        self.run(options, || self.read_record(model));
    }

    fn update(&self, model: &Model, options: ProxyOptions) {
        self.run(options, || self.update_record(model));
    }

    fn destroy(&self, model: &Model, options: ProxyOptions) {
        self.run(options, || self.destroy_record(model));
    }
}

impl fmt::Debug for MemoryProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryProxy")
            .field("records", &state.records.len())
            .field("pending", &state.pending.len())
            .field("hold", &state.hold)
            .finish()
    }
}
