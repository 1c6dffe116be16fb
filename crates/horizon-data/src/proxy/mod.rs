//! Persistence proxies.
//!
//! A [`Proxy`] moves model data to and from some store. Models call into
//! their class's proxy from [`Model::load`], [`Model::save`] and
//! [`Model::destroy`]; the proxy reports back through the callbacks in
//! [`ProxyOptions`], either before returning or later.
//!
//! [`MemoryProxy`] keeps records in memory and is what tests use to simulate
//! a remote store. The `horizon-data-rest` crate provides an HTTP proxy.

mod memory;

use std::fmt;

use crate::model::Model;
use crate::value::Value;

pub use memory::MemoryProxy;

/// Failure of a persistence operation.
///
/// Proxy failures are never returned from `load`/`save`/`destroy`; they are
/// delivered to the operation's `error` callback and leave the model's
/// in-memory state untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProxyError {
    /// The store has no record for the model.
    #[error("No record found for id '{id}'")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// The model cannot be addressed because it has no id yet.
    #[error("Model has no id to address the record with")]
    MissingId,

    /// The transport failed before a response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered with an error status.
    #[error("Request failed with status {status}: {message}")]
    Status {
        /// The status code.
        status: u16,
        /// The status text or response body.
        message: String,
    },

    /// The response could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be encoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The store refused the operation.
    #[error("Operation rejected: {0}")]
    Rejected(String),
}

impl From<crate::error::DataError> for ProxyError {
    fn from(err: crate::error::DataError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

type SuccessCallback = Box<dyn FnOnce(Option<Value>) + Send>;
type ErrorCallback = Box<dyn FnOnce(ProxyError) + Send>;
type CompleteCallback = Box<dyn FnOnce() + Send>;

/// Options handed to a proxy operation.
///
/// Exactly one of [`succeed`](Self::succeed) or [`fail`](Self::fail) must be
/// called, once; both consume the options.
pub struct ProxyOptions {
    /// Whether the caller allows the operation to complete after returning.
    pub asynchronous: bool,
    success: SuccessCallback,
    error: ErrorCallback,
    complete: CompleteCallback,
}

impl ProxyOptions {
    /// Options with the given callbacks.
    pub fn new<S, E, C>(asynchronous: bool, success: S, error: E, complete: C) -> Self
    where
        S: FnOnce(Option<Value>) + Send + 'static,
        E: FnOnce(ProxyError) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self {
            asynchronous,
            success: Box::new(success),
            error: Box::new(error),
            complete: Box::new(complete),
        }
    }

    /// Options whose callbacks do nothing.
    pub fn noop() -> Self {
        Self::new(true, |_| {}, |_| {}, || {})
    }

    /// Report success, with the response data if the store sent any, then
    /// completion.
    pub fn succeed(self, response: Option<Value>) {
        (self.success)(response);
        (self.complete)();
    }

    /// Report failure, then completion.
    pub fn fail(self, error: ProxyError) {
        (self.error)(error);
        (self.complete)();
    }
}

impl fmt::Debug for ProxyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyOptions")
            .field("asynchronous", &self.asynchronous)
            .finish_non_exhaustive()
    }
}

/// A persistence adapter.
///
/// `read` reports the stored data as its success response; the model applies
/// and commits it. `create` may report data assigned by the store (usually
/// the id). `update` must report success without contacting the store when
/// the model has no pending changes.
pub trait Proxy: Send + Sync {
    /// Store a model that has no id yet.
    fn create(&self, model: &Model, options: ProxyOptions);

    /// Fetch a model's data.
    fn read(&self, model: &Model, options: ProxyOptions);

    /// Store changes to an existing model.
    fn update(&self, model: &Model, options: ProxyOptions);

    /// Delete a model.
    fn destroy(&self, model: &Model, options: ProxyOptions);
}
