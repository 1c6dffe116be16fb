//! REST persistence for Horizon Data models.
//!
//! [`RestProxy`] implements [`horizon_data::Proxy`] over HTTP with a JSON
//! wire format:
//!
//! | Action  | Method | URL                      | Body                  |
//! |---------|--------|--------------------------|-----------------------|
//! | create  | POST   | `url_root`               | persisted data        |
//! | read    | GET    | `url_root/<id>`          |                       |
//! | update  | PUT    | `url_root/<id>`          | persisted data or changes |
//! | destroy | DELETE | `url_root/<id>`          |                       |
//!
//! The id segment is percent-encoded and can be turned off with
//! [`RestProxyConfig::append_id`]. Create and read response bodies are
//! applied to the model as attribute data; update responses are not. An
//! empty body means the server sent nothing back.
//!
//! # Threading
//!
//! Synchronous operations ([`PersistOptions::synchronous`]) block the
//! calling thread. Asynchronous ones are sent from a worker thread owned by
//! the proxy, and their callbacks are queued until the thread that owns the
//! models calls [`RestProxy::dispatch_completed`], typically once per pass of
//! its event loop.
//!
//! [`PersistOptions::synchronous`]: horizon_data::PersistOptions::synchronous

mod config;
mod error;
mod proxy;
pub mod request;

pub use config::RestProxyConfig;
pub use error::{RestError, Result};
pub use proxy::RestProxy;
pub use request::{Prepared, RestAction, RestRequest};
