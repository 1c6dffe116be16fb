//! Client-side data modeling for Horizon.
//!
//! This crate provides the pieces of an application's data layer:
//!
//! - **Observable**: named events with veto, bubbling, suspension and
//!   deferred listeners
//! - **Attributes**: typed attribute descriptors that coerce, default and
//!   compare values
//! - **Models**: attribute holders with change tracking, commit and rollback
//! - **Collections**: ordered, indexed sets of models that relay member events
//! - **Conversion**: cycle-safe flattening of model graphs into plain data
//! - **Proxies**: the persistence seam used by `load`, `save` and `destroy`
//!
//! # Example
//!
//! ```
//! use horizon_data::{Attribute, Collection, CollectionClass, ModelClass, Value};
//!
//! let task = ModelClass::builder("Task")
//!     .attribute("id")
//!     .attribute(Attribute::string("title"))
//!     .attribute(Attribute::boolean("done"))
//!     .build()
//!     .unwrap();
//! let tasks = CollectionClass::builder("Tasks").model_class(&task).build();
//!
//! let list = Collection::new(&tasks);
//! list.on("change:done", |event| {
//!     println!("{:?} is now done: {:?}", event.arg(1), event.arg(2));
//! });
//!
//! let added = list.add(Value::object([("title", "write docs")])).unwrap();
//! added[0].set("done", "yes").unwrap();
//! assert_eq!(added[0].get("done").unwrap(), Value::from(true));
//! ```
//!
//! # Threading
//!
//! Models, collections and observables are `Send + Sync` handles. Deferred
//! listener invocations run on the [`scheduler`] queue of the thread that
//! fired the event; the host drives it with [`scheduler::run_expired`].

pub mod attribute;
pub mod collection;
pub mod convert;
mod error;
pub mod logging;
pub mod model;
pub mod observable;
pub mod proxy;
pub mod registry;
pub mod scheduler;
mod value;

pub use attribute::{
    Attribute, AttributeBuilder, AttributeKind, ClassRef, DefaultTemplate, IntoAttribute,
    SetOutcome,
};
pub use collection::{Collection, CollectionClass, CollectionClassBuilder};
pub use convert::{ConvertOptions, NativeArray, NativeObject, NativeValue, convert};
pub use error::{DataError, Result};
pub use logging::PerfSpan;
pub use model::{ClientId, Model, ModelClass, ModelClassBuilder, PersistOptions};
pub use observable::{Event, EventName, HandlerResult, ListenerId, ListenerOptions, Observable};
pub use proxy::{MemoryProxy, Proxy, ProxyError, ProxyOptions};
pub use value::{Value, format_number};
