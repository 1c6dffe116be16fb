//! Named-event hub shared by models and collections.
//!
//! An [`Observable`] keeps an ordered list of listeners per [`EventName`] and
//! dispatches firings to them synchronously, in registration order. On top of
//! plain dispatch it supports:
//!
//! - **Veto**: a handler returning `false` (or [`HandlerResult::Veto`]) makes
//!   [`fire_event`](Observable::fire_event) return `false`. Remaining handlers
//!   still run.
//! - **Bubbling**: events enabled with [`enable_bubble`](Observable::enable_bubble)
//!   are re-fired on a parent observable after local dispatch.
//! - **The `all` meta-event**: every firing is also delivered to `all`
//!   listeners, which receive the original [`Event`] so they can inspect its
//!   name.
//! - **Suspension**: firings are dropped or queued while suspended.
//! - **Deferred listeners**: `delay`, `buffer`, `single` and `target` options,
//!   see [`ListenerOptions`].
//!
//! # Thread Safety
//!
//! `Observable` is a cheap, clonable, `Send + Sync` handle. The listener table
//! is guarded by a `parking_lot::Mutex`, which is never held while a handler
//! runs, so handlers may freely add or remove listeners and fire further
//! events. Deferred invocations are scheduled on the firing thread's
//! [`scheduler`](crate::scheduler) queue.
//!
//! # Example
//!
//! ```
//! use horizon_data::observable::{EventName, Observable};
//! use horizon_data::Value;
//!
//! let hub = Observable::new();
//! hub.add_events(["ping"]);
//! hub.add_listener("ping", |event| {
//!     println!("{} fired with {:?}", event.name, event.args);
//! });
//! assert!(hub.fire_event("ping", vec![Value::from(1)]));
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;
use crate::scheduler::{self, ScheduledTask};
use crate::value::Value;

new_key_type! {
    /// A unique identifier for a registered listener.
    ///
    /// Returned by [`Observable::add_listener`] and used to remove it again.
    pub struct ListenerId;
}

/// Process-unique identity of an observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservableId(u64);

impl ObservableId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObservableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs-{}", self.0)
    }
}

/// The name of an event.
///
/// The well-known events fired by models and collections have their own
/// variants; anything else is [`EventName::Custom`]. The string forms
/// (`"change"`, `"change:name"`, `"idchange"`, ...) are parsed
/// case-insensitively by the `From<&str>` conversion and produced by
/// `Display`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Any attribute of a model changed.
    Change,
    /// The named attribute changed.
    AttributeChange(String),
    /// Pending modifications were committed.
    Commit,
    /// Pending modifications were rolled back.
    Rollback,
    /// A model was destroyed.
    Destroy,
    /// A model is about to announce its destruction.
    BeforeDestroy,
    /// A model's persistence id changed.
    IdChange,
    /// Models were added to a collection.
    Add,
    /// Models were removed from a collection.
    Remove,
    /// A model finished loading.
    Load,
    /// A model finished saving.
    Save,
    /// The wildcard meta-event.
    All,
    /// Any other event, stored lowercased.
    Custom(String),
}

impl EventName {
    /// The attribute-specific change event for `attribute`.
    pub fn attribute_change(attribute: impl Into<String>) -> Self {
        Self::AttributeChange(attribute.into())
    }

    /// Whether this is the change event for a single attribute.
    pub fn is_attribute_change(&self) -> bool {
        matches!(self, Self::AttributeChange(_))
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Change => f.write_str("change"),
            Self::AttributeChange(attr) => write!(f, "change:{attr}"),
            Self::Commit => f.write_str("commit"),
            Self::Rollback => f.write_str("rollback"),
            Self::Destroy => f.write_str("destroy"),
            Self::BeforeDestroy => f.write_str("beforedestroy"),
            Self::IdChange => f.write_str("idchange"),
            Self::Add => f.write_str("add"),
            Self::Remove => f.write_str("remove"),
            Self::Load => f.write_str("load"),
            Self::Save => f.write_str("save"),
            Self::All => f.write_str("all"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        if let Some((prefix, attr)) = name.split_once(':')
            && prefix.eq_ignore_ascii_case("change")
        {
            return Self::AttributeChange(attr.to_string());
        }
        match name.to_ascii_lowercase().as_str() {
            "change" => Self::Change,
            "commit" => Self::Commit,
            "rollback" => Self::Rollback,
            "destroy" => Self::Destroy,
            "beforedestroy" => Self::BeforeDestroy,
            "idchange" => Self::IdChange,
            "add" => Self::Add,
            "remove" => Self::Remove,
            "load" => Self::Load,
            "save" => Self::Save,
            "all" => Self::All,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<&EventName> for EventName {
    fn from(name: &EventName) -> Self {
        name.clone()
    }
}

/// A single firing, as seen by a handler.
#[derive(Debug, Clone)]
pub struct Event {
    /// The name the event was fired under.
    pub name: EventName,
    /// The observable that originally fired the event. Preserved while the
    /// event bubbles.
    pub source: ObservableId,
    /// Positional arguments.
    pub args: Vec<Value>,
}

static UNDEFINED: Value = Value::Undefined;

impl Event {
    /// The argument at `index`, or `Undefined` if absent.
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&UNDEFINED)
    }
}

/// The outcome of a handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerResult {
    /// Let the firing proceed.
    #[default]
    Continue,
    /// Object to the firing. Other handlers still run, but the aggregate
    /// result is `false` and the event does not bubble.
    Veto,
}

impl From<()> for HandlerResult {
    fn from(_: ()) -> Self {
        Self::Continue
    }
}

impl From<bool> for HandlerResult {
    fn from(proceed: bool) -> Self {
        if proceed { Self::Continue } else { Self::Veto }
    }
}

/// Options controlling how a listener is invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Defer each invocation by this long. Every firing is scheduled
    /// independently.
    pub delay: Option<Duration>,
    /// Remove the listener after its first invocation.
    pub single: bool,
    /// Coalesce bursts: each firing cancels the previously scheduled
    /// invocation and schedules a new one, so only the last firing of a
    /// burst reaches the handler.
    pub buffer: Option<Duration>,
    /// Only invoke when the event was originally fired by this observable,
    /// not when it arrives through bubbling from elsewhere.
    pub target: Option<ObservableId>,
}

impl ListenerOptions {
    /// Options with a delay.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Options for a single-shot listener.
    pub fn single() -> Self {
        Self {
            single: true,
            ..Self::default()
        }
    }

    /// Options with a buffer window.
    pub fn buffered(window: Duration) -> Self {
        Self {
            buffer: Some(window),
            ..Self::default()
        }
    }

    /// Options restricted to firings that originate from `target`.
    pub fn targeted(target: ObservableId) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }
}

type Handler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Predicate deciding whether a firing may bubble.
pub type BubbleFn = Arc<dyn Fn(&Observable) -> bool + Send + Sync>;

/// Hook producing the current bubble target.
pub type BubbleTargetProvider = Arc<dyn Fn() -> Option<Observable> + Send + Sync>;

struct ListenerRecord {
    event: EventName,
    handler: Handler,
    options: ListenerOptions,
    /// Outstanding delayed invocations.
    pending: Vec<ScheduledTask>,
    /// The scheduled buffered invocation, if any.
    buffered: Option<ScheduledTask>,
}

impl ListenerRecord {
    fn cancel_deferred(&mut self) {
        for task in self.pending.drain(..) {
            scheduler::cancel(&task);
        }
        if let Some(task) = self.buffered.take() {
            scheduler::cancel(&task);
        }
    }
}

enum BubbleTarget {
    None,
    Fixed(Weak<ObservableInner>),
    Provider(BubbleTargetProvider),
}

struct ObservableState {
    events: HashSet<EventName>,
    listeners: SlotMap<ListenerId, ListenerRecord>,
    by_event: HashMap<EventName, Vec<ListenerId>>,
    suspended: usize,
    queue_suspended: bool,
    queued: Vec<Event>,
    bubbling: HashMap<EventName, Option<BubbleFn>>,
    bubble_target: BubbleTarget,
}

struct ObservableInner {
    id: ObservableId,
    state: Mutex<ObservableState>,
}

/// A publish/subscribe event hub.
///
/// Cloning an `Observable` produces another handle to the same hub.
#[derive(Clone)]
pub struct Observable {
    inner: Arc<ObservableInner>,
}

/// A non-owning handle to an [`Observable`].
#[derive(Clone)]
pub struct WeakObservable {
    inner: Weak<ObservableInner>,
}

impl WeakObservable {
    /// Upgrade to a strong handle if the observable is still alive.
    pub fn upgrade(&self) -> Option<Observable> {
        self.inner.upgrade().map(|inner| Observable { inner })
    }
}

/// What one listener should do for one firing, captured under the lock.
struct Invocation {
    id: ListenerId,
    handler: Handler,
    options: ListenerOptions,
    /// Whether the record was already removed because it is single-shot.
    detached: bool,
}

impl Default for Observable {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable {
    /// Create a hub with no events and no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObservableInner {
                id: ObservableId::next(),
                state: Mutex::new(ObservableState {
                    events: HashSet::new(),
                    listeners: SlotMap::with_key(),
                    by_event: HashMap::new(),
                    suspended: 0,
                    queue_suspended: false,
                    queued: Vec::new(),
                    bubbling: HashMap::new(),
                    bubble_target: BubbleTarget::None,
                }),
            }),
        }
    }

    /// This hub's identity.
    pub fn id(&self) -> ObservableId {
        self.inner.id
    }

    /// Whether two handles refer to the same hub.
    pub fn ptr_eq(&self, other: &Observable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a non-owning handle.
    pub fn downgrade(&self) -> WeakObservable {
        WeakObservable {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register event names as firable. Registering a name twice is harmless.
    pub fn add_events<I, N>(&self, names: I)
    where
        I: IntoIterator<Item = N>,
        N: Into<EventName>,
    {
        let mut state = self.inner.state.lock();
        for name in names {
            state.events.insert(name.into());
        }
    }

    /// Whether `name` has been registered, either explicitly or by adding a
    /// listener for it.
    pub fn has_event(&self, name: impl Into<EventName>) -> bool {
        self.inner.state.lock().events.contains(&name.into())
    }

    /// Add a listener with default options.
    pub fn add_listener<F, R>(&self, name: impl Into<EventName>, handler: F) -> ListenerId
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<HandlerResult>,
    {
        self.add_listener_with(name, ListenerOptions::default(), handler)
    }

    /// Add a listener with explicit options.
    pub fn add_listener_with<F, R>(
        &self,
        name: impl Into<EventName>,
        options: ListenerOptions,
        handler: F,
    ) -> ListenerId
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<HandlerResult>,
    {
        let handler: Handler = Arc::new(move |event: &Event| handler(event).into());
        self.insert_listener(name.into(), options, handler)
    }

    /// Add several listeners at once, returning their ids in the same order.
    pub fn add_listeners<I, N, F, R>(&self, pairs: I) -> Vec<ListenerId>
    where
        I: IntoIterator<Item = (N, F)>,
        N: Into<EventName>,
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<HandlerResult>,
    {
        pairs
            .into_iter()
            .map(|(name, handler)| self.add_listener(name, handler))
            .collect()
    }

    fn insert_listener(
        &self,
        name: EventName,
        options: ListenerOptions,
        handler: Handler,
    ) -> ListenerId {
        let mut state = self.inner.state.lock();
        state.events.insert(name.clone());
        let id = state.listeners.insert(ListenerRecord {
            event: name.clone(),
            handler,
            options,
            pending: Vec::new(),
            buffered: None,
        });
        state.by_event.entry(name.clone()).or_default().push(id);
        tracing::trace!(target: targets::OBSERVABLE, observable = %self.id(), event = %name, ?id, "listener added");
        id
    }

    /// Remove a listener.
    ///
    /// Any delayed or buffered invocation still outstanding for it is
    /// cancelled, also when it was scheduled on another thread. Returns
    /// `false` if the listener was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.inner.state.lock();
        let Some(mut record) = Self::detach(&mut state, id) else {
            return false;
        };
        drop(state);
        record.cancel_deferred();
        true
    }

    /// Remove several listeners.
    pub fn remove_listeners<I>(&self, ids: I)
    where
        I: IntoIterator<Item = ListenerId>,
    {
        for id in ids {
            self.remove_listener(id);
        }
    }

    fn detach(state: &mut ObservableState, id: ListenerId) -> Option<ListenerRecord> {
        let record = state.listeners.remove(id)?;
        if let Some(ids) = state.by_event.get_mut(&record.event) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                state.by_event.remove(&record.event);
            }
        }
        Some(record)
    }

    /// Whether at least one listener is registered for `name`.
    pub fn has_listener(&self, name: impl Into<EventName>) -> bool {
        self.listener_count(name) > 0
    }

    /// The number of listeners registered for `name`.
    pub fn listener_count(&self, name: impl Into<EventName>) -> usize {
        self.inner
            .state
            .lock()
            .by_event
            .get(&name.into())
            .map_or(0, Vec::len)
    }

    // =========================================================================
    // Firing
    // =========================================================================

    /// Fire an event.
    ///
    /// Listeners run synchronously in registration order. Returns `false` if
    /// any of them vetoed the firing (or if a bubbled re-firing was vetoed).
    /// Firing a name with no listeners is not an error.
    pub fn fire_event(&self, name: impl Into<EventName>, args: Vec<Value>) -> bool {
        let event = Event {
            name: name.into(),
            source: self.id(),
            args,
        };
        self.dispatch(event)
    }

    fn dispatch(&self, event: Event) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.suspended > 0 {
                if state.queue_suspended {
                    tracing::trace!(target: targets::OBSERVABLE, observable = %self.id(), event = %event.name, "queued while suspended");
                    state.queued.push(event);
                }
                return true;
            }
        }

        let _span = tracing::trace_span!(target: targets::OBSERVABLE, "fire_event", event = %event.name).entered();

        let mut proceed = self.invoke(&event.name, &event);

        if proceed && event.name != EventName::All {
            proceed = self.bubble(&event);
        }

        if event.name != EventName::All {
            self.invoke(&EventName::All, &event);
        }

        proceed
    }

    /// Invoke the listeners registered under `key` for `event`.
    fn invoke(&self, key: &EventName, event: &Event) -> bool {
        let invocations = {
            let mut state = self.inner.state.lock();
            let Some(ids) = state.by_event.get(key).cloned() else {
                return true;
            };
            let mut invocations = Vec::with_capacity(ids.len());
            for id in ids {
                let Some(record) = state.listeners.get(id) else {
                    continue;
                };
                if record
                    .options
                    .target
                    .is_some_and(|target| target != event.source)
                {
                    continue;
                }
                let handler = record.handler.clone();
                let options = record.options;
                let detached = options.single;
                if detached {
                    Self::detach(&mut state, id);
                }
                invocations.push(Invocation {
                    id,
                    handler,
                    options,
                    detached,
                });
            }
            invocations
        };

        let mut proceed = true;
        for invocation in invocations {
            if let Some(window) = invocation.options.buffer {
                self.schedule_buffered(invocation, window, event);
            } else if let Some(delay) = invocation.options.delay {
                self.schedule_delayed(invocation, delay, event);
            } else if (invocation.handler)(event) == HandlerResult::Veto {
                proceed = false;
            }
        }
        proceed
    }

    fn schedule_delayed(&self, invocation: Invocation, delay: Duration, event: &Event) {
        let weak = Arc::downgrade(&self.inner);
        let listener = invocation.id;
        let handler = invocation.handler;
        let event = event.clone();
        let task = scheduler::schedule(delay, move || {
            if let Some(inner) = weak.upgrade()
                && let Some(record) = inner.state.lock().listeners.get_mut(listener)
            {
                record.pending.retain(ScheduledTask::is_pending);
            }
            handler(&event);
        });
        if !invocation.detached {
            let mut state = self.inner.state.lock();
            if let Some(record) = state.listeners.get_mut(invocation.id) {
                record.pending.push(task);
            }
        }
    }

    fn schedule_buffered(&self, invocation: Invocation, window: Duration, event: &Event) {
        if !invocation.detached {
            let previous = self
                .inner
                .state
                .lock()
                .listeners
                .get_mut(invocation.id)
                .and_then(|record| record.buffered.take());
            if let Some(previous) = previous {
                scheduler::cancel(&previous);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let listener = invocation.id;
        let handler = invocation.handler;
        let event = event.clone();
        let delay = invocation.options.delay.map_or(window, |delay| delay.max(window));
        let task = scheduler::schedule(delay, move || {
            if let Some(inner) = weak.upgrade()
                && let Some(record) = inner.state.lock().listeners.get_mut(listener)
            {
                record.buffered = None;
            }
            handler(&event);
        });

        if !invocation.detached {
            let mut state = self.inner.state.lock();
            if let Some(record) = state.listeners.get_mut(invocation.id) {
                record.buffered = Some(task);
            }
        }
    }

    // =========================================================================
    // Suspension
    // =========================================================================

    /// Suspend firing.
    ///
    /// While suspended, firings are dropped, or queued for replay if `queue`
    /// is `true` for any of the nested suspensions.
    pub fn suspend_events(&self, queue: bool) {
        let mut state = self.inner.state.lock();
        state.suspended += 1;
        state.queue_suspended |= queue;
    }

    /// End one level of suspension.
    ///
    /// When the last level ends, queued firings are replayed in their
    /// original order until one of them is vetoed; the rest are discarded.
    pub fn resume_events(&self) {
        let queued = {
            let mut state = self.inner.state.lock();
            if state.suspended == 0 {
                return;
            }
            state.suspended -= 1;
            if state.suspended > 0 {
                return;
            }
            state.queue_suspended = false;
            std::mem::take(&mut state.queued)
        };

        for event in queued {
            if !self.dispatch(event) {
                tracing::trace!(target: targets::OBSERVABLE, observable = %self.id(), "queued replay vetoed");
                break;
            }
        }
    }

    /// Whether firing is currently suspended.
    pub fn is_suspended(&self) -> bool {
        self.inner.state.lock().suspended > 0
    }

    // =========================================================================
    // Bubbling
    // =========================================================================

    /// Let `name` bubble to the bubble target after local dispatch.
    ///
    /// If `bubble_fn` is given and returns `false` for this observable, the
    /// firing stays local.
    pub fn enable_bubble(&self, name: impl Into<EventName>, bubble_fn: Option<BubbleFn>) {
        self.inner
            .state
            .lock()
            .bubbling
            .insert(name.into(), bubble_fn);
    }

    /// Stop `name` from bubbling.
    pub fn disable_bubble(&self, name: impl Into<EventName>) {
        self.inner.state.lock().bubbling.remove(&name.into());
    }

    /// Set the observable that bubbling events are re-fired on.
    ///
    /// The target is held weakly.
    pub fn set_bubble_target(&self, target: Option<&Observable>) {
        self.inner.state.lock().bubble_target = match target {
            Some(target) => BubbleTarget::Fixed(Arc::downgrade(&target.inner)),
            None => BubbleTarget::None,
        };
    }

    /// Compute the bubble target on demand for each bubbling firing.
    pub fn set_bubble_target_provider(&self, provider: BubbleTargetProvider) {
        self.inner.state.lock().bubble_target = BubbleTarget::Provider(provider);
    }

    /// The current bubble target, if any.
    pub fn bubble_target(&self) -> Option<Observable> {
        let provider = {
            let state = self.inner.state.lock();
            match &state.bubble_target {
                BubbleTarget::None => return None,
                BubbleTarget::Fixed(weak) => {
                    return weak.upgrade().map(|inner| Observable { inner });
                }
                BubbleTarget::Provider(provider) => provider.clone(),
            }
        };
        provider()
    }

    fn bubble(&self, event: &Event) -> bool {
        let bubble_fn = {
            let state = self.inner.state.lock();
            match state.bubbling.get(&event.name) {
                Some(bubble_fn) => bubble_fn.clone(),
                None => return true,
            }
        };
        if bubble_fn.is_some_and(|allow| !allow(self)) {
            return true;
        }
        match self.bubble_target() {
            Some(target) if !target.ptr_eq(self) => {
                tracing::trace!(target: targets::OBSERVABLE, from = %self.id(), to = %target.id(), event = %event.name, "bubbling");
                target.dispatch(event.clone())
            }
            _ => true,
        }
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("listeners", &state.listeners.len())
            .field("suspended", &state.suspended)
            .finish()
    }
}

static_assertions::assert_impl_all!(Observable: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (log.clone(), log)
    }

    #[test]
    fn test_event_name_parsing() {
        assert_eq!(EventName::from("CHANGE"), EventName::Change);
        assert_eq!(
            EventName::from("change:firstName"),
            EventName::AttributeChange("firstName".into())
        );
        assert_eq!(EventName::from("BeforeDestroy"), EventName::BeforeDestroy);
        assert_eq!(EventName::from("Custom"), EventName::Custom("custom".into()));
        assert_eq!(
            EventName::attribute_change("a").to_string(),
            "change:a".to_string()
        );
    }

    #[test]
    fn test_registration_order_and_args() {
        let hub = Observable::new();
        let (log, handle) = recorder();

        let l = log.clone();
        hub.add_listener("ping", move |e| l.lock().push(format!("a{:?}", e.arg(0))));
        let l = log.clone();
        hub.add_listener("ping", move |e| l.lock().push(format!("b{:?}", e.arg(1))));

        assert!(hub.fire_event("ping", vec![Value::from(1)]));
        assert_eq!(*handle.lock(), vec!["aNumber(1)", "bUndefined"]);
    }

    #[test]
    fn test_veto_does_not_short_circuit() {
        let hub = Observable::new();
        let count = Arc::new(AtomicUsize::new(0));

        hub.add_listener("save", |_| false);
        let c = count.clone();
        hub.add_listener("save", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!hub.fire_event("save", vec![]));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_event_is_noop() {
        let hub = Observable::new();
        assert!(!hub.has_event("nothing"));
        assert!(hub.fire_event("nothing", vec![]));
        assert!(!hub.remove_listener(ListenerId::default()));
    }

    #[test]
    fn test_all_receives_original_event_once() {
        let hub = Observable::new();
        let (log, handle) = recorder();

        let l = log.clone();
        hub.add_listener(EventName::All, move |e| l.lock().push(e.name.to_string()));

        hub.fire_event("change:name", vec![]);
        hub.fire_event(EventName::All, vec![]);

        assert_eq!(*handle.lock(), vec!["change:name", "all"]);
    }

    #[test]
    fn test_remove_listener() {
        let hub = Observable::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = hub.add_listener("ping", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.fire_event("ping", vec![]);
        assert!(hub.remove_listener(id));
        hub.fire_event("ping", vec![]);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!hub.has_listener("ping"));
    }

    #[test]
    fn test_single_listener_detaches() {
        let hub = Observable::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        hub.add_listener_with("ping", ListenerOptions::single(), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.fire_event("ping", vec![]);
        hub.fire_event("ping", vec![]);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(hub.listener_count("ping"), 0);
    }

    #[test]
    fn test_listener_may_remove_itself_during_dispatch() {
        let hub = Observable::new();
        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let (h, c, s) = (hub.clone(), count.clone(), slot.clone());
        let id = hub.add_listener("ping", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *s.lock() {
                h.remove_listener(id);
            }
        });
        *slot.lock() = Some(id);

        hub.fire_event("ping", vec![]);
        hub.fire_event("ping", vec![]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delayed_listener_runs_on_flush() {
        let hub = Observable::new();
        let (log, handle) = recorder();
        let l = log.clone();
        hub.add_listener_with(
            "ping",
            ListenerOptions::delayed(Duration::from_millis(10)),
            move |e| l.lock().push(format!("{:?}", e.arg(0))),
        );

        hub.fire_event("ping", vec![Value::from(1)]);
        hub.fire_event("ping", vec![Value::from(2)]);
        assert!(handle.lock().is_empty());

        scheduler::flush();
        assert_eq!(*handle.lock(), vec!["Number(1)", "Number(2)"]);
    }

    #[test]
    fn test_buffered_listener_coalesces_to_last() {
        let hub = Observable::new();
        let (log, handle) = recorder();
        let l = log.clone();
        hub.add_listener_with(
            "ping",
            ListenerOptions::buffered(Duration::from_millis(20)),
            move |e| l.lock().push(format!("{:?}", e.arg(0))),
        );

        for n in 1..=3 {
            hub.fire_event("ping", vec![Value::from(n)]);
        }
        scheduler::flush();

        assert_eq!(*handle.lock(), vec!["Number(3)"]);
    }

    #[test]
    fn test_remove_cancels_deferred_invocations() {
        let hub = Observable::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = hub.add_listener_with(
            "ping",
            ListenerOptions::delayed(Duration::from_millis(10)),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        hub.fire_event("ping", vec![]);
        hub.remove_listener(id);
        scheduler::flush();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_suspend_drops_or_queues() {
        let hub = Observable::new();
        let (log, handle) = recorder();
        let l = log.clone();
        hub.add_listener("ping", move |e| l.lock().push(format!("{:?}", e.arg(0))));

        hub.suspend_events(false);
        hub.fire_event("ping", vec![Value::from(1)]);
        hub.resume_events();

        hub.suspend_events(true);
        hub.suspend_events(false);
        hub.fire_event("ping", vec![Value::from(2)]);
        hub.fire_event("ping", vec![Value::from(3)]);
        hub.resume_events();
        assert!(hub.is_suspended());
        assert!(handle.lock().is_empty());
        hub.resume_events();

        assert!(!hub.is_suspended());
        assert_eq!(*handle.lock(), vec!["Number(2)", "Number(3)"]);
    }

    #[test]
    fn test_queued_replay_stops_on_veto() {
        let hub = Observable::new();
        let (log, handle) = recorder();
        let l = log.clone();
        hub.add_listener("ping", move |e| {
            l.lock().push(format!("{:?}", e.arg(0)));
            e.arg(0) != &Value::from(2)
        });

        hub.suspend_events(true);
        for n in 1..=3 {
            hub.fire_event("ping", vec![Value::from(n)]);
        }
        hub.resume_events();

        assert_eq!(*handle.lock(), vec!["Number(1)", "Number(2)"]);
    }

    #[test]
    fn test_bubbling_and_target_filter() {
        let parent = Observable::new();
        let child = Observable::new();
        child.set_bubble_target(Some(&parent));
        child.enable_bubble("ping", None);

        let (log, handle) = recorder();
        let l = log.clone();
        parent.add_listener("ping", move |_| l.lock().push("any".to_string()));
        let l = log.clone();
        parent.add_listener_with(
            "ping",
            ListenerOptions::targeted(parent.id()),
            move |_| l.lock().push("direct".to_string()),
        );

        child.fire_event("ping", vec![]);
        assert_eq!(*handle.lock(), vec!["any"]);

        parent.fire_event("ping", vec![]);
        assert_eq!(*handle.lock(), vec!["any", "any", "direct"]);
    }

    #[test]
    fn test_bubble_fn_and_veto_stop_bubbling() {
        let parent = Observable::new();
        let child = Observable::new();
        child.set_bubble_target(Some(&parent));

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        parent.add_listener("ping", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        child.enable_bubble("ping", Some(Arc::new(|_: &Observable| false)));
        child.fire_event("ping", vec![]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        child.enable_bubble("ping", None);
        let veto = child.add_listener("ping", |_| false);
        child.fire_event("ping", vec![]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        child.remove_listener(veto);
        child.fire_event("ping", vec![]);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        child.disable_bubble("ping");
        child.fire_event("ping", vec![]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bubble_target_is_weak() {
        let child = Observable::new();
        {
            let parent = Observable::new();
            child.set_bubble_target(Some(&parent));
            assert!(child.bubble_target().is_some());
        }
        assert!(child.bubble_target().is_none());
    }
}
