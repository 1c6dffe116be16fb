//! The HTTP-backed [`Proxy`].

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use horizon_data::{Model, Proxy, ProxyError, ProxyOptions, Value};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use slotmap::{SlotMap, new_key_type};
use url::Url;

use crate::config::RestProxyConfig;
use crate::error::{RestError, Result};
use crate::request::{self, Prepared, RestAction, RestRequest};

new_key_type! {
    /// Key of a request waiting for its completion to be dispatched.
    struct RequestKey;
}

enum WorkerRequest {
    Send { key: RequestKey, request: RestRequest },
    Shutdown,
}

struct Completion {
    key: RequestKey,
    action: RestAction,
    outcome: Result<(u16, String)>,
}

/// A proxy that persists models to a REST endpoint.
///
/// Synchronous operations send the request on the calling thread and run the
/// callbacks before returning. Asynchronous operations are sent from a worker
/// thread; their callbacks run when the owning thread calls
/// [`dispatch_completed`](Self::dispatch_completed) or
/// [`wait_for_completed`](Self::wait_for_completed).
///
/// ```no_run
/// use std::sync::Arc;
/// use horizon_data::{ModelClass, PersistOptions, Value};
/// use horizon_data_rest::{RestProxy, RestProxyConfig};
///
/// let proxy = Arc::new(RestProxy::new(RestProxyConfig::new("https://api.example.com/users"))?);
/// let users = ModelClass::builder("User")
///     .attributes(["id", "name"])
///     .proxy(proxy.clone())
///     .build()?;
///
/// let user = users.new_model(Value::object([("name", "ann")]))?;
/// user.save(PersistOptions::new())?;
///
/// // Later, on the same thread:
/// proxy.dispatch_completed();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RestProxy {
    config: RestProxyConfig,
    client: Client,
    jobs: Sender<WorkerRequest>,
    completed: Receiver<Completion>,
    pending: Mutex<SlotMap<RequestKey, ProxyOptions>>,
    worker: Option<JoinHandle<()>>,
}

impl RestProxy {
    /// Create a proxy and start its worker thread.
    pub fn new(config: RestProxyConfig) -> Result<Self> {
        Url::parse(&config.url_root)?;
        let client = build_client(&config)?;

        let (jobs, job_rx) = unbounded::<WorkerRequest>();
        let (completed_tx, completed) = unbounded::<Completion>();
        let worker_client = client.clone();
        let worker = thread::Builder::new()
            .name("horizon-data-rest".to_string())
            .spawn(move || worker_thread(worker_client, job_rx, completed_tx))
            .map_err(|err| RestError::Worker(err.to_string()))?;

        tracing::debug!(target: "horizon_data_rest", url_root = %config.url_root, "rest proxy started");
        Ok(Self {
            config,
            client,
            jobs,
            completed,
            pending: Mutex::new(SlotMap::with_key()),
            worker: Some(worker),
        })
    }

    pub fn config(&self) -> &RestProxyConfig {
        &self.config
    }

    /// The number of asynchronous requests whose callbacks have not run yet.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run the callbacks of every request that has finished.
    ///
    /// Returns how many were dispatched. Never blocks.
    pub fn dispatch_completed(&self) -> usize {
        let mut count = 0;
        while let Ok(completion) = self.completed.try_recv() {
            count += usize::from(self.deliver(completion));
        }
        count
    }

    /// Wait up to `timeout` for at least one request to finish, then
    /// dispatch everything that has.
    pub fn wait_for_completed(&self, timeout: Duration) -> usize {
        match self.completed.recv_timeout(timeout) {
            Ok(completion) => usize::from(self.deliver(completion)) + self.dispatch_completed(),
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!(target: "horizon_data_rest", "rest worker has stopped");
                0
            }
        }
    }

    fn deliver(&self, completion: Completion) -> bool {
        let Completion {
            key,
            action,
            outcome,
        } = completion;
        let Some(options) = self.pending.lock().remove(key) else {
            return false;
        };
        let outcome = outcome.and_then(|(status, body)| {
            request::decode_response(&self.config, action, status, &body)
        });
        finish(action, options, outcome);
        true
    }

    fn submit(&self, action: RestAction, model: &Model, options: ProxyOptions) {
        let request = match request::prepare(&self.config, action, model) {
            Ok(Prepared::Send(request)) => request,
            Ok(Prepared::Skip) => {
                tracing::debug!(target: "horizon_data_rest", %action, client_id = %model.client_id(), "nothing to send");
                options.succeed(None);
                return;
            }
            Err(err) => {
                finish(action, options, Err(err));
                return;
            }
        };
        tracing::debug!(
            target: "horizon_data_rest",
            %action,
            method = %request.method,
            url = %request.url,
            asynchronous = options.asynchronous,
            "sending request"
        );

        if !options.asynchronous {
            let outcome = execute(&self.client, &request).and_then(|(status, body)| {
                request::decode_response(&self.config, action, status, &body)
            });
            finish(action, options, outcome);
            return;
        }

        let key = self.pending.lock().insert(options);
        if self.jobs.send(WorkerRequest::Send { key, request }).is_err()
            && let Some(options) = self.pending.lock().remove(key)
        {
            finish(
                action,
                options,
                Err(RestError::Worker("worker thread has stopped".to_string())),
            );
        }
    }
}

fn finish(action: RestAction, options: ProxyOptions, outcome: Result<Option<Value>>) {
    match outcome {
        Ok(response) => options.succeed(response),
        Err(err) => {
            tracing::warn!(target: "horizon_data_rest", %action, error = %err, "request failed");
            options.fail(ProxyError::from(err));
        }
    }
}

fn build_client(config: &RestProxyConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| RestError::InvalidHeader(format!("{name}: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| RestError::InvalidHeader(format!("{name}: {err}")))?;
        headers.insert(name, value);
    }

    let mut builder = Client::builder().default_headers(headers);
    if let Some(timeout) = config.timeout_duration() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Send a request and read the whole response.
fn execute(client: &Client, request: &RestRequest) -> Result<(u16, String)> {
    let mut builder = client.request(request.method.clone(), request.url.clone());
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }
    let response = builder.send()?;
    let status = response.status().as_u16();
    let body = response.text()?;
    tracing::trace!(target: "horizon_data_rest", status, bytes = body.len(), "response received");
    Ok((status, body))
}

fn worker_thread(client: Client, jobs: Receiver<WorkerRequest>, completed: Sender<Completion>) {
    while let Ok(job) = jobs.recv() {
        let WorkerRequest::Send { key, request } = job else {
            break;
        };
        let outcome = execute(&client, &request);
        let completion = Completion {
            key,
            action: request.action,
            outcome,
        };
        if completed.send(completion).is_err() {
            break;
        }
    }
}

impl Proxy for RestProxy {
    fn create(&self, model: &Model, options: ProxyOptions) {
        self.submit(RestAction::Create, model, options);
    }

    fn read(&self, model: &Model, options: ProxyOptions) {
        self.submit(RestAction::Read, model, options);
    }

    fn update(&self, model: &Model, options: ProxyOptions) {
        self.submit(RestAction::Update, model, options);
    }

    fn destroy(&self, model: &Model, options: ProxyOptions) {
        self.submit(RestAction::Destroy, model, options);
    }
}

impl Drop for RestProxy {
    fn drop(&mut self) {
        let abandoned = self.pending.get_mut().len();
        if abandoned > 0 {
            tracing::debug!(target: "horizon_data_rest", abandoned, "dropping rest proxy with undelivered completions");
        }
        let _ = self.jobs.send(WorkerRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl fmt::Debug for RestProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestProxy")
            .field("url_root", &self.config.url_root)
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(RestProxy: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_relative_url_root() {
        let err = RestProxy::new(RestProxyConfig::new("/api/users")).unwrap_err();
        assert!(matches!(err, RestError::InvalidUrl(_)));
    }

    #[test]
    fn test_rejects_invalid_header() {
        let config = RestProxyConfig::new("http://localhost/users").header("bad header", "x");
        assert!(matches!(
            RestProxy::new(config),
            Err(RestError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_nothing_to_dispatch() {
        let proxy = RestProxy::new(RestProxyConfig::new("http://localhost/users")).unwrap();
        assert_eq!(proxy.dispatch_completed(), 0);
        assert_eq!(proxy.wait_for_completed(Duration::from_millis(10)), 0);
        assert_eq!(proxy.pending_count(), 0);
    }
}
