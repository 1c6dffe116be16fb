//! Round trips against a loopback HTTP responder.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use horizon_data::{Attribute, ModelClass, PersistOptions, ProxyError, Value};
use horizon_data_rest::{RestProxy, RestProxyConfig};

/// What the responder saw.
#[derive(Debug)]
struct Received {
    request_line: String,
    headers: Vec<(String, String)>,
    body: String,
}

/// Answer one request with `status` and `response`, then close.
fn respond_once(status: &'static str, response: &'static str) -> (String, JoinHandle<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url_root = format!("http://{}/api/users", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut headers = Vec::new();
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').unwrap();
            let (name, value) = (name.trim().to_ascii_lowercase(), value.trim().to_string());
            if name == "content-length" {
                content_length = value.parse().unwrap();
            }
            headers.push((name, value));
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();

        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response}",
            response.len()
        )
        .unwrap();
        stream.flush().unwrap();

        Received {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: String::from_utf8(body).unwrap(),
        }
    });
    (url_root, handle)
}

fn user_class(proxy: Arc<RestProxy>) -> ModelClass {
    ModelClass::builder("User")
        .attribute("id")
        .attribute(Attribute::string("name"))
        .proxy(proxy)
        .build()
        .unwrap()
}

#[test]
fn test_synchronous_create_assigns_id() {
    let (url_root, server) = respond_once("201 Created", r#"{"id": 42}"#);
    let config = RestProxyConfig::new(url_root).header("X-Api-Key", "secret");
    let proxy = Arc::new(RestProxy::new(config).unwrap());
    let model = user_class(proxy.clone())
        .new_model(Value::object([("name", "ann")]))
        .unwrap();

    model.save(PersistOptions::synchronous()).unwrap();

    let received = server.join().unwrap();
    assert_eq!(received.request_line, "POST /api/users HTTP/1.1");
    assert!(
        received
            .headers
            .contains(&("x-api-key".to_string(), "secret".to_string()))
    );
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&received.body).unwrap(),
        serde_json::json!({"name": "ann"})
    );
    assert_eq!(model.get_id().unwrap(), Value::from(42));
    assert!(!model.is_new());
    assert!(!model.is_dirty());
}

#[test]
fn test_asynchronous_read_waits_for_dispatch() {
    let (url_root, server) = respond_once("200 OK", r#"{"data": {"id": 7, "name": "bo"}}"#);
    let proxy = Arc::new(RestProxy::new(RestProxyConfig::new(url_root).root_property("data")).unwrap());
    let model = user_class(proxy.clone())
        .new_model(Value::object([("id", 7)]))
        .unwrap();
    let loaded = Arc::new(Mutex::new(false));
    let flag = loaded.clone();

    model
        .load(PersistOptions::new().on_success(move |_| *flag.lock() = true))
        .unwrap();
    assert!(model.is_loading());
    assert_eq!(proxy.pending_count(), 1);

    let received = server.join().unwrap();
    assert_eq!(received.request_line, "GET /api/users/7 HTTP/1.1");

    assert_eq!(proxy.wait_for_completed(Duration::from_secs(10)), 1);
    assert!(*loaded.lock());
    assert!(!model.is_loading());
    assert_eq!(model.get("name").unwrap(), Value::from("bo"));
    assert_eq!(proxy.pending_count(), 0);
}

#[test]
fn test_error_status_reaches_error_callback() {
    let (url_root, server) = respond_once("422 Unprocessable Entity", r#"{"error": "taken"}"#);
    let proxy = Arc::new(RestProxy::new(RestProxyConfig::new(url_root)).unwrap());
    let model = user_class(proxy.clone())
        .new_model(Value::object([("id", Value::from(3)), ("name", Value::from("x"))]))
        .unwrap();
    model.set("name", "y").unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();

    model
        .save(PersistOptions::synchronous().on_error(move |_, err| sink.lock().push(err.clone())))
        .unwrap();

    let received = server.join().unwrap();
    assert_eq!(received.request_line, "PUT /api/users/3 HTTP/1.1");
    assert_eq!(
        *errors.lock(),
        vec![ProxyError::Status {
            status: 422,
            message: r#"{"error": "taken"}"#.to_string()
        }]
    );
    assert!(model.is_modified("name"));
    assert!(!model.is_saving());
}

#[test]
fn test_unchanged_update_sends_nothing() {
    // Nothing listens here; a request would fail with a connection error.
    let proxy = Arc::new(RestProxy::new(RestProxyConfig::new("http://127.0.0.1:9/api/users")).unwrap());
    let model = user_class(proxy.clone())
        .new_model(Value::object([("id", 5)]))
        .unwrap();
    let succeeded = Arc::new(Mutex::new(false));
    let flag = succeeded.clone();

    model
        .save(PersistOptions::new().on_success(move |_| *flag.lock() = true))
        .unwrap();

    assert!(*succeeded.lock());
    assert_eq!(proxy.pending_count(), 0);
}

#[test]
fn test_echoed_update_keeps_edits_made_in_flight() {
    let (url_root, server) = respond_once("200 OK", r#"{"id": 7, "name": "first"}"#);
    let proxy = Arc::new(RestProxy::new(RestProxyConfig::new(url_root)).unwrap());
    let model = user_class(proxy.clone())
        .new_model(Value::object([("id", Value::from(7)), ("name", Value::from("start"))]))
        .unwrap();
    model.set("name", "first").unwrap();

    model.save(PersistOptions::new()).unwrap();
    model.set("name", "newest").unwrap();

    let received = server.join().unwrap();
    assert_eq!(received.request_line, "PUT /api/users/7 HTTP/1.1");
    assert_eq!(proxy.wait_for_completed(Duration::from_secs(10)), 1);

    assert_eq!(model.get("name").unwrap(), Value::from("newest"));
    assert!(model.is_modified("name"));
    assert!(model.is_dirty());
    model.rollback();
    assert_eq!(model.get("name").unwrap(), Value::from("first"));
}

#[test]
fn test_echoed_create_assigns_id_but_keeps_edits_made_in_flight() {
    let (url_root, server) = respond_once("201 Created", r#"{"id": 9, "name": "first"}"#);
    let proxy = Arc::new(RestProxy::new(RestProxyConfig::new(url_root)).unwrap());
    let model = user_class(proxy.clone())
        .new_model(Value::object([("name", "first")]))
        .unwrap();

    model.save(PersistOptions::new()).unwrap();
    model.set("name", "newest").unwrap();

    let received = server.join().unwrap();
    assert_eq!(received.request_line, "POST /api/users HTTP/1.1");
    assert_eq!(proxy.wait_for_completed(Duration::from_secs(10)), 1);

    assert_eq!(model.get_id().unwrap(), Value::from(9));
    assert!(!model.is_modified("id"));
    assert_eq!(model.get("name").unwrap(), Value::from("newest"));
    assert!(model.is_modified("name"));
}
