//! Mapping proxy actions to HTTP requests and responses back to model data.
//!
//! Everything here is pure: building a request reads the model on the
//! calling thread, and decoding a response only looks at the status and body
//! text. The [`RestProxy`](crate::RestProxy) moves the network I/O between
//! the two onto a worker thread when asked to.

use std::fmt;

use horizon_data::{ConvertOptions, Model, Value};
use reqwest::Method;
use url::Url;

use crate::config::RestProxyConfig;
use crate::error::{RestError, Result};

/// A persistence action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestAction {
    Create,
    Read,
    Update,
    Destroy,
}

impl RestAction {
    /// The HTTP method used for this action.
    pub fn method(self) -> Method {
        match self {
            Self::Create => Method::POST,
            Self::Read => Method::GET,
            Self::Update => Method::PUT,
            Self::Destroy => Method::DELETE,
        }
    }

    /// Whether the request addresses an existing record.
    pub fn addresses_record(self) -> bool {
        !matches!(self, Self::Create)
    }
}

impl fmt::Display for RestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Destroy => "destroy",
        })
    }
}

/// A request ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub action: RestAction,
    pub method: Method,
    pub url: Url,
    /// JSON body, for create and update.
    pub body: Option<serde_json::Value>,
}

/// The outcome of preparing an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Prepared {
    /// Send this request.
    Send(RestRequest),
    /// Nothing to send; report success without a response.
    Skip,
}

/// Build the request for `action` on `model`.
///
/// Update of a model with no pending changes is skipped. With
/// `incremental`, update bodies carry only the changed attributes.
pub fn prepare(config: &RestProxyConfig, action: RestAction, model: &Model) -> Result<Prepared> {
    let options = ConvertOptions::persisted_raw();
    if action == RestAction::Update && model.get_changes(&options).is_empty() {
        return Ok(Prepared::Skip);
    }

    let url = resource_url(config, action, model)?;
    let body = match action {
        RestAction::Create => Some(model.get_data(&options).to_json()?),
        RestAction::Update if config.incremental => Some(model.get_changes(&options).to_json()?),
        RestAction::Update => Some(model.get_data(&options).to_json()?),
        RestAction::Read | RestAction::Destroy => None,
    };

    Ok(Prepared::Send(RestRequest {
        action,
        method: action.method(),
        url,
        body,
    }))
}

/// The URL `action` on `model` is sent to.
pub fn resource_url(config: &RestProxyConfig, action: RestAction, model: &Model) -> Result<Url> {
    let mut url = Url::parse(&config.url_root)?;
    if config.append_id && action.addresses_record() {
        let id = model
            .get_id()?
            .id_key()
            .ok_or_else(|| RestError::Model("model has no id".to_string()))?;
        url.path_segments_mut()
            .map_err(|()| RestError::InvalidUrl(format!("'{}' cannot have a path", config.url_root)))?
            .pop_if_empty()
            .push(&id);
    }
    Ok(url)
}

/// Turn a status and body into the data handed to the model.
///
/// Error statuses become [`RestError::HttpStatus`]. An empty body means the
/// server sent no data. Read responses are unwrapped through
/// `root_property` when one is configured.
pub fn decode_response(
    config: &RestProxyConfig,
    action: RestAction,
    status: u16,
    body: &str,
) -> Result<Option<Value>> {
    if !(200..300).contains(&status) {
        let message = if body.trim().is_empty() {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|code| code.canonical_reason())
                .unwrap_or("Unknown status")
                .to_string()
        } else {
            body.trim().to_string()
        };
        return Err(RestError::HttpStatus { status, message });
    }
    if body.trim().is_empty() {
        return Ok(None);
    }

    let mut json: serde_json::Value = serde_json::from_str(body)?;
    if action == RestAction::Read
        && let Some(property) = &config.root_property
    {
        json = match json {
            serde_json::Value::Object(mut map) => map.remove(property).ok_or_else(|| {
                RestError::InvalidBody(format!("response has no '{property}' property"))
            })?,
            _ => {
                return Err(RestError::InvalidBody(format!(
                    "expected an object wrapping '{property}'"
                )));
            }
        };
    }
    Ok(Some(Value::from(json)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_data::{Attribute, ModelClass};

    fn user_class() -> ModelClass {
        ModelClass::builder("RestUser")
            .attribute("id")
            .attribute(Attribute::string("name"))
            .attribute(Attribute::string("email"))
            .attribute(Attribute::mixed("token").persist(false))
            .build()
            .unwrap()
    }

    fn config() -> RestProxyConfig {
        RestProxyConfig::new("http://localhost:8080/api/users")
    }

    #[test]
    fn test_create_posts_to_root_without_id() {
        let model = user_class()
            .new_model(Value::object([("name", "ann"), ("token", "t")]))
            .unwrap();
        let Prepared::Send(request) = prepare(&config(), RestAction::Create, &model).unwrap() else {
            panic!("create was skipped");
        };
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url.as_str(), "http://localhost:8080/api/users");
        assert_eq!(
            request.body,
            Some(serde_json::json!({"name": "ann", "email": ""}))
        );
    }

    #[test]
    fn test_id_is_percent_encoded() {
        let model = user_class()
            .new_model(Value::object([("id", "a b/c")]))
            .unwrap();
        let url = resource_url(&config(), RestAction::Read, &model).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/users/a%20b%2Fc");

        let trailing = RestProxyConfig::new("http://localhost/users/");
        let url = resource_url(&trailing, RestAction::Destroy, &model).unwrap();
        assert_eq!(url.as_str(), "http://localhost/users/a%20b%2Fc");
    }

    #[test]
    fn test_append_id_disabled() {
        let model = user_class().new_model(Value::object([("id", 7)])).unwrap();
        let url = resource_url(&config().append_id(false), RestAction::Update, &model).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/users");
    }

    #[test]
    fn test_update_without_changes_is_skipped() {
        let model = user_class().new_model(Value::object([("id", 7)])).unwrap();
        assert_eq!(
            prepare(&config(), RestAction::Update, &model).unwrap(),
            Prepared::Skip
        );
    }

    #[test]
    fn test_incremental_update_sends_changes_only() {
        let model = user_class()
            .new_model(Value::object([("id", Value::from(7)), ("name", Value::from("ann"))]))
            .unwrap();
        model.set("email", "ann@example.com").unwrap();
        model.set("token", "ignored").unwrap();

        let Prepared::Send(full) = prepare(&config(), RestAction::Update, &model).unwrap() else {
            panic!("update was skipped");
        };
        assert_eq!(full.method, Method::PUT);
        assert_eq!(full.url.as_str(), "http://localhost:8080/api/users/7");
        assert_eq!(
            full.body,
            Some(serde_json::json!({"id": 7, "name": "ann", "email": "ann@example.com"}))
        );

        let incremental = config().incremental(true);
        let Prepared::Send(partial) = prepare(&incremental, RestAction::Update, &model).unwrap()
        else {
            panic!("update was skipped");
        };
        assert_eq!(partial.body, Some(serde_json::json!({"email": "ann@example.com"})));
    }

    #[test]
    fn test_read_without_id_fails() {
        let model = user_class().new_model(Value::Undefined).unwrap();
        assert!(matches!(
            prepare(&config(), RestAction::Read, &model),
            Err(RestError::Model(_))
        ));
    }

    #[test]
    fn test_decode_status_and_bodies() {
        let config = config();
        assert_eq!(
            decode_response(&config, RestAction::Read, 404, ""),
            Err(RestError::HttpStatus {
                status: 404,
                message: "Not Found".to_string()
            })
        );
        assert_eq!(decode_response(&config, RestAction::Destroy, 204, ""), Ok(None));
        assert_eq!(
            decode_response(&config, RestAction::Create, 201, r#"{"id": 5}"#),
            Ok(Some(Value::object([("id", 5)])))
        );
        assert!(matches!(
            decode_response(&config, RestAction::Read, 200, "{not json"),
            Err(RestError::Json(_))
        ));
    }

    #[test]
    fn test_root_property_unwraps_reads_only() {
        let config = config().root_property("data");
        assert_eq!(
            decode_response(&config, RestAction::Read, 200, r#"{"data": {"name": "x"}}"#),
            Ok(Some(Value::object([("name", "x")])))
        );
        assert_eq!(
            decode_response(&config, RestAction::Create, 200, r#"{"id": 1}"#),
            Ok(Some(Value::object([("id", 1)])))
        );
        assert!(matches!(
            decode_response(&config, RestAction::Read, 200, r#"{"other": 1}"#),
            Err(RestError::InvalidBody(_))
        ));
    }
}
