//! Error types for Horizon Data.
//!
//! Configuration and usage errors are reported synchronously through
//! [`DataError`]. Failures of asynchronous persistence operations never show
//! up here; they are delivered to the `error` callback of the operation (see
//! [`crate::proxy::ProxyError`]).

/// Result type alias for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// The main error type for Horizon Data operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    /// An attribute was declared without a name.
    #[error("Attribute name must be a non-empty string")]
    MissingAttributeName,

    /// A nested attribute was given a class reference that resolved to nothing.
    #[error("Attribute '{attribute}' was configured with an undefined {key}")]
    UndefinedClassReference {
        /// The attribute being configured.
        attribute: String,
        /// The configuration key (`modelClass` or `collectionClass`).
        key: &'static str,
    },

    /// The attribute is not declared on the model's class.
    #[error("Attribute '{attribute}' is not declared on model '{model}'")]
    UnknownAttribute {
        /// The model class name.
        model: String,
        /// The attribute that was requested.
        attribute: String,
    },

    /// The model's class does not declare its id attribute.
    #[error("Model '{model}' does not declare its id attribute '{attribute}'")]
    MissingIdAttribute {
        /// The model class name.
        model: String,
        /// The configured id attribute name.
        attribute: String,
    },

    /// A persistence operation was requested but no proxy is configured.
    #[error("Model '{model}' has no proxy configured")]
    MissingProxy {
        /// The model class name.
        model: String,
    },

    /// A nested attribute received a value of the wrong type.
    #[error("Attribute '{attribute}' expects {expected}, got {got}")]
    TypeMismatch {
        /// The attribute being set.
        attribute: String,
        /// The expected type.
        expected: String,
        /// The type that was provided.
        got: String,
    },

    /// A late-bound class reference could not be resolved.
    #[error("Class '{name}' could not be resolved")]
    UnresolvedClass {
        /// The symbolic class name, or a description of the deferred lookup.
        name: String,
    },

    /// A collection was asked to instantiate raw data without a model class.
    #[error("Collection '{collection}' has no model class to instantiate raw data with")]
    MissingModelClass {
        /// The collection class name.
        collection: String,
    },

    /// A circular structure cannot be represented as a tree.
    #[error("Cannot convert a circular structure to JSON")]
    CircularStructure,

    /// A value could not be represented as JSON.
    #[error("JSON error: {0}")]
    Json(String),
}

impl DataError {
    /// Create an unknown-attribute error.
    pub fn unknown_attribute(model: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            model: model.into(),
            attribute: attribute.into(),
        }
    }

    /// Create a type-mismatch error.
    pub fn type_mismatch(
        attribute: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            attribute: attribute.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Whether this error was raised while configuring a class or attribute.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingAttributeName | Self::UndefinedClassReference { .. }
        )
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
