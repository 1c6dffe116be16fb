//! Dynamic values stored in model attributes.
//!
//! [`Value`] is the currency of the whole crate: attribute hooks receive and
//! return values, events carry them as arguments, and models and collections
//! nest inside them by reference.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::collection::Collection;
use crate::convert::{self, ConvertOptions};
use crate::error::Result;
use crate::model::Model;

/// A dynamically typed attribute value.
///
/// Models and collections are held by reference: cloning a `Value::Model`
/// clones the handle, not the model.
#[derive(Clone, Default)]
pub enum Value {
    /// No value has ever been assigned.
    #[default]
    Undefined,
    /// An explicit absence of value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. Integers are stored as whole floats; `NaN` marks unparseable input.
    Number(f64),
    /// A string.
    String(String),
    /// A point in time.
    Date(DateTime<Utc>),
    /// An ordered list of values.
    Array(Vec<Value>),
    /// A plain keyed structure.
    Object(BTreeMap<String, Value>),
    /// A reference to a model.
    Model(Model),
    /// A reference to a collection.
    Collection(Collection),
}

impl Value {
    /// Build an object value from key/value pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build an array value from items.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::Array(items.into_iter().map(Into::into).collect())
    }

    /// A short name for the value's variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Model(_) => "model",
            Self::Collection(_) => "collection",
        }
    }

    /// Whether the value is `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value is `Undefined` or `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Whether the value is a number that is `NaN`.
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Number(n) if n.is_nan())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as an integer, if it is finite and whole.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Self::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Normalise a value usable as a persistence id into a hashable key.
    ///
    /// `1`, `1.0` and `"1"` all map to the key `"1"`. Undefined, null,
    /// `NaN` and composite values are not ids.
    pub fn id_key(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) if !n.is_nan() => Some(format_number(*n)),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Identity-style equality.
    ///
    /// Primitives compare by value (with `NaN` never equal to anything),
    /// models and collections by reference, and composite plain values
    /// structurally.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            _ => self == other,
        }
    }

    /// Render the value the way string coercion does.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Date(d) => d.to_rfc3339(),
            Self::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Model(m) => format!("[model {}]", m.client_id()),
            Self::Collection(c) => format!("[collection {}]", c.client_id()),
        }
    }

    /// Convert to a JSON value.
    ///
    /// Nested models and collections are flattened with the native-object
    /// converter; circular references fail with
    /// [`DataError::CircularStructure`](crate::DataError::CircularStructure).
    /// Undefined object members are omitted and undefined array items become
    /// `null`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Self::Undefined | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Date(d) => serde_json::Value::String(d.to_rfc3339()),
            Self::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Self::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    if !value.is_undefined() {
                        out.insert(key.clone(), value.to_json()?);
                    }
                }
                serde_json::Value::Object(out)
            }
            Self::Model(m) => convert::convert_model(m, &ConvertOptions::default()).to_json()?,
            Self::Collection(c) => {
                convert::convert_collection(c, &ConvertOptions::default()).to_json()?
            }
        })
    }
}

/// Format a number the way string coercion renders it.
///
/// Whole numbers print without a fractional part, `-0` prints as `0`, and
/// non-finite values print as `NaN`, `Infinity` or `-Infinity`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

pub(crate) fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    /// Deep structural equality. `NaN` equals `NaN`; models and collections
    /// compare by reference.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Model(a), Self::Model(b)) => a.ptr_eq(b),
            (Self::Collection(a), Self::Collection(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
            Self::Array(items) => f.debug_list().entries(items).finish(),
            Self::Object(map) => f.debug_map().entries(map).finish(),
            // Nested graphs may be circular, so only identify them.
            Self::Model(m) => write!(f, "Model({} {})", m.class().name(), m.client_id()),
            Self::Collection(c) => {
                write!(f, "Collection({} {})", c.class().name(), c.client_id())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Object(map)
    }
}

impl From<Model> for Value {
    fn from(m: Model) -> Self {
        Self::Model(m)
    }
}

impl From<&Model> for Value {
    fn from(m: &Model) -> Self {
        Self::Model(m.clone())
    }
}

impl From<Vec<Model>> for Value {
    fn from(models: Vec<Model>) -> Self {
        Self::Array(models.into_iter().map(Self::Model).collect())
    }
}

impl From<&[Model]> for Value {
    fn from(models: &[Model]) -> Self {
        Self::Array(models.iter().cloned().map(Self::Model).collect())
    }
}

impl From<Collection> for Value {
    fn from(c: Collection) -> Self {
        Self::Collection(c)
    }
}

impl From<&Collection> for Value {
    fn from(c: &Collection) -> Self {
        Self::Collection(c.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_equality() {
        let a = Value::object([("x", Value::from(1)), ("y", Value::array([1, 2]))]);
        let b = Value::object([("x", Value::from(1)), ("y", Value::array([1, 2]))]);
        let c = Value::object([("x", Value::from(1)), ("y", Value::array([1, 3]))]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(Value::Undefined, Value::Null);
    }

    #[test]
    fn test_nan_equality() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert!(!Value::Number(f64::NAN).strict_eq(&Value::Number(f64::NAN)));
        assert!(Value::from(2).strict_eq(&Value::from(2.0)));
    }

    #[test]
    fn test_id_key() {
        assert_eq!(Value::from(1).id_key(), Some("1".to_string()));
        assert_eq!(Value::from(1.5).id_key(), Some("1.5".to_string()));
        assert_eq!(Value::from("abc").id_key(), Some("abc".to_string()));
        assert_eq!(Value::Null.id_key(), None);
        assert_eq!(Value::Undefined.id_key(), None);
        assert_eq!(Value::Number(f64::NAN).id_key(), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_json_round_trip() {
        let json = serde_json::json!({
            "name": "Ada",
            "age": 36,
            "tags": ["math", null],
            "nested": { "ok": true }
        });
        let value = Value::from(json.clone());
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_undefined_members_are_omitted_from_json() {
        let value = Value::object([("a", Value::Undefined), ("b", Value::from(2))]);
        assert_eq!(value.to_json().unwrap(), serde_json::json!({ "b": 2 }));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
