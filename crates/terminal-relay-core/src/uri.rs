//! URI component marshalling for the command-execution bridge.
//!
//! Command arguments and results may embed URI objects. On the way out they
//! are canonicalized to a tagged five-field form so the transport never has
//! to guess; on the way back in the tag is stripped and missing fields are
//! defaulted.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Marker key identifying a marshalled URI object.
const URI_MARKER: &str = "$mid";

/// Marker value for URI objects.
const URI_MARKER_VALUE: i64 = 1;

/// Decomposed URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct UriComponents {
    /// URI scheme (e.g. `file`)
    pub scheme: String,
    /// Authority component
    pub authority: String,
    /// Path component
    pub path: String,
    /// Query component
    pub query: String,
    /// Fragment component
    pub fragment: String,
}

impl UriComponents {
    /// Extract components from a JSON object that looks like a URI
    /// (has string `scheme` and `path` fields).
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let scheme = obj.get("scheme")?.as_str()?;
        let path = obj.get("path")?.as_str()?;
        let field = |name: &str| {
            obj.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(Self {
            scheme: scheme.to_string(),
            authority: field("authority"),
            path: path.to_string(),
            query: field("query"),
            fragment: field("fragment"),
        })
    }
}

impl std::fmt::Display for UriComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

/// Canonicalize any embedded URI-shaped objects for transport.
///
/// An object with string `scheme` and `path` fields is replaced by the
/// tagged five-field form. The walk is recursive over arrays and objects.
pub fn serialize_uri_values(value: &mut Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                serialize_uri_values(item);
            }
        }
        Value::Object(_) => {
            if let Some(uri) = UriComponents::from_value(value) {
                *value = json!({
                    URI_MARKER: URI_MARKER_VALUE,
                    "scheme": uri.scheme,
                    "authority": uri.authority,
                    "path": uri.path,
                    "query": uri.query,
                    "fragment": uri.fragment,
                });
            } else if let Value::Object(map) = value {
                for item in map.values_mut() {
                    serialize_uri_values(item);
                }
            }
        }
        _ => {}
    }
}

/// Revive marshalled URI objects in an inbound payload.
///
/// Objects tagged with the URI marker are replaced by plain
/// [`UriComponents`]-shaped objects with the marker stripped and missing
/// fields defaulted to empty strings.
pub fn revive_uri_values(value: &mut Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                revive_uri_values(item);
            }
        }
        Value::Object(_) => {
            let is_uri = value
                .get(URI_MARKER)
                .and_then(Value::as_i64)
                .is_some_and(|m| m == URI_MARKER_VALUE);
            if is_uri {
                let field = |name: &str| {
                    value
                        .get(name)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                let revived = json!({
                    "scheme": field("scheme"),
                    "authority": field("authority"),
                    "path": field("path"),
                    "query": field("query"),
                    "fragment": field("fragment"),
                });
                *value = revived;
            } else if let Value::Object(map) = value {
                for item in map.values_mut() {
                    revive_uri_values(item);
                }
            }
        }
        _ => {}
    }
}
