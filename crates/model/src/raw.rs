use indexmap::IndexMap;
use serde_json::Value;

/// One row of a parsed source, field name to loosely typed value, in source
/// column order. Values are strings, numbers or null.
pub type RawRecord = IndexMap<String, Value>;
