//! Untyped key/value access for callers written against the older
//! "one getter, one setter" interface.
//!
//! Values cross this boundary as `serde_json::Value`; the type tag is
//! inferred on the way in and all work is delegated to the typed vault.
//! A `None` key addresses the whole domain.

use serde_json::{Map, Number, Value as Json};

use super::service::Vault;
use super::store::DomainMap;
use super::value::Value;
use crate::errors::{Result, VaultError};
use crate::storage::Persistence;

pub trait GenericVault {
    /// One value (`Null` when absent), or the whole domain as an object.
    fn get_value(&self, domain: &str, key: Option<&str>) -> Result<Json>;

    /// Store one value, or replace the whole domain with an object.
    ///
    /// `Null` removes the addressed key or domain.
    fn put_value(&self, domain: &str, key: Option<&str>, value: Json) -> Result<()>;

    /// Remove one key, or the whole domain.
    fn unset(&self, domain: &str, key: Option<&str>) -> Result<()>;
}

impl<S: Persistence> GenericVault for Vault<S> {
    fn get_value(&self, domain: &str, key: Option<&str>) -> Result<Json> {
        match key {
            Some(key) => Ok(self.get(domain, key)?.map_or(Json::Null, to_json)),
            None => {
                let entries: Map<String, Json> = self
                    .get_domain(domain)?
                    .into_iter()
                    .map(|(k, v)| (k, to_json(v)))
                    .collect();
                Ok(Json::Object(entries))
            }
        }
    }

    fn put_value(&self, domain: &str, key: Option<&str>, value: Json) -> Result<()> {
        match (key, value) {
            (Some(key), Json::Null) => self.unset_key(domain, key),
            (Some(key), value) => self.put(domain, key, from_json(key, value)?),
            (None, Json::Null) => self.unset_domain(domain),
            (None, Json::Object(entries)) => {
                let mut mapping = DomainMap::new();
                for (key, value) in entries {
                    // Null members are simply left out of the new domain.
                    if !value.is_null() {
                        let value = from_json(&key, value)?;
                        mapping.insert(key, value);
                    }
                }
                self.put_domain(domain, mapping)
            }
            (None, other) => Err(VaultError::UnsupportedValue(format!(
                "replacing domain '{domain}' needs an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn unset(&self, domain: &str, key: Option<&str>) -> Result<()> {
        match key {
            Some(key) => self.unset_key(domain, key),
            None => self.unset_domain(domain),
        }
    }
}

/// Infer a tag for a scalar JSON value.
fn from_json(key: &str, value: Json) -> Result<Value> {
    match value {
        Json::Bool(b) => Ok(Value::Boolean(b)),
        Json::String(s) => Ok(Value::String(s)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if n.is_u64() {
                Err(VaultError::UnsupportedValue(format!(
                    "'{key}': integer {n} does not fit in 64 signed bits"
                )))
            } else {
                n.as_f64().map(Value::Float).ok_or_else(|| {
                    VaultError::UnsupportedValue(format!("'{key}': number {n} is not representable"))
                })
            }
        }
        other => Err(VaultError::UnsupportedValue(format!(
            "'{key}': {} values cannot be stored",
            json_kind(&other)
        ))),
    }
}

/// Non-finite floats have no JSON form and come back as `Null`.
fn to_json(value: Value) -> Json {
    match value {
        Value::Boolean(b) => Json::Bool(b),
        Value::Integer(i) => Json::Number(i.into()),
        Value::Float(f) => Number::from_f64(f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
