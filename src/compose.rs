//! Maps a [`ValueMap`] onto a request body and query string.
//!
//! Body fields come only from flags the user explicitly set. A set flag with
//! a zero value is still sent, and its path is recorded in the force-send set
//! so the remote treats it as a deliberate clear rather than "leave alone".
//!
//! The JSON rendering in [`Request::into_body`] writes every recorded path,
//! zero or not, so force-sent paths reach the wire without further handling.
//! The set itself is kept for callers that need to tell clears apart.

use crate::{
    error::{Error, Result},
    flags::{FlagValue, Kind, ValueMap},
};
use serde_json::{Map, Value as Json};
use std::collections::{BTreeMap, BTreeSet};

/// A neutral request record: set paths, their values, and the zero-valued
/// paths that must be transmitted anyway
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    fields: BTreeMap<String, Json>,
    force_send: BTreeSet<String>,
}

impl Request {
    pub fn force_send(&self) -> &BTreeSet<String> {
        &self.force_send
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Json> {
        self.fields.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Folds the dotted paths into a nested JSON object, allocating a parent
    /// object only when at least one of its children is set. Every path in
    /// [`Request::force_send`] is present in the result.
    pub fn into_body(self) -> Json {
        let mut root = Map::new();

        for (path, value) in self.fields {
            let mut segments = path.split('.').peekable();
            let mut cursor = &mut root;

            while let Some(segment) = segments.next() {
                if segments.peek().is_none() {
                    cursor.insert(segment.to_owned(), value);
                    break;
                }

                let entry = cursor
                    .entry(segment.to_owned())
                    .or_insert_with(|| Json::Object(Map::new()));

                if !entry.is_object() {
                    *entry = Json::Object(Map::new());
                }

                cursor = match entry {
                    Json::Object(map) => map,
                    _ => unreachable!("entry was just made an object"),
                };
            }
        }

        Json::Object(root)
    }
}

/// Parses `k1=v1;k2=v2`. `=` and `;` are reserved and cannot be escaped, an
/// empty string is an empty set of pairs.
pub fn parse_mini(raw: &str) -> Result<Vec<(&str, &str)>, String> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    raw.split(';')
        .map(|entry| {
            let mut parts = entry.splitn(3, '=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) if !key.trim().is_empty() => {
                    Ok((key.trim(), value))
                }
                (_, _, Some(_)) => Err(format!("entry `{entry}` contains more than one '='")),
                _ => Err(format!("entry `{entry}` is not of the form key=value")),
            }
        })
        .collect()
}

/// The value kind of one key inside a structured record flag
pub type Schema = &'static [(&'static str, Kind)];

fn typed(kind: Kind, raw: &str) -> Result<Json, String> {
    Ok(match kind {
        Kind::String => Json::String(raw.to_owned()),
        Kind::StringList | Kind::StringArray => Json::Array(
            raw.split(',')
                .filter(|s| !s.is_empty())
                .map(|s| Json::String(s.to_owned()))
                .collect(),
        ),
        scalar => FlagValue::parse(scalar, raw)?.to_json(),
    })
}

#[derive(Debug)]
pub struct Composer<'m> {
    map: &'m ValueMap,
    request: Request,
}

impl<'m> Composer<'m> {
    pub fn new(map: &'m ValueMap) -> Self {
        Self {
            map,
            request: Request::default(),
        }
    }

    fn explicit(&self, flag: &str) -> Option<&'m FlagValue> {
        self.map.get(flag).filter(|v| v.is_set).map(|v| &v.value)
    }

    fn put(&mut self, path: &str, value: Json, zero: bool) {
        if zero {
            self.request.force_send.insert(path.to_owned());
        }
        self.request.fields.insert(path.to_owned(), value);
    }

    /// Copies a scalar or list flag to `path`
    pub fn field(&mut self, flag: &str, path: &str) -> &mut Self {
        if let Some(value) = self.explicit(flag) {
            self.put(path, value.to_json(), value.is_zero());
        }
        self
    }

    /// Copies several flags whose name is also their path
    pub fn fields(&mut self, flags: &[&str]) -> &mut Self {
        for flag in flags {
            self.field(flag, flag);
        }
        self
    }

    /// Parses a `k=v;k2=v2` string flag into a JSON object at `path`. Keys may
    /// be dotted to address nested objects.
    pub fn map_field(&mut self, flag: &str, path: &str) -> Result<&mut Self> {
        let Some(value) = self.explicit(flag) else {
            return Ok(self);
        };

        let raw = value.to_string();
        let pairs = parse_mini(&raw).map_err(|msg| Error::composer(flag, &raw, msg))?;

        let mut inner = Request::default();
        for (key, value) in &pairs {
            inner
                .fields
                .insert((*key).to_owned(), Json::String((*value).to_owned()));
        }

        self.put(path, inner.into_body(), pairs.is_empty());
        Ok(self)
    }

    /// Parses a repeated flag whose every element is a `k=v;...` record into
    /// an array of objects at `path`
    pub fn records(&mut self, flag: &str, path: &str, schema: Schema) -> Result<&mut Self> {
        let Some(value) = self.explicit(flag) else {
            return Ok(self);
        };

        let items = match value {
            FlagValue::StringArray(items) | FlagValue::StringList(items) => items.clone(),
            FlagValue::String(s) if s.is_empty() => Vec::new(),
            other => vec![other.to_string()],
        };

        let mut records = Vec::with_capacity(items.len());
        for item in &items {
            records.push(record(flag, item, schema)?);
        }

        self.put(path, Json::Array(records), items.is_empty());
        Ok(self)
    }

    /// Parses a single `k=v;...` record flag into an object at `path`
    pub fn record(&mut self, flag: &str, path: &str, schema: Schema) -> Result<&mut Self> {
        let Some(value) = self.explicit(flag) else {
            return Ok(self);
        };

        let raw = value.to_string();
        let body = record(flag, &raw, schema)?;
        self.put(path, body, raw.is_empty());
        Ok(self)
    }

    /// Sets a computed value at `path`, recording it for force-send if zero
    pub fn with(&mut self, path: &str, value: Json) -> &mut Self {
        let zero = match &value {
            Json::Null => true,
            Json::Bool(b) => !b,
            Json::Number(n) => n.as_f64() == Some(0.0),
            Json::String(s) => s.is_empty(),
            Json::Array(a) => a.is_empty(),
            Json::Object(o) => o.is_empty(),
        };
        self.put(path, value, zero);
        self
    }

    pub fn finish(&mut self) -> Request {
        std::mem::take(&mut self.request)
    }

    /// Shorthand for `finish().into_body()`, the rendered body already
    /// carries every force-sent path
    pub fn body(&mut self) -> Json {
        self.finish().into_body()
    }
}

fn record(flag: &str, raw: &str, schema: Schema) -> Result<Json> {
    let pairs = parse_mini(raw).map_err(|msg| Error::composer(flag, raw, msg))?;

    let mut inner = Request::default();
    for (key, value) in pairs {
        let kind = schema
            .iter()
            .find_map(|(k, kind)| (*k == key).then_some(*kind))
            .ok_or_else(|| {
                let known: Vec<_> = schema.iter().map(|(k, _)| *k).collect();
                Error::composer(
                    flag,
                    raw,
                    format!("unknown key `{key}`, expected one of {}", known.join(", ")),
                )
            })?;

        let value = typed(kind, value).map_err(|msg| Error::composer(flag, raw, msg))?;
        inner.fields.insert(key.to_owned(), value);
    }

    Ok(inner.into_body())
}

/// Query parameters, taken from the effective value of flags (defaults included)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one parameter per named flag that has a value, named after the flag
    pub fn from_flags(map: &ValueMap, flags: &[&str]) -> Self {
        let mut query = Self::new();
        for flag in flags {
            query = query.flag(map, flag, flag);
        }
        query
    }

    /// Adds `param` from `flag` if it has a value; lists become repeated parameters
    pub fn flag(mut self, map: &ValueMap, flag: &str, param: &str) -> Self {
        match map.get(flag).map(|v| &v.value) {
            Some(FlagValue::StringList(items) | FlagValue::StringArray(items)) => {
                for item in items {
                    self.pairs.push((param.to_owned(), item.clone()));
                }
            }
            Some(FlagValue::String(s)) if s.is_empty() => {}
            Some(value) => self.pairs.push((param.to_owned(), value.to_string())),
            None => {}
        }
        self
    }

    pub fn push(mut self, param: &str, value: impl Into<String>) -> Self {
        self.pairs.push((param.to_owned(), value.into()));
        self
    }

    pub fn get(&self, param: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find_map(|(k, v)| (k == param).then_some(v.as_str()))
    }

    /// Replaces every occurrence of `param`
    pub fn set(mut self, param: &str, value: impl Into<String>) -> Self {
        self.pairs.retain(|(k, _)| k != param);
        self.push(param, value)
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}
