//! Request and response envelopes exchanged with the Python handler

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// String keys to an ordered list of string values (headers, query, params)
pub type MultiMap = HashMap<String, Vec<String>>;

/// Route path -> HTTP methods, as returned by the optional init callable.
/// Informational only; the bridge never enforces it.
pub type RouteTable = MultiMap;

/// One inbound request, built per call and never retained
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Crosses the boundary as `str`; binary request bodies are not supported
    pub body: String,
    pub path_params: MultiMap,
    pub query: MultiMap,
    pub headers: MultiMap,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        push(&mut self.headers, name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        push(&mut self.query, name.into(), value.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        push(&mut self.path_params, name.into(), value.into());
        self
    }
}

/// What the handler sent back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: MultiMap,
}

impl Response {
    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// Body as text, if it is valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

fn push(map: &mut MultiMap, key: String, value: String) {
    map.entry(key).or_default().push(value);
}
