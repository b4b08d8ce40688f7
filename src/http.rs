//! HTTP value types (`spec.md` §6, `SPEC_FULL.md` §2). The wire transport
//! itself — socket accept loop, header parsing, keep-alive — is an external
//! collaborator; this module only models the request/response shapes the
//! rest of the crate exchanges with it.

use crate::error::Kind;
use serde::Serialize;
use std::collections::HashMap;

/// One inbound HTTP request, already split into method/path/query/headers
/// by the transport; the body is left as a [`crate::upload::pipeline::BodyReader`]
/// so large uploads are never buffered whole in memory.
pub struct Request<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

impl<'a> Request<'a> {
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Parses a `key=value&key=value` query string into a map, matching how
/// `?path=...&name=...` parameters are read by the fs handlers.
pub fn parse_query(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut it = pair.splitn(2, '=');
        let key = it.next().unwrap_or_default();
        let value = it.next().unwrap_or_default();
        out.insert(percent_decode(key), percent_decode(value));
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    out.push(value);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// A response body + status, ready for the transport to serialize.
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Response {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
        Response {
            status,
            content_type: "application/json",
            body,
        }
    }

    pub fn ok_json<T: Serialize>(value: &T) -> Response {
        Response::json(200, value)
    }

    /// The `{"error":"<TOKEN>"}` envelope every failed handler returns
    /// (`spec.md` §7).
    pub fn from_error(kind: Kind) -> Response {
        Response::json(kind.status(), &kind.to_json())
    }

    pub fn binary(body: Vec<u8>) -> Response {
        Response {
            status: 200,
            content_type: "application/octet-stream",
            body,
        }
    }
}
