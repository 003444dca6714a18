//! Request field extraction.
//!
//! Clients send `val`, `payload`, `ip_port` and `num` as a form-urlencoded or JSON
//! body on every method (GET and DELETE included), or in the query string.
//! Body fields win over query fields.

use crate::causal::context::CausalContext;
use crate::error::KvsError;

use axum::http::{HeaderMap, Uri, header};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestParams {
    pub val: Option<String>,
    pub payload: Option<String>,
    pub ip_port: Option<String>,
    pub num: Option<String>,
}

impl RequestParams {
    pub fn parse(headers: &HeaderMap, uri: &Uri, body: &[u8]) -> Result<Self, KvsError> {
        let mut params = if body.iter().all(u8::is_ascii_whitespace) {
            Self::default()
        } else if is_json(headers, body) {
            Self::from_json(body)?
        } else {
            Self::from_form(body)?
        };

        if let Some(query) = uri.query() {
            params.fill_from(Self::from_form(query.as_bytes())?);
        }
        Ok(params)
    }

    fn from_form(raw: &[u8]) -> Result<Self, KvsError> {
        serde_urlencoded::from_bytes(raw).map_err(|e| KvsError::InvalidBody(e.to_string()))
    }

    fn from_json(raw: &[u8]) -> Result<Self, KvsError> {
        let fields: serde_json::Map<String, Value> =
            serde_json::from_slice(raw).map_err(|e| KvsError::InvalidBody(e.to_string()))?;
        let field = |name: &str| match fields.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            // Numbers for `num`, an inline object for `payload`.
            Some(other) => Some(other.to_string()),
        };
        Ok(Self {
            val: field("val"),
            payload: field("payload"),
            ip_port: field("ip_port"),
            num: field("num"),
        })
    }

    fn fill_from(&mut self, other: RequestParams) {
        self.val = self.val.take().or(other.val);
        self.payload = self.payload.take().or(other.payload);
        self.ip_port = self.ip_port.take().or(other.ip_port);
        self.num = self.num.take().or(other.num);
    }

    /// The client's causal context. Missing or empty means no dependencies.
    pub fn context(&self) -> Result<CausalContext, KvsError> {
        CausalContext::from_wire(self.payload.as_deref().unwrap_or_default())
    }

    pub fn ip_port(&self) -> Result<&str, KvsError> {
        self.ip_port
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .ok_or(KvsError::MissingField("ip_port"))
    }
}

fn is_json(headers: &HeaderMap, body: &[u8]) -> bool {
    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false);
    declared
        || body
            .iter()
            .find(|byte| !byte.is_ascii_whitespace())
            .is_some_and(|&byte| byte == b'{')
}
