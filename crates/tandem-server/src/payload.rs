//! Webhook payload extraction.
//!
//! Bodies arrive as JSON, or as form-url-encoded with a `data` field
//! containing JSON (some emitters only speak forms). Parsing happens once
//! here; downstream components work with the tagged record.

use serde_json::Value;
use thiserror::Error;

use tandem_core::models::WebhookAction;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Malformed payload: {0}")]
    Malformed(String),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Document identity and action extracted from a webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPayload {
    pub doctype: String,
    pub docname: String,
    pub action: WebhookAction,
    /// The JSON text the identity was extracted from
    pub raw: String,
}

/// Parse a webhook request body.
///
/// Tries JSON first; falls back to form-url-encoded with a JSON `data`
/// field. `doctype`/`name`/`action` are read from the top level, then from
/// a nested `doc` object; an unknown action defaults to update.
pub fn parse_payload(body: &[u8]) -> Result<ParsedPayload, PayloadError> {
    let (value, raw) = decode_body(body)?;

    let object = value
        .as_object()
        .ok_or_else(|| PayloadError::Malformed("payload is not a JSON object".to_string()))?;
    let nested = object.get("doc").and_then(Value::as_object);

    let field = |name: &str| -> Option<&str> {
        object
            .get(name)
            .and_then(Value::as_str)
            .or_else(|| nested.and_then(|doc| doc.get(name).and_then(Value::as_str)))
            .map(str::trim)
            .filter(|text| !text.is_empty())
    };

    let doctype = field("doctype").ok_or(PayloadError::MissingField("doctype"))?;
    let docname = field("name").ok_or(PayloadError::MissingField("name"))?;
    let action = field("action").map_or(WebhookAction::Update, WebhookAction::from_raw);

    Ok(ParsedPayload {
        doctype: doctype.to_string(),
        docname: docname.to_string(),
        action,
        raw,
    })
}

fn decode_body(body: &[u8]) -> Result<(Value, String), PayloadError> {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        let raw = String::from_utf8_lossy(body).into_owned();
        return Ok((value, raw));
    }

    // Form fallback: the JSON rides in a `data` field.
    let data = url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "data")
        .map(|(_, data)| data.into_owned())
        .ok_or_else(|| PayloadError::Malformed("body is neither JSON nor a data= form".to_string()))?;

    let value = serde_json::from_str::<Value>(&data)
        .map_err(|error| PayloadError::Malformed(format!("form data field: {error}")))?;
    Ok((value, data))
}
