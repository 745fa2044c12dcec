//! Stock pipes covering the usual framing chores.

use async_trait::async_trait;
use jsonschema::Validator;
use serde_json::Value;

use crate::controller::ConnectionContext;
use crate::error::SessionError;
use crate::message::Payload;
use crate::pipe::Pipe;

/// Decodes binary frames to UTF-8 text; text passes through unchanged.
pub struct Utf8Pipe;

#[async_trait]
impl Pipe for Utf8Pipe {
    async fn transform(
        &self,
        value: Payload,
        _ctx: &ConnectionContext,
    ) -> Result<Payload, SessionError> {
        match value {
            Payload::Binary(data) => match String::from_utf8(data) {
                Ok(text) => Ok(Payload::Text(text)),
                Err(_) => Err(SessionError::bad_request("Invalid UTF-8")),
            },
            other => Ok(other),
        }
    }
}

/// Parses text frames into JSON values; already-parsed JSON passes through.
pub struct JsonParsePipe;

#[async_trait]
impl Pipe for JsonParsePipe {
    async fn transform(
        &self,
        value: Payload,
        _ctx: &ConnectionContext,
    ) -> Result<Payload, SessionError> {
        match value {
            Payload::Json(parsed) => Ok(Payload::Json(parsed)),
            Payload::Text(text) => serde_json::from_str(&text)
                .map(Payload::Json)
                .map_err(|_| SessionError::bad_request("Invalid JSON")),
            Payload::Binary(_) => Err(SessionError::bad_request("Invalid JSON")),
        }
    }
}

/// Serializes JSON values to text frames; text passes through unchanged.
pub struct JsonStringifyPipe;

#[async_trait]
impl Pipe for JsonStringifyPipe {
    async fn transform(
        &self,
        value: Payload,
        _ctx: &ConnectionContext,
    ) -> Result<Payload, SessionError> {
        match value {
            Payload::Json(json) => serde_json::to_string(&json)
                .map(Payload::Text)
                .map_err(|err| SessionError::internal().with_message(err.to_string())),
            other => Ok(other),
        }
    }
}

/// Validates JSON payloads against a compiled JSON Schema.
///
/// The schema is compiled once at route registration; validation failures
/// become BadRequest with the collected issue list.
pub struct SchemaValidationPipe {
    schema: Validator,
}

impl SchemaValidationPipe {
    pub fn new(schema: &Value) -> Result<Self, SessionError> {
        let compiled = jsonschema::validator_for(schema)
            .map_err(|err| SessionError::internal().with_message(format!("invalid schema: {err}")))?;
        Ok(Self { schema: compiled })
    }
}

#[async_trait]
impl Pipe for SchemaValidationPipe {
    async fn transform(
        &self,
        value: Payload,
        _ctx: &ConnectionContext,
    ) -> Result<Payload, SessionError> {
        let Payload::Json(json) = &value else {
            return Err(SessionError::bad_request("Expected JSON payload"));
        };

        let issues: Vec<String> = self
            .schema
            .iter_errors(json)
            .map(|err| err.to_string())
            .collect();

        if issues.is_empty() {
            Ok(value)
        } else {
            Err(SessionError::bad_request(issues.join("; ")))
        }
    }
}
