use std::collections::HashMap;
use std::path::PathBuf;

use axum::http::Method;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{BackendError, Result};
use crate::model::UserInfo;

/// Inbound request as handed over by the transport.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Bearer token without the scheme prefix
    pub jwt: Option<String>,
    /// Client address, used for per-origin anonymous rate limiting
    pub origin: Option<String>,
    /// Parsed JSON body, `Value::Null` when empty
    pub body: Value,
}

impl RawRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            jwt: None,
            origin: None,
            body: Value::Null,
        }
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_jwt(mut self, jwt: impl Into<String>) -> Self {
        self.jwt = Some(jwt.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// A file served as an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDownload {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
    pub length: u64,
}

impl FileDownload {
    pub async fn open(path: PathBuf, filename: &str, content_type: &str) -> Result<Self> {
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| BackendError::FileNotFound(filename.to_string()))?;
        if !metadata.is_file() {
            return Err(BackendError::FileNotFound(filename.to_string()));
        }
        Ok(Self {
            path,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            length: metadata.len(),
        })
    }
}

/// Value produced by an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    File(FileDownload),
}

impl Payload {
    pub fn json<T: Serialize>(value: T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::File(_) => None,
        }
    }
}

/// Typed view over one inbound request, owned by a single pipeline run.
#[derive(Debug, Clone)]
pub struct Request {
    raw: RawRequest,
    controller: String,
    action: String,
    params: HashMap<String, String>,
    user_id: Option<i32>,
    user: Option<UserInfo>,
    result: Option<Payload>,
}

fn present<'a>(map: &'a serde_json::Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.get(name).filter(|v| !v.is_null())
}

impl Request {
    pub fn new(
        raw: RawRequest,
        controller: &str,
        action: &str,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            raw,
            controller: controller.to_string(),
            action: action.to_string(),
            params,
            user_id: None,
            user: None,
            result: None,
        }
    }

    pub fn raw(&self) -> &RawRequest {
        &self.raw
    }

    pub fn get_controller(&self) -> &str {
        &self.controller
    }

    pub fn get_action(&self) -> &str {
        &self.action
    }

    pub fn get_jwt(&self) -> Option<&str> {
        self.raw.jwt.as_deref()
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn user_id(&self) -> Option<i32> {
        self.user_id
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    pub(crate) fn set_identity(&mut self, user_id: Option<i32>) {
        self.user_id = user_id;
    }

    pub(crate) fn set_user(&mut self, user: UserInfo) {
        self.user = Some(user);
    }

    /// The authenticated caller.
    pub fn get_user(&self) -> Result<&UserInfo> {
        match (&self.user_id, &self.user) {
            (Some(_), Some(user)) => Ok(user),
            _ => Err(BackendError::NotAuthenticated),
        }
    }

    /// Path parameter, then query string.
    pub fn get_string(&self, name: &str) -> Result<String> {
        self.params
            .get(name)
            .or_else(|| self.raw.query.get(name))
            .cloned()
            .ok_or_else(|| BackendError::MissingArgument(name.to_string()))
    }

    pub fn get_integer(&self, name: &str) -> Result<i64> {
        let value = self.get_string(name)?;
        value.trim().parse().map_err(|_| BackendError::InvalidType {
            name: name.to_string(),
            expected: "integer",
        })
    }

    fn body_field(&self, name: &str) -> Option<&Value> {
        self.raw.body.as_object().and_then(|map| present(map, name))
    }

    pub fn get_body_string(&self, name: &str) -> Result<String> {
        match self.body_field(name) {
            None => Err(BackendError::MissingArgument(name.to_string())),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(_) => Err(BackendError::InvalidType {
                name: name.to_string(),
                expected: "string",
            }),
        }
    }

    /// Required when `default` is `None`.
    pub fn get_body_number(&self, name: &str, default: Option<f64>) -> Result<f64> {
        let invalid = || BackendError::InvalidType {
            name: name.to_string(),
            expected: "number",
        };
        match self.body_field(name) {
            None => default.ok_or_else(|| BackendError::MissingArgument(name.to_string())),
            Some(Value::Number(n)) => n.as_f64().ok_or_else(invalid),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(invalid),
            Some(_) => Err(invalid()),
        }
    }

    pub fn get_body_integer(&self, name: &str) -> Result<i64> {
        let invalid = || BackendError::InvalidType {
            name: name.to_string(),
            expected: "integer",
        };
        match self.body_field(name) {
            None => Err(BackendError::MissingArgument(name.to_string())),
            Some(Value::Number(n)) => n.as_i64().ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    pub fn get_body_boolean(&self, name: &str, default: bool) -> Result<bool> {
        let invalid = || BackendError::InvalidType {
            name: name.to_string(),
            expected: "boolean",
        };
        match self.body_field(name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(invalid()),
            },
            Some(_) => Err(invalid()),
        }
    }

    pub fn get_body_array(&self, name: &str) -> Result<&Vec<Value>> {
        match self.body_field(name) {
            None => Err(BackendError::MissingArgument(name.to_string())),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(BackendError::InvalidType {
                name: name.to_string(),
                expected: "array",
            }),
        }
    }

    pub fn set_result(&mut self, payload: Payload) {
        self.result = Some(payload);
    }

    pub fn result(&self) -> Option<&Payload> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Option<Payload> {
        self.result
    }
}
