//! Request/response shapes of the external account and catalog store.
//!
//! The store speaks the same framing as everything else. Each call opens
//! a connection, sends one [`StoreRequest`], reads one [`StoreResponse`].

use serde::{Deserialize, Serialize};

/// `{ "entity": "Game", "action": "read", "data": { ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub entity: String,
    pub action: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl StoreRequest {
    pub fn new(
        entity: impl Into<String>,
        action: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            entity: entity.into(),
            action: action.into(),
            data,
        }
    }
}

/// `{ "ok": true, "result": ... }` or `{ "ok": false, "error": "..." }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl StoreResponse {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            ok: true,
            result,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}
