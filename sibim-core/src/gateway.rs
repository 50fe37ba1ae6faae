//! Remote sheet gateway: the only place that talks HTTP.
//!
//! The [`SheetGateway`] trait is the seam the facade is built on. Reads hand
//! back raw JSON (normalization happens one level up); writes hand back a
//! [`WriteReceipt`] or an error, never an assumed success.

use crate::error::{Result, SibimError};
use crate::models::WriteReceipt;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetItems,
    GetItemById,
    GetUsers,
    GetDepartments,
    GetMovements,
    GetUpdates,
    GetConfig,
    AddItem,
    UpdateItem,
    BatchRestore,
    AddMovement,
    AddUpdate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetItems => "getItems",
            Action::GetItemById => "getItemById",
            Action::GetUsers => "getUsers",
            Action::GetDepartments => "getDepartments",
            Action::GetMovements => "getMovements",
            Action::GetUpdates => "getUpdates",
            Action::GetConfig => "getConfig",
            Action::AddItem => "addItem",
            Action::UpdateItem => "updateItem",
            Action::BatchRestore => "batchRestore",
            Action::AddMovement => "addMovement",
            Action::AddUpdate => "addUpdate",
        }
    }

    /// Key under which the Apps Script wraps the list for this action.
    pub fn envelope(&self) -> Option<&'static str> {
        match self {
            Action::GetItems => Some("items"),
            Action::GetItemById => Some("item"),
            Action::GetUsers => Some("users"),
            Action::GetDepartments => Some("departments"),
            Action::GetMovements => Some("movements"),
            Action::GetUpdates => Some("updates"),
            Action::GetConfig => Some("config"),
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Action::AddItem
                | Action::UpdateItem
                | Action::BatchRestore
                | Action::AddMovement
                | Action::AddUpdate
        )
    }

    /// Spreadsheet tab behind the action. `None` for actions that only the
    /// Apps Script backend resolves.
    pub fn sheet(&self) -> Option<&'static str> {
        match self {
            Action::GetItems | Action::AddItem => Some("Inventario"),
            Action::GetUsers => Some("Usuarios"),
            Action::GetDepartments => Some("Departamentos"),
            Action::GetMovements | Action::AddMovement => Some("Movimientos"),
            Action::GetUpdates | Action::AddUpdate => Some("Actualizaciones"),
            Action::GetConfig => Some("Configuracion"),
            Action::GetItemById | Action::UpdateItem | Action::BatchRestore => None,
        }
    }
}

/// One read per tab, in the order the connection check reports them.
pub const SHEET_READS: [Action; 6] = [
    Action::GetItems,
    Action::GetDepartments,
    Action::GetUsers,
    Action::GetMovements,
    Action::GetUpdates,
    Action::GetConfig,
];

/// Reachability of one tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetStatus {
    pub sheet: &'static str,
    pub accessible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub transport: &'static str,
    pub sheets: Vec<SheetStatus>,
}

impl ConnectionReport {
    pub fn all_accessible(&self) -> bool {
        self.sheets.iter().all(|s| s.accessible)
    }

    pub fn accessible_count(&self) -> usize {
        self.sheets.iter().filter(|s| s.accessible).count()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait SheetGateway: Send + Sync {
    fn transport_name(&self) -> &'static str;

    /// Raw response body for a read action.
    async fn fetch(&self, action: Action, params: &[(&str, &str)]) -> Result<Value>;

    /// Send a write and report what the remote side said.
    async fn write(&self, action: Action, data: Value) -> Result<WriteReceipt>;

    /// Rows of a read action, or the reason there are none.
    async fn try_fetch_collection(&self, action: Action, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        let body = self.fetch(action, params).await?;
        extract_collection(action, body)
    }

    /// Try every tab once and report which ones answered.
    async fn check_connection(&self) -> ConnectionReport {
        let mut sheets = Vec::with_capacity(SHEET_READS.len());
        for action in SHEET_READS {
            let sheet = action.sheet().unwrap_or_else(|| action.as_str());
            let status = match self.try_fetch_collection(action, &[]).await {
                Ok(rows) => SheetStatus {
                    sheet,
                    accessible: true,
                    rows: Some(rows.len()),
                    error: None,
                },
                Err(e) => SheetStatus {
                    sheet,
                    accessible: false,
                    rows: None,
                    error: Some(e.to_string()),
                },
            };
            sheets.push(status);
        }

        let report = ConnectionReport {
            transport: self.transport_name(),
            sheets,
        };
        if report.all_accessible() {
            tracing::info!("✅ All {} sheets reachable", report.sheets.len());
        } else {
            tracing::warn!(
                "⚠️ {}/{} sheets reachable",
                report.accessible_count(),
                report.sheets.len()
            );
        }
        report
    }

    /// Rows of a read action; any failure is logged and yields an empty list.
    async fn fetch_collection(&self, action: Action, params: &[(&str, &str)]) -> Vec<Value> {
        match self.try_fetch_collection(action, params).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("❌ {} via {} failed: {}", action, self.transport_name(), e);
                Vec::new()
            }
        }
    }
}

/// Pull the row list out of a response body: a bare array, an envelope
/// object, or a single object treated as one row.
pub fn extract_collection(action: Action, body: Value) -> Result<Vec<Value>> {
    check_error_envelope(action, &body)?;
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => {
            let inner = action.envelope().and_then(|key| map.remove(key));
            match inner {
                Some(Value::Array(rows)) => Ok(rows),
                Some(Value::Object(obj)) => Ok(vec![Value::Object(obj)]),
                Some(Value::Null) => Ok(Vec::new()),
                Some(other) => Err(SibimError::MalformedResponse {
                    action: action.to_string(),
                    reason: format!("unexpected envelope value: {}", other),
                }),
                None if map.is_empty() => Ok(Vec::new()),
                None => Ok(vec![Value::Object(map)]),
            }
        }
        Value::Null => Ok(Vec::new()),
        other => Err(SibimError::MalformedResponse {
            action: action.to_string(),
            reason: format!("expected a list, got {}", other),
        }),
    }
}

/// Apps Script reports failures in-band as `{"error": ..., "message": ...}`.
pub fn check_error_envelope(action: Action, body: &Value) -> Result<()> {
    let Some(map) = body.as_object() else {
        return Ok(());
    };

    let flagged = match map.get("error") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    } || matches!(map.get("success"), Some(Value::Bool(false)));

    if !flagged {
        return Ok(());
    }

    let message = map
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| map.get("error").and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_string();

    if message.contains("getSheetByName") {
        tracing::error!(
            "The spreadsheet is missing a tab. Expected tabs: Inventario, Departamentos, Usuarios, Movimientos, Actualizaciones, Configuracion"
        );
    }

    Err(SibimError::Remote {
        action: action.to_string(),
        message,
    })
}

/// Google Apps Script Web App transport: one URL, `action` as discriminator.
#[derive(Debug, Clone)]
pub struct AppsScriptGateway {
    client: Client,
    script_url: String,
}

impl AppsScriptGateway {
    pub fn new(script_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            script_url: script_url.to_string(),
        })
    }
}

#[async_trait]
impl SheetGateway for AppsScriptGateway {
    fn transport_name(&self) -> &'static str {
        "apps_script"
    }

    async fn fetch(&self, action: Action, params: &[(&str, &str)]) -> Result<Value> {
        let cache_buster = chrono::Utc::now().timestamp_millis().to_string();

        tracing::debug!("🌐 GET {} action={}", self.script_url, action);

        let response = self
            .client
            .get(&self.script_url)
            .query(&[("action", action.as_str()), ("t", cache_buster.as_str())])
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SibimError::ServerError {
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).map_err(|e| SibimError::MalformedResponse {
            action: action.to_string(),
            reason: format!("body is not JSON: {}", e),
        })?;

        check_error_envelope(action, &body)?;
        Ok(body)
    }

    async fn write(&self, action: Action, data: Value) -> Result<WriteReceipt> {
        tracing::info!("💾 POST {} action={}", self.script_url, action);

        let response = self
            .client
            .post(&self.script_url)
            .json(&json!({ "action": action.as_str(), "data": data }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SibimError::ServerError {
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        let message = match serde_json::from_str::<Value>(&text) {
            Ok(body) => {
                check_error_envelope(action, &body)?;
                body.get("message").and_then(Value::as_str).map(str::to_string)
            }
            // Plain-text acknowledgements are still acknowledgements
            Err(_) => Some(text.trim().to_string()).filter(|s| !s.is_empty()),
        };

        tracing::info!("✅ {} accepted ({})", action, status.as_u16());
        Ok(WriteReceipt {
            action: action.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_collection_shapes() {
        let bare = extract_collection(Action::GetItems, json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(bare.len(), 2);

        let wrapped = extract_collection(Action::GetUsers, json!({"users": [{"u": 1}]})).unwrap();
        assert_eq!(wrapped, vec![json!({"u": 1})]);

        let single = extract_collection(Action::GetConfig, json!({"config": {"k": "v"}})).unwrap();
        assert_eq!(single, vec![json!({"k": "v"})]);

        let empty = extract_collection(Action::GetMovements, json!({"movements": null})).unwrap();
        assert!(empty.is_empty());

        assert!(extract_collection(Action::GetItems, json!("nope")).is_err());
        assert!(extract_collection(Action::GetItems, json!({"items": 3})).is_err());
    }

    #[test]
    fn test_error_envelope() {
        let err = check_error_envelope(
            Action::GetItems,
            &json!({"error": true, "message": "Cannot call getSheetByName"}),
        )
        .unwrap_err();
        assert!(matches!(err, SibimError::Remote { ref message, .. } if message.contains("getSheetByName")));

        assert!(check_error_envelope(Action::AddItem, &json!({"success": false})).is_err());
        assert!(check_error_envelope(Action::AddItem, &json!({"success": true, "error": null})).is_ok());
        assert!(check_error_envelope(Action::GetItems, &json!([])).is_ok());
    }

    #[test]
    fn test_action_names() {
        assert_eq!(Action::GetItemById.as_str(), "getItemById");
        assert!(Action::BatchRestore.is_write());
        assert!(!Action::GetConfig.is_write());
        assert_eq!(Action::GetDepartments.envelope(), Some("departments"));
        assert!(Action::AddUpdate.is_write());
        assert_eq!(Action::AddUpdate.sheet(), Some("Actualizaciones"));
        assert_eq!(Action::UpdateItem.sheet(), None);
    }
}
