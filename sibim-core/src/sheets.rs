//! Sheets v4 `values` transport.
//!
//! Reads a whole tab (`{Sheet}!A:Z`), turns the header row plus data rows
//! into objects, and appends rows ordered by the tab's own header row.
//! Only reads and appends exist in this API, so in-place updates are
//! reported as unsupported instead of being faked.

use crate::error::{Result, SibimError};
use crate::gateway::{Action, SheetGateway};
use crate::models::WriteReceipt;
use crate::normalizer::{Schema, INVENTORY_SCHEMA, MOVEMENT_SCHEMA, UPDATE_SCHEMA};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct SheetsValuesGateway {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl SheetsValuesGateway {
    pub fn new(
        base_url: &str,
        spreadsheet_id: &str,
        api_key: Option<String>,
        access_token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            api_key,
            access_token,
        })
    }

    fn values_url(&self, range: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SibimError::Config(format!("invalid sheets_base_url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| SibimError::Config(format!("sheets_base_url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        };
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_range(&self, action: Action, range: &str) -> Result<Vec<Vec<Value>>> {
        let url = self.values_url(range)?;
        tracing::debug!("🌐 Reading {}", range);

        let response = self.authorize(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(SibimError::ServerError {
                status: response.status().as_u16(),
            });
        }

        let range: ValueRange = response.json().await.map_err(|e| SibimError::MalformedResponse {
            action: action.to_string(),
            reason: e.to_string(),
        })?;
        Ok(range.values)
    }

    fn unsupported(&self, action: Action) -> SibimError {
        SibimError::Unsupported {
            action: action.to_string(),
            transport: self.transport_name().to_string(),
        }
    }
}

/// Header row plus data rows to one JSON object per row. Short rows are
/// padded with empty strings; columns with a blank header are dropped.
pub fn rows_to_objects(values: Vec<Vec<Value>>) -> Vec<Value> {
    let mut rows = values.into_iter();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header_row.iter().map(header_text).collect();

    rows.filter(|row| row.iter().any(|cell| !cell_is_blank(cell)))
        .map(|row| {
            let mut object = Map::new();
            for (index, header) in headers.iter().enumerate() {
                if header.is_empty() {
                    continue;
                }
                let cell = row.get(index).cloned().unwrap_or_else(|| Value::String(String::new()));
                object.insert(header.clone(), cell);
            }
            Value::Object(object)
        })
        .collect()
}

fn header_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cell_is_blank(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn schema_for(action: Action) -> &'static Schema {
    match action {
        Action::AddMovement => &MOVEMENT_SCHEMA,
        Action::AddUpdate => &UPDATE_SCHEMA,
        _ => &INVENTORY_SCHEMA,
    }
}

#[async_trait]
impl SheetGateway for SheetsValuesGateway {
    fn transport_name(&self) -> &'static str {
        "sheets_api"
    }

    async fn fetch(&self, action: Action, _params: &[(&str, &str)]) -> Result<Value> {
        if action.is_write() {
            return Err(self.unsupported(action));
        }
        let sheet = action.sheet().ok_or_else(|| self.unsupported(action))?;

        let values = self.read_range(action, &format!("{}!A:Z", sheet)).await?;
        let objects = rows_to_objects(values);
        tracing::info!("✅ {}: {} rows", sheet, objects.len());
        Ok(Value::Array(objects))
    }

    async fn write(&self, action: Action, data: Value) -> Result<WriteReceipt> {
        if !matches!(action, Action::AddItem | Action::AddMovement | Action::AddUpdate) {
            return Err(self.unsupported(action));
        }
        let sheet = action.sheet().ok_or_else(|| self.unsupported(action))?;
        let Value::Object(record) = data else {
            return Err(SibimError::InvalidPayload(format!("{} expects a JSON object", action)));
        };

        let header_rows = self.read_range(action, &format!("{}!1:1", sheet)).await?;
        let headers: Vec<String> = header_rows
            .first()
            .map(|row| row.iter().map(header_text).collect())
            .unwrap_or_default();
        if headers.is_empty() {
            return Err(SibimError::MalformedResponse {
                action: action.to_string(),
                reason: format!("sheet {} has no header row", sheet),
            });
        }

        let row = schema_for(action).row_for_headers(&headers, &record);
        let url = self.values_url(&format!("{}!A:Z:append", sheet))?;

        tracing::info!("💾 Appending row to {}", sheet);
        let response = self
            .authorize(self.client.post(url))
            .query(&[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({
                "range": format!("{}!A:Z", sheet),
                "majorDimension": "ROWS",
                "values": [row],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SibimError::ServerError {
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .pointer("/updates/updatedRange")
            .and_then(Value::as_str)
            .map(|range| format!("appended {}", range));

        Ok(WriteReceipt {
            action: action.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}
