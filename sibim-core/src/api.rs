//! Inventory data access facade.
//!
//! Reads go cache first, then the gateway, then (on failure) whatever the
//! cache last held, then the built-in sample set when enabled, then nothing.
//! Writes go straight to the gateway and only touch the cache once the
//! remote side has acknowledged them.

use crate::cache::{ResponseCache, INVENTORY};
use crate::error::Result;
use crate::gateway::{Action, ConnectionReport, SheetGateway};
use crate::models::{
    ConfigEntry, Dashboard, Department, InventoryItem, InventoryStats, UserRecord, WriteReceipt,
};
use crate::normalizer::{cell_text, Record, CONFIG_SCHEMA, INVENTORY_SCHEMA, MOVEMENT_SCHEMA, UPDATE_SCHEMA};
use crate::sample;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEPARTMENTS: &str = "departments";
pub const MOVEMENTS: &str = "movements";
pub const UPDATES: &str = "updates";

#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Wait after an acknowledged write before dropping the cache, so the
    /// spreadsheet has time to show the new row.
    pub write_settle: Duration,
    pub max_rows_per_fetch: usize,
    pub use_sample_data: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            write_settle: Duration::from_secs(2),
            max_rows_per_fetch: 5000,
            use_sample_data: false,
        }
    }
}

/// Source of the user list consulted at login.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Vec<UserRecord>;
}

pub struct SibimApi {
    gateway: Arc<dyn SheetGateway>,
    cache: ResponseCache,
    settings: ApiSettings,
}

impl SibimApi {
    pub fn new(gateway: Arc<dyn SheetGateway>, cache: ResponseCache, settings: ApiSettings) -> Self {
        Self {
            gateway,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    // === INVENTORY ===

    pub async fn fetch_items(&self) -> Vec<InventoryItem> {
        if let Some(items) = self.cache.get::<Vec<InventoryItem>>(INVENTORY) {
            tracing::debug!("Using cached inventory ({} items)", items.len());
            return items;
        }

        tracing::info!("🔄 Syncing inventory with {}", self.gateway.transport_name());
        match self.gateway.try_fetch_collection(Action::GetItems, &[]).await {
            Ok(rows) => {
                let mut items: Vec<InventoryItem> = INVENTORY_SCHEMA
                    .normalize_rows(&rows)
                    .into_iter()
                    .map(InventoryItem::from_record)
                    .collect();
                if items.len() > self.settings.max_rows_per_fetch {
                    tracing::warn!(
                        "Inventory has {} rows, keeping the first {}",
                        items.len(),
                        self.settings.max_rows_per_fetch
                    );
                    items.truncate(self.settings.max_rows_per_fetch);
                }
                if let Err(e) = self.cache.put(INVENTORY, &items) {
                    tracing::warn!("Could not cache inventory: {}", e);
                }
                items
            }
            Err(e) => {
                tracing::warn!("❌ Inventory sync failed: {}", e);
                self.fallback_items()
            }
        }
    }

    fn fallback_items(&self) -> Vec<InventoryItem> {
        if let Some(items) = self.cache.get_stale::<Vec<InventoryItem>>(INVENTORY) {
            tracing::warn!("Serving last known inventory ({} items)", items.len());
            return items;
        }
        if self.settings.use_sample_data {
            tracing::warn!("Serving sample inventory");
            return sample::inventory();
        }
        Vec::new()
    }

    /// Drop the cached inventory and fetch it again.
    pub async fn force_refresh_items(&self) -> Vec<InventoryItem> {
        if let Err(e) = self.cache.invalidate(INVENTORY) {
            tracing::warn!("Could not invalidate inventory cache: {}", e);
        }
        self.fetch_items().await
    }

    pub async fn get_item_by_id(&self, id: &str) -> Option<InventoryItem> {
        match self.gateway.fetch(Action::GetItemById, &[("id", id)]).await {
            Ok(body) => {
                let body = match body {
                    Value::Object(mut map) => map.remove("item").unwrap_or(Value::Object(map)),
                    other => other,
                };
                if let Value::Object(raw) = body {
                    let item = InventoryItem::from_raw(&raw);
                    if item.key().is_some() {
                        return Some(item);
                    }
                }
            }
            Err(e) => tracing::debug!("getItemById unavailable ({}), searching local list", e),
        }

        self.fetch_items().await.into_iter().find(|item| {
            item.id.as_deref() == Some(id) || item.codigo.as_deref().map_or(false, |c| c.eq_ignore_ascii_case(id))
        })
    }

    /// Case-insensitive match on id/codigo, name, serial, category and custodian.
    pub async fn search_items(&self, query: &str) -> Vec<InventoryItem> {
        let items = self.fetch_items().await;
        filter_items(items, query)
    }

    pub async fn items_by_department(&self, department: &str) -> Vec<InventoryItem> {
        self.fetch_items()
            .await
            .into_iter()
            .filter(|item| eq_ignore_case(item.departamento.as_deref(), department))
            .collect()
    }

    pub async fn items_by_status(&self, status: &str) -> Vec<InventoryItem> {
        self.fetch_items()
            .await
            .into_iter()
            .filter(|item| eq_ignore_case(item.estado.as_deref(), status))
            .collect()
    }

    pub async fn add_item(&self, item: &InventoryItem) -> Result<WriteReceipt> {
        let receipt = self.gateway.write(Action::AddItem, item.to_payload()).await?;
        self.after_write(INVENTORY).await;
        Ok(receipt)
    }

    pub async fn update_item(&self, item: &InventoryItem) -> Result<WriteReceipt> {
        let receipt = self.gateway.write(Action::UpdateItem, item.to_payload()).await?;
        self.after_write(INVENTORY).await;
        Ok(receipt)
    }

    pub async fn batch_restore(&self, items: &[InventoryItem]) -> Result<WriteReceipt> {
        let payload = Value::Array(items.iter().map(InventoryItem::to_payload).collect());
        let receipt = self.gateway.write(Action::BatchRestore, payload).await?;
        self.after_write(INVENTORY).await;
        Ok(receipt)
    }

    pub async fn record_movement(&self, movement: &Record) -> Result<WriteReceipt> {
        let payload = serde_json::to_value(movement)?;
        let receipt = self.gateway.write(Action::AddMovement, payload).await?;
        self.after_write(MOVEMENTS).await;
        Ok(receipt)
    }

    /// Append a change-log row to the updates sheet. Date, time, user and
    /// system columns are filled in when the caller leaves them out.
    pub async fn record_update(&self, update: &Record) -> Result<WriteReceipt> {
        let raw: serde_json::Map<String, Value> = update.clone().into_iter().collect();
        let mut row = UPDATE_SCHEMA.normalize_record(&raw);
        let now = chrono::Local::now();
        let defaults = [
            ("fecha", now.format("%d/%m/%Y").to_string()),
            ("hora", now.format("%H:%M:%S").to_string()),
            ("usuario", "SIBIM System".to_string()),
            ("sistema", format!("SIBIM v{}", env!("CARGO_PKG_VERSION"))),
            ("version", env!("CARGO_PKG_VERSION").to_string()),
        ];
        for (key, value) in defaults {
            row.entry(key.to_string()).or_insert(Value::String(value));
        }

        let payload = serde_json::to_value(&row)?;
        let receipt = self.gateway.write(Action::AddUpdate, payload).await?;
        self.after_write(UPDATES).await;
        Ok(receipt)
    }

    async fn after_write(&self, key: &str) {
        if !self.settings.write_settle.is_zero() {
            tokio::time::sleep(self.settings.write_settle).await;
        }
        if let Err(e) = self.cache.invalidate(key) {
            tracing::warn!("Could not invalidate {} cache: {}", key, e);
        }
    }

    // === OTHER SHEETS ===

    pub async fn get_users(&self) -> Vec<UserRecord> {
        tracing::debug!("Fetching user directory");
        self.gateway
            .fetch_collection(Action::GetUsers, &[])
            .await
            .iter()
            .filter_map(Value::as_object)
            .map(UserRecord::from_raw)
            .collect()
    }

    pub async fn get_departments(&self) -> Vec<Department> {
        let departments: Vec<Department> = self
            .cached_collection(DEPARTMENTS, Action::GetDepartments)
            .await
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(raw) => Some(Department::from_raw(&raw)),
                _ => None,
            })
            .filter(|d| !d.nombre.is_empty())
            .collect();

        if !departments.is_empty() {
            return departments;
        }

        tracing::info!("No departments sheet data, deriving from inventory");
        derive_departments(&self.fetch_items().await)
    }

    pub async fn get_movements(&self) -> Vec<Record> {
        let rows = self.cached_collection(MOVEMENTS, Action::GetMovements).await;
        MOVEMENT_SCHEMA.normalize_rows(&rows)
    }

    pub async fn get_updates(&self) -> Vec<Record> {
        let rows = self.cached_collection(UPDATES, Action::GetUpdates).await;
        UPDATE_SCHEMA.normalize_rows(&rows)
    }

    /// Settings keyed by their `clave` column. An Apps Script backend that
    /// already answers with a flat `{key: value}` object is accepted as is.
    pub async fn get_system_config(&self) -> BTreeMap<String, ConfigEntry> {
        let mut config = BTreeMap::new();
        for row in self.gateway.fetch_collection(Action::GetConfig, &[]).await {
            let Value::Object(raw) = row else { continue };
            match ConfigEntry::from_record(CONFIG_SCHEMA.normalize_record(&raw)) {
                Some((key, entry)) => {
                    config.insert(key, entry);
                }
                None => {
                    for (key, value) in raw {
                        let value = cell_text(&value).unwrap_or_default();
                        config.insert(key, ConfigEntry { value, ..Default::default() });
                    }
                }
            }
        }
        config
    }

    pub async fn check_connection(&self) -> ConnectionReport {
        self.gateway.check_connection().await
    }

    pub async fn get_stats(&self) -> Dashboard {
        let items = self.fetch_items().await;
        let movements = self.get_movements().await;
        let stats = InventoryStats::compute(&items, movements.len());
        Dashboard { items, stats }
    }

    async fn cached_collection(&self, key: &str, action: Action) -> Vec<Value> {
        if let Some(rows) = self.cache.get::<Vec<Value>>(key) {
            return rows;
        }
        match self.gateway.try_fetch_collection(action, &[]).await {
            Ok(rows) => {
                if let Err(e) = self.cache.put(key, &rows) {
                    tracing::warn!("Could not cache {}: {}", key, e);
                }
                rows
            }
            Err(e) => {
                tracing::warn!("❌ {} failed: {}", action, e);
                self.cache.get_stale(key).unwrap_or_default()
            }
        }
    }
}

#[async_trait]
impl UserDirectory for SibimApi {
    async fn list_users(&self) -> Vec<UserRecord> {
        self.get_users().await
    }
}

pub fn filter_items(items: Vec<InventoryItem>, query: &str) -> Vec<InventoryItem> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items;
    }
    let contains = |field: &Option<String>| {
        field
            .as_deref()
            .map_or(false, |v| v.to_lowercase().contains(&needle))
    };

    items
        .into_iter()
        .filter(|item| {
            contains(&item.id)
                || contains(&item.codigo)
                || contains(&item.nombre)
                || contains(&item.serie)
                || contains(&item.categoria)
                || contains(&item.responsable)
        })
        .collect()
}

/// Departments rebuilt from the inventory when the departments sheet is empty.
pub fn derive_departments(items: &[InventoryItem]) -> Vec<Department> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for item in items {
        let name = item.departamento.clone().unwrap_or_else(|| "Sin Asignar".to_string());
        *counts.entry(name).or_default() += 1;
    }

    let today = chrono::Local::now().format("%d/%m/%Y").to_string();
    counts
        .into_iter()
        .enumerate()
        .map(|(index, (nombre, count))| Department {
            id: Some((index + 1).to_string()),
            nombre,
            encargado: Some("Por asignar".to_string()),
            descripcion: Some("Cargado desde Inventario".to_string()),
            articulos_asignados: Some(count),
            fecha_creacion: Some(today.clone()),
            extra: BTreeMap::new(),
        })
        .collect()
}

fn eq_ignore_case(field: Option<&str>, wanted: &str) -> bool {
    field.map_or(false, |v| v.trim().to_lowercase() == wanted.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::Mutex;

    /// Accepts every write and remembers the payloads.
    #[derive(Default)]
    struct AcceptingGateway {
        writes: Mutex<Vec<(Action, Value)>>,
    }

    #[async_trait]
    impl SheetGateway for AcceptingGateway {
        fn transport_name(&self) -> &'static str {
            "accepting"
        }

        async fn fetch(&self, _action: Action, _params: &[(&str, &str)]) -> Result<Value> {
            Ok(json!([]))
        }

        async fn write(&self, action: Action, data: Value) -> Result<WriteReceipt> {
            self.writes.lock().unwrap().push((action, data));
            Ok(WriteReceipt {
                action: action.to_string(),
                status: 200,
                message: None,
            })
        }
    }

    fn api_with(gateway: Arc<AcceptingGateway>, settle: Duration) -> SibimApi {
        let cache = ResponseCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::at_millis(1_700_000_000_000)),
            Duration::from_secs(300),
        );
        SibimApi::new(
            gateway,
            cache,
            ApiSettings {
                write_settle: settle,
                ..Default::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_survives_until_settle_delay_elapses() {
        let api = Arc::new(api_with(Arc::new(AcceptingGateway::default()), Duration::from_secs(2)));
        api.cache().put(INVENTORY, &vec![item("1", "Silla", None)]).unwrap();

        let started = tokio::time::Instant::now();
        let writer = {
            let api = api.clone();
            tokio::spawn(async move { api.add_item(&item("2", "Mesa", None)).await })
        };

        // Let the write land and the settle sleep start
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(!writer.is_finished());
        assert!(api.cache().get::<Vec<InventoryItem>>(INVENTORY).is_some());

        let receipt = writer.await.unwrap().unwrap();
        assert_eq!(receipt.action, "addItem");
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(api.cache().get::<Vec<InventoryItem>>(INVENTORY).is_none());
        // payload survives for the stale fallback
        assert!(api.cache().get_stale::<Vec<InventoryItem>>(INVENTORY).is_some());
    }

    #[tokio::test]
    async fn test_record_update_fills_defaults() {
        let gateway = Arc::new(AcceptingGateway::default());
        let api = api_with(gateway.clone(), Duration::ZERO);

        let update: Record = [
            ("Tabla Afectada".to_string(), json!("Inventario")),
            ("Campo Modificado".to_string(), json!("estado")),
            ("Usuario".to_string(), json!("ana")),
        ]
        .into();
        api.record_update(&update).await.unwrap();

        let writes = gateway.writes.lock().unwrap();
        let (action, payload) = &writes[0];
        assert_eq!(*action, Action::AddUpdate);
        assert_eq!(payload["tabla_afectada"], json!("Inventario"));
        assert_eq!(payload["campo_modificado"], json!("estado"));
        assert_eq!(payload["usuario"], json!("ana"));
        assert!(payload["fecha"].is_string());
        assert!(payload["sistema"].as_str().unwrap().starts_with("SIBIM v"));
    }

    fn item(id: &str, nombre: &str, depto: Option<&str>) -> InventoryItem {
        InventoryItem {
            id: Some(id.to_string()),
            nombre: Some(nombre.to_string()),
            departamento: depto.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_items() {
        let items = vec![
            item("TZ-001", "Escritorio de madera", Some("TI")),
            item("TZ-002", "Silla", Some("TI")),
            InventoryItem { serie: Some("SN-ABC".into()), ..Default::default() },
        ];
        assert_eq!(filter_items(items.clone(), "escritorio").len(), 1);
        assert_eq!(filter_items(items.clone(), "tz-00").len(), 2);
        assert_eq!(filter_items(items.clone(), "abc").len(), 1);
        assert_eq!(filter_items(items.clone(), "  ").len(), 3);
        assert!(filter_items(items, "nada").is_empty());
    }

    #[test]
    fn test_derive_departments() {
        let items = vec![
            item("1", "a", Some("TI")),
            item("2", "b", Some("TI")),
            item("3", "c", None),
        ];
        let departments = derive_departments(&items);

        assert_eq!(departments.len(), 2);
        let sin = departments.iter().find(|d| d.nombre == "Sin Asignar").unwrap();
        assert_eq!(sin.articulos_asignados, Some(1));
        let ti = departments.iter().find(|d| d.nombre == "TI").unwrap();
        assert_eq!(ti.articulos_asignados, Some(2));
        assert_eq!(ti.encargado.as_deref(), Some("Por asignar"));
    }
}
