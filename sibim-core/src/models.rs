use crate::normalizer::{cell_raw, cell_text, Record, DEPARTMENT_SCHEMA, INVENTORY_SCHEMA, USER_SCHEMA};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One inventory row after normalization. Every column is optional; unknown
/// columns are kept in `extra` under their slug.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codigo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marca: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modelo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serie: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grupo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departamento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsable: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estado: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_adquisicion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observaciones: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl InventoryItem {
    pub fn from_record(mut record: Record) -> Self {
        let mut take = |key: &str| record.remove(key).as_ref().and_then(cell_text);
        let item = InventoryItem {
            id: take("id"),
            codigo: take("codigo"),
            nombre: take("nombre"),
            marca: take("marca"),
            modelo: take("modelo"),
            serie: take("serie"),
            categoria: take("categoria"),
            grupo: take("grupo"),
            departamento: take("departamento"),
            responsable: take("responsable"),
            area: take("area"),
            valor: take("valor"),
            estado: take("estado"),
            fecha_adquisicion: take("fecha_adquisicion"),
            descripcion: take("descripcion"),
            observaciones: take("observaciones"),
            extra: BTreeMap::new(),
        };
        InventoryItem {
            extra: record.into_iter().collect(),
            ..item
        }
    }

    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        Self::from_record(INVENTORY_SCHEMA.normalize_record(raw))
    }

    /// Identifier used by the UI: `id`, falling back to `codigo`.
    pub fn key(&self) -> Option<&str> {
        self.id.as_deref().or(self.codigo.as_deref())
    }

    /// Monetary value with currency symbols and separators stripped; 0 when unparseable.
    pub fn numeric_value(&self) -> f64 {
        self.valor.as_deref().map(parse_amount).unwrap_or(0.0)
    }

    pub fn is_retired(&self) -> bool {
        self.estado
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case("baja"))
            .unwrap_or(false)
    }

    /// JSON object keyed by canonical names, as sent on writes.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Object(Map::new()))
    }
}

pub fn parse_amount(text: &str) -> f64 {
    static NON_NUMERIC: OnceLock<Regex> = OnceLock::new();
    let re = NON_NUMERIC.get_or_init(|| Regex::new(r"[^0-9.\-]+").expect("static regex"));
    re.replace_all(text, "").parse().unwrap_or(0.0)
}

/// A row of the users sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub role: Option<String>,
    pub departamento: Option<String>,
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl UserRecord {
    pub fn from_record(mut record: Record) -> Self {
        // compared verbatim at login, so no trimming
        let password = record.remove("password").as_ref().and_then(cell_raw);
        let mut take = |key: &str| record.remove(key).as_ref().and_then(cell_text);
        let user = UserRecord {
            username: take("username"),
            password,
            role: take("role"),
            departamento: take("departamento"),
            email: take("email"),
            extra: BTreeMap::new(),
        };
        UserRecord {
            extra: record.into_iter().collect(),
            ..user
        }
    }

    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        Self::from_record(USER_SCHEMA.normalize_record(raw))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: Option<String>,
    pub nombre: String,
    pub encargado: Option<String>,
    pub descripcion: Option<String>,
    pub articulos_asignados: Option<u64>,
    pub fecha_creacion: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Department {
    pub fn from_record(mut record: Record) -> Self {
        let mut take = |key: &str| record.remove(key).as_ref().and_then(cell_text);
        let department = Department {
            id: take("id"),
            nombre: take("nombre").unwrap_or_default(),
            encargado: take("encargado"),
            descripcion: take("descripcion"),
            articulos_asignados: take("articulos_asignados").and_then(|s| s.parse().ok()),
            fecha_creacion: take("fecha_creacion"),
            extra: BTreeMap::new(),
        };
        Department {
            extra: record.into_iter().collect(),
            ..department
        }
    }

    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        Self::from_record(DEPARTMENT_SCHEMA.normalize_record(raw))
    }
}

/// Identity persisted under `sibim_user` while a session is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub username: String,
    pub role: String,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// One row of the settings sheet, keyed by its `clave` in
/// [`crate::api::SibimApi::get_system_config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
}

impl ConfigEntry {
    /// Split a normalized settings row into its key and entry. Rows without a key are skipped.
    pub fn from_record(mut record: Record) -> Option<(String, Self)> {
        let mut take = |key: &str| record.remove(key).as_ref().and_then(cell_text);
        let key = take("clave")?;
        let entry = ConfigEntry {
            value: take("valor").unwrap_or_default(),
            description: take("descripcion"),
            kind: take("tipo"),
            module: take("modulo"),
            last_modified: take("ultima_modificacion"),
            modified_by: take("modificado_por"),
        };
        Some((key, entry))
    }
}

/// What the transport observed for a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub action: String,
    pub status: u16,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryStats {
    pub total: usize,
    pub departamentos: usize,
    pub bajas: usize,
    pub movimientos: usize,
    pub valor_total: f64,
    pub by_category: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub by_department: BTreeMap<String, usize>,
}

impl InventoryStats {
    pub fn compute(items: &[InventoryItem], movements: usize) -> Self {
        let mut stats = InventoryStats {
            total: items.len(),
            movimientos: movements,
            ..Default::default()
        };

        for item in items {
            let label = |v: &Option<String>| v.clone().unwrap_or_else(|| "Sin Asignar".to_string());
            *stats.by_category.entry(label(&item.categoria)).or_default() += 1;
            *stats.by_status.entry(label(&item.estado)).or_default() += 1;
            *stats.by_department.entry(label(&item.departamento)).or_default() += 1;
            if item.is_retired() {
                stats.bajas += 1;
            }
            stats.valor_total += item.numeric_value();
        }
        stats.departamentos = items
            .iter()
            .filter_map(|i| i.departamento.as_deref())
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        stats
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dashboard {
    pub items: Vec<InventoryItem>,
    pub stats: InventoryStats,
}
