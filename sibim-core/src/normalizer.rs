//! Header normalization for human-edited spreadsheet columns.
//!
//! Every sheet gets a declared [`Schema`]: canonical keys plus the header
//! spellings seen in the wild. Lookup happens on a folded form of the header
//! (lowercase, accents stripped, punctuation collapsed to single spaces), so
//! `"Número de Serie"`, `"numero_de_serie"` and `"NO. SERIE"` all land on the
//! same entry. Unknown headers fall through as their own slug.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A normalized row: canonical key to cell value, in key order.
pub type Record = BTreeMap<String, Value>;

pub struct Schema {
    pub name: &'static str,
    fields: &'static [(&'static str, &'static [&'static str])],
}

pub const INVENTORY_SCHEMA: Schema = Schema {
    name: "inventory",
    fields: &[
        ("id", &["id", "no", "num", "numero", "no inventario", "numero de inventario", "folio"]),
        ("codigo", &["codigo", "clave", "code", "codigo inventario", "codigo de inventario"]),
        ("nombre", &["nombre", "articulo", "bien", "name", "nombre del bien"]),
        ("descripcion", &["descripcion", "description", "detalle"]),
        ("marca", &["marca", "brand"]),
        ("modelo", &["modelo", "model"]),
        ("serie", &["serie", "numero de serie", "no serie", "num serie", "numero serie", "serial", "n s"]),
        ("categoria", &["categoria", "category", "tipo"]),
        ("grupo", &["grupo", "group"]),
        ("departamento", &["departamento", "depto", "department", "dependencia"]),
        ("responsable", &["responsable", "resguardante", "responsible", "encargado"]),
        ("area", &["area", "area asignada", "ubicacion"]),
        ("valor", &["valor", "costo", "precio", "value", "valor de adquisicion", "importe"]),
        ("estado", &["estado", "estatus", "status", "condicion"]),
        (
            "fecha_adquisicion",
            &["fecha adquisicion", "fecha de adquisicion", "fecha compra", "fecha de compra"],
        ),
        ("observaciones", &["observaciones", "notas", "comentarios", "obs"]),
    ],
};

pub const USER_SCHEMA: Schema = Schema {
    name: "users",
    fields: &[
        ("username", &["username", "usuario", "user", "nombre de usuario", "nombre"]),
        ("password", &["password", "contrasena", "clave", "pass"]),
        ("role", &["role", "rol", "perfil"]),
        ("departamento", &["departamento", "depto", "department"]),
        ("email", &["email", "correo", "correo electronico", "e mail"]),
        ("permisos", &["permisos", "permissions"]),
    ],
};

pub const DEPARTMENT_SCHEMA: Schema = Schema {
    name: "departments",
    fields: &[
        ("id", &["id", "no", "clave"]),
        ("nombre", &["nombre", "nombre departamento", "departamento", "name"]),
        ("encargado", &["encargado", "responsable", "titular"]),
        ("email_encargado", &["email encargado", "correo encargado"]),
        ("telefono_encargado", &["telefono encargado", "telefono"]),
        ("descripcion", &["descripcion", "description"]),
        ("articulos_asignados", &["articulos asignados", "articulos", "total articulos"]),
        ("fecha_creacion", &["fecha de creacion", "fecha creacion"]),
        ("presupuesto_anual", &["presupuesto anual", "presupuesto"]),
    ],
};

pub const MOVEMENT_SCHEMA: Schema = Schema {
    name: "movements",
    fields: &[
        ("id", &["id", "folio"]),
        ("fecha", &["fecha", "date"]),
        ("hora", &["hora", "time"]),
        ("item_id", &["id articulo", "item id", "codigo", "articulo"]),
        ("departamento_origen", &["departamento origen", "origen"]),
        ("departamento_destino", &["departamento destino", "destino"]),
        ("estado_anterior", &["estado anterior"]),
        ("estado_nuevo", &["estado nuevo"]),
        ("usuario", &["usuario", "user", "realizado por"]),
        ("autorizado_por", &["autorizado por"]),
        ("observaciones", &["observaciones", "notas", "motivo"]),
    ],
};

pub const UPDATE_SCHEMA: Schema = Schema {
    name: "updates",
    fields: &[
        ("id", &["id", "folio"]),
        ("fecha", &["fecha", "date"]),
        ("hora", &["hora", "time"]),
        ("tipo_actualizacion", &["tipo actualizacion", "tipo de actualizacion", "tipo"]),
        ("tabla_afectada", &["tabla afectada", "tabla", "hoja"]),
        ("id_registro", &["id registro", "registro", "record id"]),
        ("campo_modificado", &["campo modificado", "campo"]),
        ("valor_anterior", &["valor anterior", "old value"]),
        ("valor_nuevo", &["valor nuevo", "new value"]),
        ("usuario", &["usuario", "user"]),
        ("sistema", &["sistema", "system"]),
        ("version", &["version"]),
        ("ip", &["ip", "direccion ip"]),
        ("observaciones", &["observaciones", "notas", "descripcion"]),
    ],
};

/// Key/value settings sheet.
pub const CONFIG_SCHEMA: Schema = Schema {
    name: "config",
    fields: &[
        ("clave", &["clave", "key", "parametro", "configuracion"]),
        ("valor", &["valor", "value"]),
        ("descripcion", &["descripcion", "description"]),
        ("tipo", &["tipo", "type"]),
        ("modulo", &["modulo", "module"]),
        ("ultima_modificacion", &["ultima modificacion", "fecha modificacion", "last modified"]),
        ("modificado_por", &["modificado por", "modified by"]),
    ],
};

impl Schema {
    /// Canonical key for `header`: the declared key when a variant matches,
    /// otherwise the header's slug.
    pub fn normalize(&self, header: &str) -> String {
        self.resolve(header).0
    }

    /// Canonical key plus its rank: 0 for the canonical spelling or an
    /// undeclared slug, then the variant's position in the declared list.
    fn resolve(&self, header: &str) -> (String, usize) {
        let folded = fold(header);
        for (canonical, variants) in self.fields {
            if fold(canonical) == folded {
                return ((*canonical).to_string(), 0);
            }
            if let Some(index) = variants.iter().position(|v| *v == folded) {
                return ((*canonical).to_string(), index + 1);
            }
        }
        (slug(&folded), 0)
    }

    pub fn canonical_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(k, _)| *k)
    }

    /// Single normalization pass over one raw row.
    ///
    /// When several headers land on the same key, the non-empty value from
    /// the best-ranked variant wins regardless of column order. Values that
    /// lose are kept under their own slug instead of being dropped.
    pub fn normalize_record(&self, raw: &Map<String, Value>) -> Record {
        let mut candidates: BTreeMap<String, Vec<(usize, &str, &Value)>> = BTreeMap::new();
        for (header, value) in raw {
            let (key, rank) = self.resolve(header);
            if key.is_empty() {
                continue;
            }
            candidates.entry(key).or_default().push((rank, header.as_str(), value));
        }

        let mut record = Record::new();
        let mut displaced = Vec::new();
        for (key, mut entries) in candidates {
            // stable: equal ranks keep column order
            entries.sort_by_key(|(rank, _, value)| (is_blank(value), *rank));
            let mut entries = entries.into_iter();
            if let Some((_, _, winner)) = entries.next() {
                record.insert(key.clone(), winner.clone());
            }
            for (_, header, value) in entries.filter(|(_, _, v)| !is_blank(v)) {
                displaced.push((key.clone(), header, value));
            }
        }

        for (key, header, value) in displaced {
            let own = slug(&fold(header));
            if own != key && !record.contains_key(&own) {
                record.insert(own, value.clone());
            } else if record.get(&key) != Some(value) {
                tracing::debug!(
                    "Header {:?} collapsed onto {} in {}; value dropped",
                    header,
                    key,
                    self.name
                );
            }
        }
        record
    }

    /// Normalize every object in `rows`; non-object entries are dropped.
    pub fn normalize_rows(&self, rows: &[Value]) -> Vec<Record> {
        rows.iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(self.normalize_record(map)),
                other => {
                    tracing::warn!("Skipping non-object row in {}: {}", self.name, other);
                    None
                }
            })
            .collect()
    }

    /// Build row values in `headers` order from a record keyed by canonical
    /// (or raw) names. Missing fields become empty strings.
    pub fn row_for_headers(&self, headers: &[String], record: &Map<String, Value>) -> Vec<Value> {
        let normalized = self.normalize_record(record);
        headers
            .iter()
            .map(|header| {
                normalized
                    .get(&self.normalize(header))
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new()))
            })
            .collect()
    }
}

fn slug(folded: &str) -> String {
    folded.replace(' ', "_")
}

/// Lowercase, strip Spanish diacritics, collapse everything that is not a
/// letter or digit into single spaces.
pub fn fold(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut pending_space = false;
    for ch in header.chars().flat_map(char::to_lowercase) {
        let ch = match ch {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        };
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Cell value as trimmed text; `None` for null and blank cells.
pub fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Cell value exactly as typed, for fields where whitespace is significant.
pub fn cell_raw(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn is_blank(value: &Value) -> bool {
    cell_text(value).is_none()
}
