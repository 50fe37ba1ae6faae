//! Built-in demo inventory, served only when `cache.use_sample_data` is on
//! and neither the remote sheet nor the cache has anything.

use crate::models::InventoryItem;
use serde_json::json;
use std::collections::BTreeMap;

pub fn inventory() -> Vec<InventoryItem> {
    let sample = |id: &str, codigo: &str, nombre: &str, marca: &str, modelo: &str, serie: &str| InventoryItem {
        id: Some(id.to_string()),
        codigo: Some(codigo.to_string()),
        nombre: Some(nombre.to_string()),
        marca: Some(marca.to_string()),
        modelo: Some(modelo.to_string()),
        serie: Some(serie.to_string()),
        extra: BTreeMap::from([("source".to_string(), json!("sample"))]),
        ..Default::default()
    };

    vec![
        InventoryItem {
            categoria: Some("Equipo de Cómputo".to_string()),
            grupo: Some("Tecnología".to_string()),
            departamento: Some("TI".to_string()),
            responsable: Some("Juan Pérez".to_string()),
            area: Some("Oficina 101".to_string()),
            valor: Some("$250.00".to_string()),
            estado: Some("En Uso".to_string()),
            fecha_adquisicion: Some("2024-01-15".to_string()),
            observaciones: Some("Monitor para desarrollo".to_string()),
            ..sample("INV-001", "MON-24-LCD", "Monitor LCD 24\"", "Dell", "P2419H", "SN123456789")
        },
        InventoryItem {
            categoria: Some("Mobiliario".to_string()),
            departamento: Some("Tesorería".to_string()),
            responsable: Some("Ana López".to_string()),
            valor: Some("$1,800.00".to_string()),
            estado: Some("Bueno".to_string()),
            ..sample("INV-002", "ESC-EJ-01", "Escritorio ejecutivo", "Offiho", "EJ-160", "S/N")
        },
    ]
}
