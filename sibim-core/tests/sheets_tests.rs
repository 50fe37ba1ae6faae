use serde_json::json;
use sibim_core::api::{ApiSettings, SibimApi};
use sibim_core::cache::ResponseCache;
use sibim_core::gateway::{Action, SheetGateway};
use sibim_core::{ManualClock, MemoryStore, SheetsValuesGateway, SibimError};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHEET_ID: &str = "sheet-123";

fn gateway(server: &MockServer) -> SheetsValuesGateway {
    SheetsValuesGateway::new(&server.uri(), SHEET_ID, Some("test-key".to_string()), None, None).unwrap()
}

fn values_path(range: &str) -> String {
    format!("/v4/spreadsheets/{}/values/{}", SHEET_ID, range)
}

async fn mount_inventory(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(values_path("Inventario!A:Z")))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Inventario!A1:Z3",
            "majorDimension": "ROWS",
            "values": [
                ["ID", "Nombre", "Descripción", "Departamento", "Valor"],
                ["1", "Archivero", "Archivero metálico de 4 gavetas", "Registro Civil", "$3,500.00"],
                ["2", "Impresora", "", "Registro Civil"]
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_read_inventory_through_values_api() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;

    let clock = Arc::new(ManualClock::at_millis(0));
    let cache = ResponseCache::new(Arc::new(MemoryStore::new()), clock, Duration::from_secs(300));
    let api = SibimApi::new(Arc::new(gateway(&server)), cache, ApiSettings::default());

    let items = api.fetch_items().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id.as_deref(), Some("1"));
    assert_eq!(items[0].nombre.as_deref(), Some("Archivero"));
    assert_eq!(items[0].descripcion.as_deref(), Some("Archivero metálico de 4 gavetas"));
    assert_eq!(items[0].numeric_value(), 3500.0);
    assert_eq!(items[1].descripcion, None);
    assert_eq!(items[1].valor, None);
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(values_path("Usuarios!A:Z")))
        .and(header("authorization", "Bearer oauth-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["Usuario", "Rol"], ["ana", "Auditor"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway =
        SheetsValuesGateway::new(&server.uri(), SHEET_ID, None, Some("oauth-token".to_string()), None).unwrap();
    let rows = gateway.fetch_collection(Action::GetUsers, &[]).await;

    assert_eq!(rows, vec![json!({"Usuario": "ana", "Rol": "Auditor"})]);
}

#[tokio::test]
async fn test_append_item_follows_sheet_header_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(values_path("Inventario!1:1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["Código", "Nombre", "Marca", "Notas internas"]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(values_path("Inventario!A:Z:append")))
        .and(query_param("valueInputOption", "USER_ENTERED"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(body_partial_json(json!({"values": [["TZ-010", "Anaquel", "", ""]]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updates": {"updatedRange": "Inventario!A12:D12", "updatedRows": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = gateway(&server)
        .write(Action::AddItem, json!({"codigo": "TZ-010", "nombre": "Anaquel"}))
        .await
        .unwrap();

    assert_eq!(receipt.action, "addItem");
    assert_eq!(receipt.message.as_deref(), Some("appended Inventario!A12:D12"));
}

#[tokio::test]
async fn test_append_update_log_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(values_path("Actualizaciones!1:1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["Fecha", "Tipo", "Tabla", "ID Registro", "Usuario"]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(values_path("Actualizaciones!A:Z:append")))
        .and(body_partial_json(json!({
            "values": [["01/02/2024", "UPDATE", "Inventario", "TZ-001", "ana"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updates": {"updatedRange": "Actualizaciones!A5:E5", "updatedRows": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = gateway(&server)
        .write(
            Action::AddUpdate,
            json!({
                "fecha": "01/02/2024",
                "tipo_actualizacion": "UPDATE",
                "tabla_afectada": "Inventario",
                "id_registro": "TZ-001",
                "usuario": "ana"
            }),
        )
        .await
        .unwrap();

    assert_eq!(receipt.action, "addUpdate");
}

#[tokio::test]
async fn test_config_sheet_reads_as_key_value_map() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(values_path("Configuracion!A:Z")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["Clave", "Valor", "Descripción"],
                ["nombre_sistema", "SIBIM", "Nombre mostrado"],
                ["dias_respaldo", "7"]
            ]
        })))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::at_millis(0));
    let cache = ResponseCache::new(Arc::new(MemoryStore::new()), clock, Duration::from_secs(300));
    let api = SibimApi::new(Arc::new(gateway(&server)), cache, ApiSettings::default());

    let config = api.get_system_config().await;

    assert_eq!(config.len(), 2);
    assert_eq!(config["nombre_sistema"].value, "SIBIM");
    assert_eq!(config["nombre_sistema"].description.as_deref(), Some("Nombre mostrado"));
    assert_eq!(config["dias_respaldo"].value, "7");
}

#[tokio::test]
async fn test_connection_check_reports_each_sheet() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(values_path("Movimientos!A:Z")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(values_path("Inventario!A:Z")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["ID", "Nombre"], ["1", "Silla"], ["2", "Mesa"]]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [["ID"]]})))
        .mount(&server)
        .await;

    let report = gateway(&server).check_connection().await;

    assert_eq!(report.transport, "sheets_api");
    assert_eq!(report.sheets.len(), 6);
    assert!(!report.all_accessible());
    assert_eq!(report.accessible_count(), 5);

    let inventory = report.sheets.iter().find(|s| s.sheet == "Inventario").unwrap();
    assert_eq!(inventory.rows, Some(2));
    let movements = report.sheets.iter().find(|s| s.sheet == "Movimientos").unwrap();
    assert!(!movements.accessible);
    assert!(movements.error.is_some());
}

#[tokio::test]
async fn test_updates_are_not_available_over_values_api() {
    let server = MockServer::start().await;
    let gateway = gateway(&server);

    let result = gateway.write(Action::UpdateItem, json!({"id": "1"})).await;
    assert!(matches!(result, Err(SibimError::Unsupported { .. })));

    let result = gateway.write(Action::AddItem, json!(["not", "an", "object"])).await;
    assert!(matches!(result, Err(SibimError::InvalidPayload(_))));

    let result = gateway.fetch(Action::GetItemById, &[("id", "1")]).await;
    assert!(matches!(result, Err(SibimError::Unsupported { .. })));
}

#[tokio::test]
async fn test_permission_denied_is_a_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = gateway(&server).fetch(Action::GetMovements, &[]).await;
    assert!(matches!(result, Err(SibimError::ServerError { status: 403 })));
}
