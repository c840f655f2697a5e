//! Exercises the Manager's HTTP surface against a real bound listener:
//! seed inventory, authorize a server for its owning customer, issue a
//! server token, and confirm a non-owning customer is rejected.

use bmc_manager::inventory::{ServerInventory, ServerRecord};
use bmc_manager::state::ManagerState;
use bmc_proto::{BmcProtocol, ControlEndpoint, EndpointKind, TokenService};
use std::sync::Arc;
use std::time::Duration;

async fn spawn_manager() -> String {
    let inventory = ServerInventory::new();
    inventory.insert(ServerRecord {
        server_id: "srv-1".into(),
        customer_id: "cust-1".into(),
        datacenter_id: "dc1".into(),
        gateway_id: "gw-1".into(),
        control_endpoints: vec![ControlEndpoint {
            kind: EndpointKind::Redfish,
            uri: "https://bmc.local".into(),
            username: "admin".into(),
            password: "hunter2".into(),
            tls: None,
        }],
        sol_endpoint: None,
        vnc_endpoint: None,
        primary_protocol: BmcProtocol::Redfish,
        permissions: vec!["power".into()],
    });
    let tokens = Arc::new(TokenService::new("test-manager-secret").unwrap());
    let state = ManagerState { inventory, tokens };
    let app = bmc_manager::http::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    format!("http://{addr}")
}

#[tokio::test]
async fn authorize_then_issue_token_round_trip() {
    let base = spawn_manager().await;
    let http = reqwest::Client::new();

    let authz: serde_json::Value = http
        .post(format!("{base}/api/authorize"))
        .json(&serde_json::json!({ "customer_id": "cust-1", "server_id": "srv-1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(authz["datacenter_id"], "dc1");

    let token_resp = http
        .post(format!("{base}/api/servers/srv-1/token"))
        .json(&serde_json::json!({ "customer_id": "cust-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(token_resp.status(), 200);
    let token_json: serde_json::Value = token_resp.json().await.unwrap();
    assert!(token_json["token"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn authorize_rejects_a_non_owning_customer_over_http() {
    let base = spawn_manager().await;
    let http = reqwest::Client::new();
    let resp = http
        .post(format!("{base}/api/authorize"))
        .json(&serde_json::json!({ "customer_id": "cust-evil", "server_id": "srv-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn register_server_over_http_infers_endpoint_kind_from_scheme() {
    let base = spawn_manager().await;
    let http = reqwest::Client::new();
    let tokens = TokenService::new("test-manager-secret").unwrap();
    let admin_jwt = tokens.generate_customer_token(&bmc_proto::CustomerInfo { customer_id: "root".into(), email: "root@co".into(), is_admin: true }).unwrap();

    let resp = http
        .post(format!("{base}/api/servers"))
        .bearer_auth(admin_jwt)
        .json(&serde_json::json!({
            "server_id": "srv-2",
            "customer_id": "cust-1",
            "datacenter_id": "dc1",
            "gateway_id": "gw-1",
            "control_endpoints": [{ "uri": "https://bmc2.local/redfish/v1" }],
            "vnc_endpoint": { "uri": "ws://bmc2.local/vnc" },
            "primary_protocol": "Redfish",
            "permissions": []
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let created: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(created["control_endpoints"][0]["kind"], "Redfish");
    assert_eq!(created["vnc_endpoint"]["kind"], "VncWebSocket");

    let fetched: serde_json::Value = http.get(format!("{base}/api/servers/srv-2")).send().await.unwrap().json().await.unwrap();
    assert_eq!(fetched["server_id"], "srv-2");
}

#[tokio::test]
async fn unknown_server_is_not_found() {
    let base = spawn_manager().await;
    let http = reqwest::Client::new();
    let resp = http
        .post(format!("{base}/api/authorize"))
        .json(&serde_json::json!({ "customer_id": "cust-1", "server_id": "ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
