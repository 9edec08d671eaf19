use std::net::SocketAddr;

use jurisearch_core::{ExtractConfig, FetchConfig, MatchConfig};
use jurisearch_local::RelayConfig;
use jurisearch_server::config::ServerConfig;
use jurisearch_server::http::{build_router, AppState};

async fn spawn_service() -> SocketAddr {
    let cfg = ServerConfig {
        fetch: FetchConfig::default(),
        extract: ExtractConfig::default(),
        matching: MatchConfig::default(),
        relay: RelayConfig::default(),
    };
    let state = AppState::new(&cfg).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn health_reports_ok_and_version() {
    let addr = spawn_service().await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
}
