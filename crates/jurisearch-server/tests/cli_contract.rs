use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn jurisearch_version_contract() {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_jurisearch"));
    cmd.arg("--version");
    // Disable `.env` autoload so this contract stays hermetic.
    cmd.env("JURISEARCH_DOTENV", "0");
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("jurisearch "))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn jurisearch_probe_contract_stubbed_localhost() {
    // Local stub server standing in for the compilation page.
    use axum::{response::Html, routing::get, Router};
    use std::net::SocketAddr;

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let addr: SocketAddr = rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/compilacion",
            get(|| async {
                Html(
                    r#"<table>
                      <tr><td>1</td><td>VIOLENCIA POLITICA DE GENERO. ELEMENTOS QUE LA ACTUALIZAN</td><td>21/2018</td><td>3 de agosto de 2018</td></tr>
                      <tr><td>2</td><td>DERECHO A SER VOTADO. ALCANCES FRENTE A REQUISITOS LEGALES</td><td>11/2021</td><td>14 de abril de 2021</td></tr>
                    </table>"#,
                )
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("axum serve");
        });
        addr
    });

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_jurisearch"));
    cmd.args([
        "probe",
        "--url",
        &format!("http://{addr}/compilacion"),
        "--query",
        "violencia política de género",
    ]);
    cmd.env("JURISEARCH_DOTENV", "0");
    // Keep the probe on the stub even if the machine exports real overrides.
    cmd.env_remove("JURISEARCH_SOURCE_URL");
    cmd.env_remove("JURISEARCH_RENDER");

    let out = cmd.output().expect("run jurisearch probe");
    assert!(out.status.success(), "probe failed: {out:?}");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse probe json");

    assert_eq!(v["blocks"].as_u64(), Some(2));
    assert_eq!(v["keys"][0], "21/2018");
    assert_eq!(v["keys"][1], "11/2021");
    let rendered = v["result"]["matches"][0].as_str().expect("one match");
    assert!(rendered.contains("Clave: 21/2018"), "got {rendered:?}");
}
