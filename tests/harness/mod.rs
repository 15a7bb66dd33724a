//! Shared helpers for the integration tests.
#![allow(dead_code)]

mod raw;

use std::net::SocketAddr;
use std::path::PathBuf;

use rsio::{RunReport, Runner, Scenario};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub use raw::RawSocket;

/// Run `scenario` and assert every launched scenario completed cleanly.
pub async fn run_generic_runner_test(scenario: &Scenario) -> RunReport {
    let report = Runner::new().run(scenario).await;
    assert_eq!(
        report.scenarios_launched,
        scenario.scenarios.len() as u64,
        "report: {report:?}"
    );
    assert_eq!(
        report.scenarios_completed, report.scenarios_launched,
        "report: {report:?}"
    );
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    report
}

/// Path of a checked-in script under `tests/scripts/`.
pub fn script(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("scripts")
        .join(name)
}

/// Send a bare HTTP/1.1 request and return status and body.
pub async fn http_request(addr: SocketAddr, method: &str, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request =
        format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();

    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    (status, body.to_string())
}
