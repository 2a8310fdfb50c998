//! Fixtures shared by the unit tests: SQLite files and a one-shot HTTP responder.

use reqwest::blocking::Client;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

/// Creates `survey.db` inside `dir`, runs `statements` against it, and returns a
/// locator for it.
pub(crate) fn seed_sqlite(dir: &Path, statements: &[&str]) -> String {
    let path = dir.join("survey.db");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime");

    runtime.block_on(async {
        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await
            .expect("create sqlite fixture");
        for statement in statements {
            sqlx::query(statement)
                .execute(&mut conn)
                .await
                .expect("seed statement");
        }
        conn.close().await.expect("close fixture connection");
    });

    format!("sqlite://{}", path.display())
}

/// A client that never routes loopback traffic through a proxy.
pub(crate) fn local_client() -> Client {
    Client::builder()
        .no_proxy()
        .build()
        .expect("build test client")
}

/// Serves a single HTTP response on a loopback port and returns the URL to fetch.
pub(crate) fn serve_once(status: &str, body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        // Drain the request head so closing the socket does not reset it.
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
    });

    format!("http://{addr}/Weather_data_field_mapping.csv")
}

/// A loopback URL with nothing listening behind it.
pub(crate) fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);
    format!("http://{addr}/missing.csv")
}
