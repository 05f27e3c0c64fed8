//! HTTP server for the database backup endpoint.
//!
//! Runs on a separate tokio task and serves `GET /download`, which streams a
//! consistent snapshot of the primary store.

use crate::db::StorePair;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;

pub const BACKUP_FILENAME: &str = "eo-bot-backup.sqlite";

/// Build the router. Methods other than GET on `/download` get 405.
pub fn router(db: Arc<StorePair>) -> Router {
    Router::new()
        .route("/download", get(download_handler))
        .with_state(db)
}

/// Handler for GET /download - streams a snapshot of the primary store.
async fn download_handler(State(db): State<Arc<StorePair>>) -> Response {
    match snapshot_response(&db).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create backup");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create backup").into_response()
        }
    }
}

async fn snapshot_response(db: &StorePair) -> anyhow::Result<Response> {
    let snapshot = db.backup_snapshot().await?;
    let file = tokio::fs::File::open(&snapshot).await?;
    let len = file.metadata().await?.len();
    // The open handle keeps the data readable after the path is unlinked.
    drop(snapshot);

    tracing::info!(bytes = len, "Serving database backup");
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-sqlite3")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={BACKUP_FILENAME}"),
        )
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(ReaderStream::new(file)))?;
    Ok(response)
}

/// Serve the backup endpoint on an already-bound listener.
pub async fn serve(listener: TcpListener, db: Arc<StorePair>) -> std::io::Result<()> {
    axum::serve(listener, router(db)).await
}

/// Run the HTTP server for database backups.
///
/// This is a long-running task that should be spawned in the background.
pub async fn run_http_server(addr: SocketAddr, db: Arc<StorePair>) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind HTTP server");
            return;
        }
    };
    tracing::info!(%addr, "Backup HTTP server listening");

    if let Err(e) = serve(listener, db).await {
        tracing::error!(error = %e, "HTTP server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MessageStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn request(addr: SocketAddr, method: &str) -> Vec<u8> {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let req = format!(
            "{method} /download HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        );
        stream.write_all(req.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        buf
    }

    async fn spawn_server(db: Arc<StorePair>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, db));
        addr
    }

    fn split_response(raw: &[u8]) -> (String, &[u8]) {
        let pos = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8_lossy(&raw[..pos]).to_ascii_lowercase();
        (head, &raw[pos + 4..])
    }

    #[tokio::test]
    async fn test_download_streams_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.sqlite");
        let db = StorePair::open(path.to_str().unwrap(), None).await.unwrap();
        db.messages().create_message("backed up").await.unwrap();
        let addr = spawn_server(Arc::new(db)).await;

        let raw = request(addr, "GET").await;
        let (head, body) = split_response(&raw);
        assert!(head.starts_with("http/1.1 200"));
        assert!(head.contains("content-type: application/x-sqlite3"));
        assert!(head.contains("filename=eo-bot-backup.sqlite"));
        assert!(head.contains(&format!("content-length: {}", body.len())));
        assert!(body.starts_with(b"SQLite format 3\0"));

        let copy = dir.path().join("copy.sqlite");
        std::fs::write(&copy, body).unwrap();
        let restored = crate::db::SqliteStore::open(copy.to_str().unwrap()).await.unwrap();
        assert_eq!(restored.count_messages().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_other_methods_are_rejected() {
        let db = StorePair::open(":memory:", None).await.unwrap();
        let addr = spawn_server(Arc::new(db)).await;

        let raw = request(addr, "POST").await;
        let (head, _) = split_response(&raw);
        assert!(head.starts_with("http/1.1 405"));
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_500() {
        let db = StorePair::open(":memory:", None).await.unwrap();
        db.primary().pool().close().await;
        let addr = spawn_server(Arc::new(db)).await;

        let raw = request(addr, "GET").await;
        let (head, body) = split_response(&raw);
        assert!(head.starts_with("http/1.1 500"));
        assert_eq!(body, b"Failed to create backup");
    }
}
