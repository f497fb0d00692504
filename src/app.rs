//! Default application handler: static files from the configured root.

use axum::Router;
use tower_http::services::ServeDir;

use crate::config::ServerConfig;

/// Router serving `config.root`. Unknown paths answer 404.
pub fn build_handler(config: &ServerConfig) -> Router {
    Router::new().fallback_service(ServeDir::new(&config.root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn serves_files_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>up</h1>").unwrap();
        let config = ServerConfig {
            root: dir.path().display().to_string(),
            ..ServerConfig::default()
        };

        let response = build_handler(&config)
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<h1>up</h1>");

        let response = build_handler(&config)
            .oneshot(Request::get("/missing.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
