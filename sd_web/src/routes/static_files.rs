//! ABOUTME: Dashboard asset serving with SPA fallback and security headers
//! ABOUTME: Unknown non-API paths resolve to index.html so client-side routes load

use actix_files::NamedFile;
use actix_web::{
    http::header::{HeaderValue, CACHE_CONTROL},
    middleware::DefaultHeaders,
    web, HttpRequest, HttpResponse, Result as ActixResult,
};
use std::path::{Component, Path, PathBuf};

use crate::error::ApiError;

/// Configuration for static file serving
#[derive(Debug, Clone)]
pub struct StaticConfig {
    pub static_dir: PathBuf,
    /// Cache lifetime for hashed assets, in seconds
    pub max_age: u32,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("./static"),
            max_age: 86400,
        }
    }
}

impl StaticConfig {
    pub fn new(static_dir: impl Into<PathBuf>) -> Self {
        Self {
            static_dir: static_dir.into(),
            ..Self::default()
        }
    }

    /// Map a request path onto a file under `static_dir`, refusing traversal
    fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = Path::new(request_path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }

        let candidate = self.static_dir.join(relative);
        candidate.is_file().then_some(candidate)
    }
}

/// Fallback service: real asset, else `index.html`, else 404.
/// Paths under `/api` never fall back to the dashboard.
pub async fn spa_fallback(
    req: HttpRequest,
    config: web::Data<StaticConfig>,
) -> ActixResult<HttpResponse> {
    let path = req.path();
    if path == "/api" || path.starts_with("/api/") {
        return Err(ApiError::not_found(format!("No route for {}", path)).into());
    }

    if let Some(file) = config.resolve(path) {
        let mut response = NamedFile::open_async(&file).await?.into_response(&req);
        let cache = HeaderValue::from_str(&format!("public, max-age={}", config.max_age))
            .map_err(|_| ApiError::internal_server_error("Invalid cache header"))?;
        response.headers_mut().insert(CACHE_CONTROL, cache);
        return Ok(response);
    }

    let index = config.static_dir.join("index.html");
    if index.is_file() {
        let mut response = NamedFile::open_async(&index).await?.into_response(&req);
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        return Ok(response);
    }

    Err(ApiError::not_found("Dashboard assets are not installed").into())
}

/// Middleware to add security headers
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Frame-Options", "DENY"))
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
        .add((
            "Content-Security-Policy",
            "default-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; frame-ancestors 'none';",
        ))
}
