// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming HTTP proxy.
//!
//! Two operations, both taking a single `uri` query parameter:
//!
//! - `GET /get` streams the upstream body back unchanged
//! - `GET /convert` streams the upstream body through the encoder
//!
//! Each request runs `validate method -> parse uri -> fetch upstream ->
//! [transcode] -> stream`. Failures map to 400 (bad `uri`), 405 (not GET),
//! 502 (upstream), 504 (upstream too slow) and 500 (encoder).

mod body;
mod cache;
mod cors;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::Config;
use crate::error::ProxyError;
use crate::http::{HttpClient, HttpResponse, ReqwestClient};
use crate::transcode::{OUTPUT_CONTENT_TYPE, Transcoder};

use body::TimedBody;

pub use cache::{CachedResponse, ResponseCache};
pub use cors::cors_layer;

/// Timeouts applied to every proxied response
#[derive(Debug, Clone, Copy)]
pub struct StreamTimeouts {
    /// Time allowed to obtain response headers
    pub read: Duration,
    /// Longest stall between two body chunks
    pub idle: Duration,
    /// Time allowed to stream the whole body
    pub write: Duration,
}

impl Default for StreamTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(30),
            idle: Duration::from_secs(60),
            write: Duration::from_secs(10 * 60),
        }
    }
}

/// Shared state behind the proxy routes
#[derive(Clone)]
pub struct ProxyService {
    client: Arc<dyn HttpClient>,
    transcoder: Transcoder,
    cache: Option<ResponseCache>,
    timeouts: StreamTimeouts,
}

impl ProxyService {
    pub fn new(client: Arc<dyn HttpClient>, transcoder: Transcoder, timeouts: StreamTimeouts) -> Self {
        Self {
            client,
            transcoder,
            cache: None,
            timeouts,
        }
    }

    /// Reuse complete responses of the plain fetch operation
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Wire the service from process configuration
    pub fn from_config(config: &Config) -> Self {
        let service = Self::new(
            Arc::new(ReqwestClient::new()),
            Transcoder::new(config.ffmpeg_path.clone()),
            StreamTimeouts {
                read: config.read_timeout,
                idle: config.idle_timeout,
                write: config.write_timeout,
            },
        );

        if config.cache_ttl.is_zero() {
            service
        } else {
            service.with_cache(ResponseCache::new(
                config.cache_ttl,
                config.cache_max_entry_bytes,
            ))
        }
    }

    /// Stream the upstream resource back unchanged
    pub async fn fetch(&self, uri: &Url) -> Result<Response, ProxyError> {
        let key = uri.as_str();

        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(key)) {
            tracing::info!(uri = %uri, status = hit.status, cached = true, "✓ fetch");
            return Ok(streaming_response(
                hit.status,
                hit.content_type.as_deref(),
                Some(hit.body.len() as u64),
                Body::from(hit.body),
            ));
        }

        let upstream = self.open_upstream(uri).await?;
        tracing::info!(uri = %uri, status = upstream.status, "✓ fetch");

        let status = upstream.status;
        let content_type = upstream.content_type.clone();
        let content_length = upstream.content_length;
        let stream = match &self.cache {
            Some(cache) if cache.accepts(content_length) => {
                cache.tee(key, status, content_type.clone(), upstream.body)
            }
            _ => upstream.body,
        };

        let body = TimedBody::new(stream, key, self.timeouts.idle, self.timeouts.write);
        Ok(streaming_response(
            status,
            content_type.as_deref(),
            content_length,
            Body::from_stream(body),
        ))
    }

    /// Stream the upstream resource through the encoder
    ///
    /// Always fetches live; encoder output is never cached.
    pub async fn fetch_and_transcode(&self, uri: &Url) -> Result<Response, ProxyError> {
        let upstream = self.open_upstream(uri).await?;
        let status = upstream.status;

        let output = tokio::time::timeout(
            self.timeouts.read,
            self.transcoder.transcode(upstream.body),
        )
        .await
        .map_err(|_| ProxyError::Timeout(self.timeouts.read))??;
        tracing::info!(uri = %uri, status, "✓ convert");

        let body = TimedBody::new(output, uri.as_str(), self.timeouts.idle, self.timeouts.write);
        Ok(streaming_response(
            200,
            Some(OUTPUT_CONTENT_TYPE),
            None,
            Body::from_stream(body),
        ))
    }

    /// Request the upstream resource, rejecting transport errors and non-2xx
    ///
    /// A rejected response's body is dropped, closing the connection.
    async fn open_upstream(&self, uri: &Url) -> Result<HttpResponse, ProxyError> {
        let upstream = tokio::time::timeout(self.timeouts.read, self.client.get_stream(uri.as_str()))
            .await
            .map_err(|_| ProxyError::Timeout(self.timeouts.read))?
            .map_err(ProxyError::Upstream)?;

        if !upstream.is_success() {
            return Err(ProxyError::UpstreamStatus(upstream.status));
        }
        Ok(upstream)
    }
}

fn streaming_response(
    status: u16,
    content_type: Option<&str>,
    content_length: Option<u64>,
    body: Body,
) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let headers = response.headers_mut();

    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(len) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    response
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Upstream(_) | Self::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Process(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Encoder details stay in the log.
            Self::Process(_) => "transcode failed".to_string(),
            other => other.to_string(),
        };
        (self.status_code(), message).into_response()
    }
}

/// Check the method and extract the `uri` parameter
fn validate_request(method: &Method, query: Option<&str>) -> Result<Url, ProxyError> {
    if *method != Method::GET {
        return Err(ProxyError::MethodNotAllowed);
    }

    let param = query
        .into_iter()
        .flat_map(|q| url::form_urlencoded::parse(q.as_bytes()))
        .find(|(key, _)| key == "uri")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ProxyError::InvalidRequest("missing uri parameter".to_string()))?;

    let uri = Url::parse(param.trim())
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid uri '{}': {}", param, e)))?;

    if !matches!(uri.scheme(), "http" | "https") {
        return Err(ProxyError::InvalidRequest(format!(
            "unsupported uri scheme '{}'",
            uri.scheme()
        )));
    }
    Ok(uri)
}

fn log_failure(operation: &str, uri: Option<&Url>, error: &ProxyError) {
    let uri = uri.map(Url::as_str).unwrap_or("-");
    match error {
        ProxyError::InvalidRequest(_) | ProxyError::MethodNotAllowed => {
            tracing::debug!(uri, error = %error, "✗ {} rejected", operation);
        }
        ProxyError::Process(_) => {
            tracing::error!(uri, error = %error, "✗ {}", operation);
        }
        _ => {
            tracing::warn!(uri, error = %error, "✗ {}", operation);
        }
    }
}

async fn fetch(
    State(proxy): State<ProxyService>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Result<Response, ProxyError> {
    let uri = validate_request(&method, query.as_deref())
        .inspect_err(|e| log_failure("fetch", None, e))?;

    proxy
        .fetch(&uri)
        .await
        .inspect_err(|e| log_failure("fetch", Some(&uri), e))
}

async fn convert(
    State(proxy): State<ProxyService>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Result<Response, ProxyError> {
    let uri = validate_request(&method, query.as_deref())
        .inspect_err(|e| log_failure("convert", None, e))?;

    proxy
        .fetch_and_transcode(&uri)
        .await
        .inspect_err(|e| log_failure("convert", Some(&uri), e))
}

fn routes(service: ProxyService) -> Router {
    Router::new()
        .route("/get", any(fetch))
        .route("/get/", any(fetch))
        .route("/convert", any(convert))
        .route("/convert/", any(convert))
        .with_state(service)
}

/// Build the proxy routes with CORS and request tracing
pub fn router(service: ProxyService) -> Router {
    routes(service)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Proxy routes plus static web app files from `app_dir` for every other path
pub fn router_with_app(service: ProxyService, app_dir: &Path) -> Router {
    routes(service)
        .fallback_service(ServeDir::new(app_dir))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeUpstream, wait_until};
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn service(upstream: Arc<FakeUpstream>, transcoder: Transcoder) -> ProxyService {
        ProxyService::new(upstream, transcoder, StreamTimeouts::default())
    }

    async fn send(app: Router, method: Method, uri: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn validate_request_rules() {
        let get = Method::GET;

        assert!(matches!(
            validate_request(&get, None),
            Err(ProxyError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_request(&get, Some("other=1")),
            Err(ProxyError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_request(&get, Some("uri=bad%20uri")),
            Err(ProxyError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_request(&get, Some("uri=ftp%3A%2F%2Fexample.com%2Fa")),
            Err(ProxyError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_request(&Method::POST, Some("uri=http%3A%2F%2Fx")),
            Err(ProxyError::MethodNotAllowed)
        ));

        let uri = validate_request(&get, Some("uri=https%3A%2F%2Fexample.com%2Fep.mp3%3Fa%3D1")).unwrap();
        assert_eq!(uri.as_str(), "https://example.com/ep.mp3?a=1");
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            ProxyError::InvalidRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ProxyError::UpstreamStatus(404).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::Timeout(Duration::from_secs(1)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[tokio::test]
    async fn get_without_uri_is_bad_request() {
        let upstream = Arc::new(FakeUpstream::ok("ok"));
        let app = router(service(upstream.clone(), Transcoder::new("ffmpeg")));

        let response = send(app, Method::GET, "/get").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream.request_count(), 0);
    }

    #[tokio::test]
    async fn non_get_is_method_not_allowed() {
        let upstream = Arc::new(FakeUpstream::ok("ok"));
        let app = router(service(upstream.clone(), Transcoder::new("ffmpeg")));

        let response = send(app, Method::DELETE, "/get?uri=http%3A%2F%2Fx").await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(upstream.request_count(), 0);
    }

    #[tokio::test]
    async fn get_streams_upstream_body() {
        let upstream = Arc::new(FakeUpstream::ok("ok"));
        let app = router(service(upstream.clone(), Transcoder::new("ffmpeg")));

        let response = send(app, Method::GET, "/get?uri=http%3A%2F%2Fupstream%2Fa").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_text(response).await, "ok");
        assert!(upstream.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn get_maps_upstream_error_status_to_bad_gateway() {
        let mut fake = FakeUpstream::ok("missing");
        fake.status = 404;
        let upstream = Arc::new(fake);
        let app = router(service(upstream.clone(), Transcoder::new("ffmpeg")));

        let response = send(app, Method::GET, "/get?uri=http%3A%2F%2Fupstream%2Fa").await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(upstream.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn options_with_only_origin_is_answered_without_fetching() {
        let upstream = Arc::new(FakeUpstream::ok("ok"));
        let app = router(service(upstream.clone(), Transcoder::new("ffmpeg")));

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/get")
            .header(header::ORIGIN, "http://x")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://x"
        );
        assert_eq!(upstream.request_count(), 0);
    }

    #[tokio::test]
    async fn options_is_answered_without_fetching() {
        let upstream = Arc::new(FakeUpstream::ok("ok"));
        let app = router(service(upstream.clone(), Transcoder::new("ffmpeg")));

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/get")
            .header(header::ORIGIN, "http://x")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://x"
        );
        let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .to_string();
        for method in ["GET", "POST", "OPTIONS"] {
            assert!(methods.contains(method), "missing {method} in {methods}");
        }
        assert!(
            response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS)
        );
        assert_eq!(upstream.request_count(), 0);
    }

    #[tokio::test]
    async fn fetch_serves_repeat_requests_from_cache() {
        let mut fake = FakeUpstream::ok("cached body");
        fake.status = 203;
        let upstream = Arc::new(fake);
        let proxy = service(upstream.clone(), Transcoder::new("ffmpeg"))
            .with_cache(ResponseCache::new(Duration::from_secs(60), 1024));
        let app = router(proxy);

        for _ in 0..2 {
            let response = send(app.clone(), Method::GET, "/get?uri=http%3A%2F%2Fupstream%2Fa").await;
            assert_eq!(response.status(), StatusCode::NON_AUTHORITATIVE_INFORMATION);
            assert_eq!(body_text(response).await, "cached body");
        }

        assert_eq!(upstream.request_count(), 1);
    }

    #[tokio::test]
    async fn convert_with_missing_encoder_fails_and_closes_upstream() {
        let upstream = Arc::new(FakeUpstream::ok("audio"));
        let app = router(service(
            upstream.clone(),
            Transcoder::new("/nonexistent/encoder-binary"),
        ));

        let response = send(app, Method::GET, "/convert?uri=http%3A%2F%2Fupstream%2Fa.mp3").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(upstream.request_count(), 1);
        assert!(upstream.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn convert_never_uses_cache() {
        let upstream = Arc::new(FakeUpstream::ok("audio"));
        let proxy = service(upstream.clone(), Transcoder::new("/nonexistent/encoder-binary"))
            .with_cache(ResponseCache::new(Duration::from_secs(60), 1024));
        let app = router(proxy);

        for _ in 0..2 {
            let response = send(app.clone(), Method::GET, "/convert?uri=http%3A%2F%2Fupstream%2Fa").await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }

        assert_eq!(upstream.request_count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn convert_streams_encoder_output() {
        let upstream = Arc::new(FakeUpstream::ok("raw audio"));
        let app = router(service(
            upstream.clone(),
            Transcoder::with_args("cat", Vec::<String>::new()),
        ));

        let response = send(app, Method::GET, "/convert/?uri=http%3A%2F%2Fupstream%2Fa").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], OUTPUT_CONTENT_TYPE);
        assert_eq!(body_text(response).await, "raw audio");
        assert!(wait_until(|| upstream.closed.load(Ordering::SeqCst)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn convert_failing_encoder_is_internal_error() {
        let upstream = Arc::new(FakeUpstream::ok("raw audio"));
        let app = router(service(
            upstream.clone(),
            Transcoder::with_args("sh", ["-c", "cat >/dev/null; exit 1"]),
        ));

        let response = send(app, Method::GET, "/convert?uri=http%3A%2F%2Fupstream%2Fa").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "transcode failed");
        assert!(wait_until(|| upstream.closed.load(Ordering::SeqCst)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_convert_response_releases_upstream() {
        let mut fake = FakeUpstream::ok("first chunk");
        fake.never_ends = true;
        let upstream = Arc::new(fake);
        let app = router(service(
            upstream.clone(),
            Transcoder::with_args("cat", Vec::<String>::new()),
        ));

        let response = send(app, Method::GET, "/convert?uri=http%3A%2F%2Fupstream%2Fa").await;
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);

        assert!(wait_until(|| upstream.closed.load(Ordering::SeqCst)).await);
    }

    #[tokio::test]
    async fn get_proxies_real_upstream() {
        use httpmock::MockServer;

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/episode.mp3");
                then.status(200)
                    .header("content-type", "audio/mpeg")
                    .body("ID3 audio");
            })
            .await;

        let proxy = ProxyService::new(
            Arc::new(ReqwestClient::new()),
            Transcoder::new("ffmpeg"),
            StreamTimeouts::default(),
        );
        let target: String =
            url::form_urlencoded::byte_serialize(server.url("/episode.mp3").as_bytes()).collect();

        let response = send(router(proxy), Method::GET, &format!("/get?uri={target}")).await;

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(body_text(response).await, "ID3 audio");
    }

    #[tokio::test]
    async fn app_directory_is_served_beside_proxy_routes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>poddle</h1>").unwrap();
        let upstream = Arc::new(FakeUpstream::ok("ok"));
        let app = router_with_app(service(upstream.clone(), Transcoder::new("ffmpeg")), dir.path());

        let index = send(app.clone(), Method::GET, "/").await;
        assert_eq!(index.status(), StatusCode::OK);
        assert_eq!(body_text(index).await, "<h1>poddle</h1>");

        let missing = send(app.clone(), Method::GET, "/nope.js").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let proxied = send(app, Method::GET, "/get?uri=http%3A%2F%2Fupstream%2Fa").await;
        assert_eq!(body_text(proxied).await, "ok");
    }
}
