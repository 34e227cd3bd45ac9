// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use axum::http::{HeaderName, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Methods advertised to browsers
fn allowed_methods() -> Vec<Method> {
    vec![Method::GET, Method::POST, Method::OPTIONS]
}

/// Request headers browsers may send
fn allowed_headers() -> Vec<HeaderName> {
    vec![
        header::ACCEPT,
        header::CONTENT_TYPE,
        header::CONTENT_LENGTH,
        header::ACCEPT_ENCODING,
        HeaderName::from_static("x-csrf-token"),
        header::AUTHORIZATION,
    ]
}

/// CORS responder echoing the request origin
///
/// `OPTIONS` requests are answered here and never reach the routes.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(allowed_methods())
        .allow_headers(allowed_headers())
}
