use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use event_bus::MessageContext;

pub const CORRELATION_ID_HEADER: &str = "Correlation-ID";

/// Read `Correlation-ID` or generate one, expose it to handlers as a
/// [`MessageContext`] extension and echo it on the response
pub async fn propagate_correlation_id(mut request: Request, next: Next) -> Response {
    let ctx = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(MessageContext::new)
        .unwrap_or_else(MessageContext::generated);

    let header_value = HeaderValue::from_str(&ctx.correlation_id).ok();
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    if let Some(value) = header_value {
        response
            .headers_mut()
            .insert(HeaderName::from_static("correlation-id"), value);
    }
    response
}
