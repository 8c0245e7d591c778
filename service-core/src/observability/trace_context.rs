//! W3C Trace Context propagation for outbound calls to hosted backends.
//!
//! See: https://www.w3.org/TR/trace-context/

use opentelemetry::trace::TraceContextExt;
use reqwest::header::HeaderMap;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Header name for W3C traceparent
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Header name for W3C tracestate
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Header name for request correlation ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inject the current span's trace context as traceparent/tracestate headers.
///
/// Does nothing when the current span carries no valid OpenTelemetry context,
/// e.g. when OTLP export is disabled.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    let span = Span::current();
    let context = span.context();
    let otel_span = context.span();
    let span_context = otel_span.span_context();

    if !span_context.is_valid() {
        return;
    }

    // version-trace_id-span_id-trace_flags
    let traceparent = format!(
        "00-{}-{}-{:02x}",
        span_context.trace_id(),
        span_context.span_id(),
        span_context.trace_flags().to_u8()
    );

    if let Ok(value) = traceparent.parse() {
        headers.insert(TRACEPARENT_HEADER, value);
    }

    let tracestate = span_context.trace_state().header();
    if !tracestate.is_empty() {
        if let Ok(value) = tracestate.parse() {
            headers.insert(TRACESTATE_HEADER, value);
        }
    }
}

/// Extension trait for reqwest::Client that starts requests with the trace
/// headers of the calling span already attached.
pub trait TracedClientExt {
    fn traced_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder;

    fn traced_get(&self, url: &str) -> reqwest::RequestBuilder {
        self.traced_request(reqwest::Method::GET, url)
    }

    fn traced_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.traced_request(reqwest::Method::POST, url)
    }

    fn traced_patch(&self, url: &str) -> reqwest::RequestBuilder {
        self.traced_request(reqwest::Method::PATCH, url)
    }

    fn traced_delete(&self, url: &str) -> reqwest::RequestBuilder {
        self.traced_request(reqwest::Method::DELETE, url)
    }
}

impl TracedClientExt for reqwest::Client {
    fn traced_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);
        self.request(method, url).headers(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_headers_without_active_otel_span() {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);
        assert!(headers.get(TRACEPARENT_HEADER).is_none());
        assert!(headers.get(TRACESTATE_HEADER).is_none());
    }

    #[test]
    fn traced_request_keeps_method_and_url() {
        let client = reqwest::Client::new();
        let request = client
            .traced_patch("http://localhost:9/v1/databases")
            .build()
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::PATCH);
        assert_eq!(request.url().path(), "/v1/databases");
    }
}
