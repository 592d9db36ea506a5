use async_trait::async_trait;
use dav_api::{ApiError, ApiRequest, ApiResponse, Method, RequestBody, Transport};
use dav_sync::DavConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tracing::debug;

/// `Transport` over reqwest
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &DavConfig) -> Result<Self, ApiError> {
        Self::new(config.api_base_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Helper to create better error messages from reqwest errors
    fn format_reqwest_error(e: &reqwest::Error, url: &str, operation: &str) -> String {
        if e.is_timeout() {
            format!(
                "Failed to {} {}: timeout - request took too long (check network or increase timeout)",
                operation, url
            )
        } else if e.is_connect() {
            format!(
                "Failed to {} {}: connection error - check network connectivity and DNS resolution. Error: {}",
                operation, url, e
            )
        } else if e.is_request() {
            format!(
                "Failed to {} {}: request error - invalid URL or malformed request. Error: {}",
                operation, url, e
            )
        } else if e.is_body() || e.is_decode() {
            format!(
                "Failed to {} {}: could not read response body. Error: {}",
                operation, url, e
            )
        } else {
            format!("Failed to {} {}: {}. Debug details: {:?}", operation, url, e, e)
        }
    }

    /// Current trace context as HTTP headers, for distributed tracing
    fn trace_headers() -> HeaderMap {
        use opentelemetry::global;
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        struct HeaderInjector {
            headers: HeaderMap,
        }
        impl opentelemetry::propagation::Injector for HeaderInjector {
            fn set(&mut self, key: &str, value: String) {
                if let Ok(name) = HeaderName::from_bytes(key.as_bytes()) {
                    if let Ok(value) = HeaderValue::from_str(&value) {
                        self.headers.insert(name, value);
                    }
                }
            }
        }

        let context = tracing::Span::current().context();
        let mut injector = HeaderInjector {
            headers: HeaderMap::new(),
        };
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&context, &mut injector);
        });
        injector.headers
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let operation = request.method.to_string();
        debug!("[HttpTransport] {} {}", operation, url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        }
        .headers(Self::trace_headers());
        if let Some(credential) = &request.credential {
            builder = builder.header(reqwest::header::AUTHORIZATION, credential);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        match request.body {
            Some(RequestBody::Json(body)) => builder = builder.json(&body),
            Some(RequestBody::Binary { content_type, data }) => {
                builder = builder
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(data);
            }
            None => {}
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(Self::format_reqwest_error(&e, &url, &operation)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(Self::format_reqwest_error(&e, &url, &operation)))?;

        debug!("[HttpTransport] {} {} -> {}", operation, url, status);
        Ok(ApiResponse::new(status, parse_body(&text)))
    }
}

/// JSON body, `Null` when empty, or the raw text when it is not JSON
fn parse_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}
