//! HTTP requester for the platform REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use bronze_core::{ApiError, ApiResult, Method, Requester, Secret};

use crate::ratelimit::{DEFAULT_LOW_WATER, RateLimitHeaders, RateLimiter};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://www.kookapp.cn/api";

/// Configuration of the HTTP requester.
#[derive(Debug, Clone)]
pub struct RequesterConfig {
    /// Base URL without the version segment.
    pub base_url: String,
    /// API version.
    pub version: u32,
    /// Bot token.
    pub token: Secret,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Remaining-budget threshold for rate-limit pacing.
    pub rate_limit_low_water: u32,
}

impl RequesterConfig {
    /// Creates a config with default endpoint and limits.
    pub fn new(token: impl Into<Secret>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            version: 3,
            token: token.into(),
            timeout: Duration::from_secs(30),
            rate_limit_low_water: DEFAULT_LOW_WATER,
        }
    }

    /// Returns `{base_url}/v{version}/`.
    pub fn endpoint(&self) -> String {
        format!("{}/v{}/", self.base_url.trim_end_matches('/'), self.version)
    }
}

/// Response envelope `{code, message, data}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

/// Unwraps a response envelope into its `data`.
pub fn parse_envelope(method: Method, route: &str, body: &[u8]) -> ApiResult<Value> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(|e| ApiError::Decode {
        route: route.to_string(),
        reason: e.to_string(),
    })?;
    if envelope.code != 0 {
        return Err(ApiError::RequestFailed {
            method,
            route: route.to_string(),
            code: envelope.code,
            message: envelope.message,
        });
    }
    Ok(envelope.data)
}

/// Flattens a JSON object into query pairs.
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = params else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// Rate-limited, authenticated REST client.
///
/// The underlying connection pool is created on first use and kept for the
/// lifetime of the requester.
#[derive(Debug)]
pub struct HttpRequester {
    config: RequesterConfig,
    endpoint: String,
    client: OnceCell<reqwest::Client>,
    limiter: RateLimiter,
}

impl HttpRequester {
    /// Creates a requester; no connection is made yet.
    pub fn new(config: RequesterConfig) -> Self {
        let endpoint = config.endpoint();
        let limiter = RateLimiter::new(config.rate_limit_low_water);
        Self {
            config,
            endpoint,
            client: OnceCell::new(),
            limiter,
        }
    }

    /// Returns the rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    async fn client(&self) -> ApiResult<&reqwest::Client> {
        self.client
            .get_or_try_init(|| async {
                let mut auth = HeaderValue::from_str(&format!("Bot {}", self.config.token.expose()))
                    .map_err(|e| ApiError::Other(format!("invalid token header: {e}")))?;
                auth.set_sensitive(true);
                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, auth);

                debug!(endpoint = %self.endpoint, "Creating HTTP client");
                reqwest::Client::builder()
                    .timeout(self.config.timeout)
                    .default_headers(headers)
                    .build()
                    .map_err(|e| ApiError::Other(format!("failed to build HTTP client: {e}")))
            })
            .await
    }

    fn map_send_error(route: &str, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Http {
                route: route.to_string(),
                reason: err.without_url().to_string(),
            }
        }
    }

    async fn execute(&self, route: &str, builder: reqwest::RequestBuilder) -> ApiResult<Vec<u8>> {
        self.limiter.wait_for_rate(route).await;

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_send_error(route, e))?;

        let headers = response.headers();
        if let Some(limits) =
            RateLimitHeaders::parse(|name| headers.get(name).and_then(|v| v.to_str().ok()))
        {
            self.limiter.update(route, &limits);
        }

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_send_error(route, e))?;
        trace!(route, status = status.as_u16(), len = body.len(), "API response");

        if !status.is_success() && serde_json::from_slice::<Envelope>(&body).is_err() {
            return Err(ApiError::Http {
                route: route.to_string(),
                reason: format!("HTTP {status}"),
            });
        }
        Ok(body.to_vec())
    }

    async fn build(
        &self,
        method: Method,
        route: &str,
        params: &Value,
    ) -> ApiResult<reqwest::RequestBuilder> {
        let client = self.client().await?;
        let url = format!("{}{}", self.endpoint, route);
        Ok(match method {
            Method::Get => client.get(url).query(&query_pairs(params)),
            Method::Post => client.post(url).json(params),
        })
    }
}

#[async_trait]
impl Requester for HttpRequester {
    async fn request(&self, method: Method, route: &str, params: Value) -> ApiResult<Value> {
        let body = self.request_raw(method, route, params).await?;
        parse_envelope(method, route, &body)
    }

    async fn request_raw(
        &self,
        method: Method,
        route: &str,
        params: Value,
    ) -> ApiResult<Vec<u8>> {
        let builder = self.build(method, route, &params).await?;
        self.execute(route, builder).await
    }

    async fn upload_asset(&self, bytes: Vec<u8>, file_name: &str) -> ApiResult<String> {
        const ROUTE: &str = "asset/create";
        let client = self.client().await?;
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));
        let builder = client
            .post(format!("{}{}", self.endpoint, ROUTE))
            .multipart(form);

        let body = self.execute(ROUTE, builder).await?;
        let data = parse_envelope(Method::Post, ROUTE, &body)?;
        data.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode {
                route: ROUTE.into(),
                reason: "response carries no url".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use serde_json::json;
    use tokio::net::TcpListener;

    #[test]
    fn envelope_with_nonzero_code_fails() {
        let err = parse_envelope(
            Method::Post,
            "message/create",
            br#"{"code":40100,"message":"no permission","data":{}}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), Some(40100));
        assert!(!err.to_string().contains("content"));

        let data = parse_envelope(Method::Get, "user/me", br#"{"code":0,"data":{"id":"1"}}"#)
            .unwrap();
        assert_eq!(data["id"], "1");
    }

    #[test]
    fn endpoint_and_query() {
        let mut config = RequesterConfig::new("t");
        config.base_url = "http://localhost/api/".into();
        assert_eq!(config.endpoint(), "http://localhost/api/v3/");

        let pairs = query_pairs(&json!({"compress": 0, "guild_id": "g", "skip": null}));
        assert!(pairs.contains(&("compress".into(), "0".into())));
        assert!(pairs.contains(&("guild_id".into(), "g".into())));
        assert_eq!(pairs.len(), 2);
    }

    async fn me(headers: AxumHeaders) -> impl IntoResponse {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        (
            [
                ("X-Rate-Limit-Remaining", "0"),
                ("X-Rate-Limit-Reset", "7"),
                ("X-Rate-Limit-Bucket", "user/me"),
            ],
            axum::Json(json!({"code": 0, "message": "", "data": {"auth": auth}})),
        )
    }

    async fn refuse() -> impl IntoResponse {
        axum::Json(json!({"code": 40000, "message": "bad content", "data": []}))
    }

    async fn broken() -> impl IntoResponse {
        (StatusCode::BAD_GATEWAY, "upstream down")
    }

    async fn serve() -> String {
        let app = Router::new()
            .route("/api/v3/user/me", get(me))
            .route("/api/v3/message/create", post(refuse))
            .route("/api/v3/broken", get(broken));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/api")
    }

    fn requester(base_url: String) -> HttpRequester {
        let mut config = RequesterConfig::new("secret-token");
        config.base_url = base_url;
        HttpRequester::new(config)
    }

    #[tokio::test]
    async fn request_authenticates_and_learns_limits() {
        let requester = requester(serve().await);
        let data = requester
            .request(Method::Get, "user/me", Value::Null)
            .await
            .unwrap();
        assert_eq!(data["auth"], "Bot secret-token");
        assert_eq!(
            requester.limiter().delay_for("user/me"),
            Duration::from_secs(7)
        );
    }

    #[tokio::test]
    async fn nonzero_code_is_request_failed() {
        let requester = requester(serve().await);
        let err = requester
            .request(Method::Post, "message/create", json!({"content": "secret"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RequestFailed { code: 40000, .. }));
        assert!(!err.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn non_envelope_error_status_is_http_error() {
        let requester = requester(serve().await);
        let err = requester
            .request_raw(Method::Get, "broken", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Http { .. }));
    }
}
