//! HTTP transport seam.
//!
//! Everything above this module speaks [`ApiRequest`]/[`ApiResponse`]; the
//! [`HttpTransport`] trait is the only place a real HTTP client appears, which
//! keeps the renewal and replay logic testable against scripted backends.

use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(format!("unsupported HTTP method: {}", other)),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// A request relative to the API base URL.
#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    bearer_token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self {
            method,
            path,
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            bearer_token: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.body = RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Copy of this request carrying `token` as its bearer credential.
    pub fn with_bearer(&self, token: &str) -> Self {
        let mut request = self.clone();
        request.bearer_token = Some(token.to_string());
        request
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("authenticated", &self.bearer_token.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Response with a JSON body.
    pub fn json_body(status: u16, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, value.to_string());
        response
            .headers
            .push(("content-type".to_string(), "application/json".to_string()));
        response
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Human-readable error detail.
    ///
    /// FastAPI reports errors as `{"detail": "..."}`, or for validation
    /// failures `{"detail": [{"msg": "..."}, ...]}`; anything else falls back
    /// to the raw body.
    pub fn detail(&self) -> String {
        let parsed: Option<serde_json::Value> = serde_json::from_slice(&self.body).ok();
        match parsed.as_ref().and_then(|v| v.get("detail")) {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; "),
            Some(other) => other.to_string(),
            None => self.text(),
        }
    }

    /// Convert a non-success response into [`AuthError::Status`].
    pub fn error_for_status(self) -> AuthResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AuthError::Status {
                status: self.status,
                body: self.detail(),
            })
        }
    }
}

/// Executes API requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> AuthResult<ApiResponse>;
}

/// reqwest-backed transport.
///
/// The client keeps a cookie jar so the HTTP-only refresh cookie set by
/// `/login` is replayed on `/refresh`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &Url) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("keeper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, path = %request.path, "Sending request");

        let mut builder = self.client.request(request.method.into(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(token) = request.bearer_token() {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Json(value) => builder.json(value),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AuthError::Timeout
            } else {
                AuthError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(status, path = %request.path, "Received response");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_is_rooted() {
        assert_eq!(ApiRequest::get("me").path, "/me");
        assert_eq!(ApiRequest::get("/me").path, "/me");
    }

    #[test]
    fn test_with_bearer_leaves_original_untouched() {
        let request = ApiRequest::get("/items").query("page", "2");
        let authed = request.with_bearer("tok");
        assert_eq!(request.bearer_token(), None);
        assert_eq!(authed.bearer_token(), Some("tok"));
        assert_eq!(authed.query, vec![("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_debug_hides_token() {
        let request = ApiRequest::get("/me").with_bearer("very-secret");
        assert!(!format!("{:?}", request).contains("very-secret"));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("PATCH".parse::<Method>().unwrap(), Method::Patch);
        assert!("TRACE".parse::<Method>().is_err());
    }

    #[test]
    fn test_detail_string() {
        let response = ApiResponse::json_body(401, &json!({"detail": "Incorrect password"}));
        assert_eq!(response.detail(), "Incorrect password");
    }

    #[test]
    fn test_detail_validation_list() {
        let response = ApiResponse::json_body(
            422,
            &json!({"detail": [{"msg": "field required"}, {"msg": "too short"}]}),
        );
        assert_eq!(response.detail(), "field required; too short");
    }

    #[test]
    fn test_detail_falls_back_to_body() {
        let response = ApiResponse::new(502, "Bad Gateway");
        assert_eq!(response.detail(), "Bad Gateway");
    }

    #[test]
    fn test_error_for_status() {
        assert!(ApiResponse::new(204, "").error_for_status().is_ok());
        match ApiResponse::json_body(404, &json!({"detail": "Not found"})).error_for_status() {
            Err(AuthError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "Not found");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = ApiResponse::json_body(200, &json!({}));
        assert_eq!(response.header("Content-Type"), Some("application/json"));
    }
}
