//! HTTP health probe.
//!
//! One plain HTTP/1.1 connection per check. 2xx is healthy, 401/403 is an
//! auth failure and any other status is `unhealthy` with detail `http_<code>`.

use std::str::FromStr;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use depwatch_core::{CheckError, Checker, Endpoint, StatusCategory, ValidationError};
use http::header::{AUTHORIZATION, HOST, HeaderName, HeaderValue, USER_AGENT};
use http::uri::PathAndQuery;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_HEALTH_PATH: &str = "/health";

const USER_AGENT_VALUE: &str = concat!("depwatch/", env!("CARGO_PKG_VERSION"));

/// Probes `http://<host>:<port><health_path>`.
#[derive(Debug, Clone)]
pub struct HttpChecker {
    health_path: PathAndQuery,
    headers: HeaderMap,
}

impl HttpChecker {
    /// Checker for `/health` with no extra headers.
    pub fn new() -> Self {
        Self {
            health_path: PathAndQuery::from_static(DEFAULT_HEALTH_PATH),
            headers: HeaderMap::new(),
        }
    }

    pub fn builder() -> HttpCheckerBuilder {
        HttpCheckerBuilder::default()
    }

    pub fn health_path(&self) -> &str {
        self.health_path.as_str()
    }
}

impl Default for HttpChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`HttpChecker`]. At most one auth source may be set.
#[derive(Debug, Clone, Default)]
pub struct HttpCheckerBuilder {
    health_path: Option<String>,
    headers: Vec<(String, String)>,
    bearer_token: Option<String>,
    basic_auth: Option<(String, String)>,
}

impl HttpCheckerBuilder {
    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Send `Authorization: Bearer <token>`.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Send `Authorization: Basic <base64(username:password)>`.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((username.into(), password.into()));
        self
    }

    pub fn build(self) -> Result<HttpChecker, ValidationError> {
        let path = self
            .health_path
            .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string());
        if !path.starts_with('/') {
            return Err(ValidationError::InvalidPath(path));
        }
        let health_path =
            PathAndQuery::from_str(&path).map_err(|_| ValidationError::InvalidPath(path.clone()))?;

        let explicit_auth = self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION.as_str()));
        let sources = [
            explicit_auth,
            self.bearer_token.is_some(),
            self.basic_auth.is_some(),
        ];
        if sources.iter().filter(|set| **set).count() > 1 {
            return Err(ValidationError::ConflictingAuth(
                "set only one of bearer token, basic auth, or an Authorization header".into(),
            ));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ValidationError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| ValidationError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }

        let credentials = match (self.bearer_token, self.basic_auth) {
            (Some(token), _) => Some(format!("Bearer {token}")),
            (None, Some((user, password))) => {
                Some(format!("Basic {}", STANDARD.encode(format!("{user}:{password}"))))
            }
            (None, None) => None,
        };
        if let Some(credentials) = credentials {
            let value = HeaderValue::from_str(&credentials)
                .map_err(|_| ValidationError::InvalidHeader(AUTHORIZATION.as_str().to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(value) = headers.get_mut(AUTHORIZATION) {
            value.set_sensitive(true);
        }

        Ok(HttpChecker {
            health_path,
            headers,
        })
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), CheckError> {
        let address = endpoint.address();
        let stream = TcpStream::connect(&address).await.map_err(|e| {
            debug!(error = %e, %address, "health probe connection failed");
            CheckError::Io(e)
        })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| anyhow::Error::new(e).context("http handshake failed"))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "health probe connection error");
            }
        });

        let mut req = Request::builder()
            .method(Method::GET)
            .uri(self.health_path.clone())
            .header(HOST, &address)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Empty::<Bytes>::new())
            .map_err(|e| anyhow::Error::new(e).context("http request build failed"))?;
        req.headers_mut().extend(self.headers.clone());

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| anyhow::Error::new(e).context("http request failed"))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let url = format!("http://{address}{}", self.health_path);
        debug!(%status, %url, "health probe non-2xx");
        let message = format!("http status {} from {url}", status.as_u16());
        Err(classify_status(status, message))
    }
}

fn classify_status(status: StatusCode, message: String) -> CheckError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CheckError::classified(StatusCategory::AuthError, "auth_error", message)
        }
        _ => CheckError::classified(
            StatusCategory::Unhealthy,
            format!("http_{}", status.as_u16()),
            message,
        ),
    }
}
