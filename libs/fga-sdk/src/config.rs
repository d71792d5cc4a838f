//! Client configuration.
//!
//! Loaded with `figment`: defaults, then an optional YAML file, then
//! `FGA_`-prefixed environment variables (`FGA_CREDENTIALS__CLIENT_ID`
//! sets `credentials.client_id`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use fga_utils::SecretString;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use http::header::USER_AGENT;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::attempt::RetryParams;
use crate::auth::resolve_token_endpoint;
use crate::error::FgaError;
use crate::retry::{DEFAULT_MAX_RETRIES, DEFAULT_MIN_RETRY_DELAY, MAX_RETRIES_LIMIT};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";

pub const DEFAULT_USER_AGENT: &str = concat!("openfga-sdk rust/", env!("CARGO_PKG_VERSION"));

pub const ENV_PREFIX: &str = "FGA_";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Base URL of the OpenFGA server. Blank means [`DEFAULT_API_URL`].
    pub api_url: String,
    /// Fills `{store_id}` in raw request paths when no path param is given.
    pub store_id: Option<String>,
    pub credentials: Credentials,
    pub user_agent: String,
    /// Per attempt, not per call.
    #[serde(with = "fga_utils::duration_serde")]
    pub request_timeout: Duration,
    #[serde(with = "fga_utils::duration_serde")]
    pub connect_timeout: Duration,
    /// Retries after the first attempt, at most [`MAX_RETRIES_LIMIT`].
    pub max_retries: u32,
    /// Backoff base.
    #[serde(with = "fga_utils::duration_serde")]
    pub minimum_retry_delay: Duration,
    /// Sent with every request unless the request sets the header itself.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            store_id: None,
            credentials: Credentials::None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            request_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            minimum_retry_delay: DEFAULT_MIN_RETRY_DELAY,
            default_headers: BTreeMap::new(),
        }
    }
}

impl Configuration {
    /// Extract from an already assembled figment.
    ///
    /// # Errors
    /// `FgaError::Config` when the figment does not match the schema.
    pub fn from_figment(figment: &Figment) -> Result<Self, FgaError> {
        figment
            .extract()
            .map_err(|e| FgaError::Config(e.to_string()))
    }

    /// Defaults, then `path` (YAML) if given, then `FGA_*` environment variables.
    ///
    /// # Errors
    /// `FgaError::Config` on unreadable files or malformed values.
    pub fn load(path: Option<&Path>) -> Result<Self, FgaError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file_exact(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// `api_url`, falling back to [`DEFAULT_API_URL`] when blank.
    #[must_use]
    pub fn api_url(&self) -> &str {
        let url = self.api_url.trim();
        if url.is_empty() { DEFAULT_API_URL } else { url }
    }

    /// # Errors
    /// `FgaError::InvalidParameter` naming the offending setting.
    pub fn parsed_api_url(&self) -> Result<Url, FgaError> {
        let url = Url::parse(self.api_url())
            .map_err(|_| FgaError::invalid_parameter("apiUrl", "Configuration"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FgaError::invalid_parameter("scheme", "Configuration"));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(FgaError::invalid_parameter("host", "Configuration"));
        }
        Ok(url)
    }

    /// Check everything that can be checked without I/O.
    ///
    /// # Errors
    /// `FgaError::InvalidParameter` naming the offending setting.
    pub fn validate(&self) -> Result<(), FgaError> {
        self.parsed_api_url()?;
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(FgaError::invalid_parameter("maxRetries", "Configuration"));
        }
        for (name, value) in &self.default_headers {
            header_pair(name, value, "Configuration")?;
        }
        self.credentials.validate()
    }

    /// Retry settings for one call, per-call overrides applied.
    ///
    /// # Errors
    /// `FgaError::InvalidParameter` if the override exceeds [`MAX_RETRIES_LIMIT`].
    pub fn retry_params(&self, options: &RequestOptions) -> Result<RetryParams, FgaError> {
        let max_retries = options.max_retries.unwrap_or(self.max_retries);
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(FgaError::invalid_parameter("maxRetries", "RequestOptions"));
        }
        Ok(RetryParams {
            max_retries,
            minimum_retry_delay: options
                .minimum_retry_delay
                .unwrap_or(self.minimum_retry_delay),
        })
    }

    /// `User-Agent`, default headers and per-call headers, later ones winning.
    /// A per-call header set to `None` removes the default.
    ///
    /// # Errors
    /// `FgaError::InvalidParameter` for header names or values that are not valid HTTP.
    pub fn request_headers(&self, options: &RequestOptions) -> Result<HeaderMap, FgaError> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        for (name, value) in &self.default_headers {
            let (name, value) = header_pair(name, value, "Configuration")?;
            headers.insert(name, value);
        }
        for (name, value) in &options.headers {
            match value {
                Some(value) => {
                    let (name, value) = header_pair(name, value, "RequestOptions")?;
                    headers.insert(name, value);
                }
                None => {
                    let name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|_| FgaError::invalid_parameter("headers", "RequestOptions"))?;
                    headers.remove(name);
                }
            }
        }
        Ok(headers)
    }
}

fn header_pair(name: &str, value: &str, context: &str) -> Result<(HeaderName, HeaderValue), FgaError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| FgaError::invalid_parameter("headers", context))?;
    let value =
        HeaderValue::from_str(value).map_err(|_| FgaError::invalid_parameter("headers", context))?;
    Ok((name, value))
}

/// How requests authenticate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Credentials {
    #[default]
    None,
    /// Static `Authorization: Bearer <api_token>`.
    ApiToken { api_token: SecretString },
    /// OAuth2 client-credentials grant, token cached and refreshed.
    ClientCredentials(ClientCredentials),
}

impl Credentials {
    /// # Errors
    /// `FgaError::InvalidParameter` for blank required fields or a bad issuer.
    pub fn validate(&self) -> Result<(), FgaError> {
        match self {
            Self::None => Ok(()),
            Self::ApiToken { api_token } => {
                if api_token.is_blank() {
                    return Err(FgaError::invalid_parameter("apiToken", "ApiToken"));
                }
                Ok(())
            }
            Self::ClientCredentials(cc) => cc.validate(),
        }
    }

    #[must_use]
    pub fn client_credentials(&self) -> Option<&ClientCredentials> {
        match self {
            Self::ClientCredentials(cc) => Some(cc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Host or URL of the token issuer; see [`resolve_token_endpoint`].
    pub api_token_issuer: String,
    #[serde(default)]
    pub api_audience: Option<String>,
    /// Space-separated scopes.
    #[serde(default)]
    pub scopes: Option<String>,
}

impl ClientCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<SecretString>,
        api_token_issuer: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_token_issuer: api_token_issuer.into(),
            api_audience: None,
            scopes: None,
        }
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.api_audience = Some(audience.into());
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: impl Into<String>) -> Self {
        self.scopes = Some(scopes.into());
        self
    }

    /// # Errors
    /// `FgaError::InvalidParameter` for blank required fields or a bad issuer.
    pub fn validate(&self) -> Result<(), FgaError> {
        if self.client_id.trim().is_empty() {
            return Err(FgaError::invalid_parameter("clientId", "ClientCredentials"));
        }
        if self.client_secret.is_blank() {
            return Err(FgaError::invalid_parameter("clientSecret", "ClientCredentials"));
        }
        if self.api_token_issuer.trim().is_empty() {
            return Err(FgaError::invalid_parameter("apiTokenIssuer", "ClientCredentials"));
        }
        resolve_token_endpoint(&self.api_token_issuer).map(|_| ())
    }
}

/// Per-call overrides of the client configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub max_retries: Option<u32>,
    pub minimum_retry_delay: Option<Duration>,
    /// `None` removes a default header for this call.
    pub headers: BTreeMap<String, Option<String>>,
}

impl RequestOptions {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn with_minimum_retry_delay(mut self, delay: Duration) -> Self {
        self.minimum_retry_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), Some(value.into()));
        self
    }

    #[must_use]
    pub fn without_header(mut self, name: impl Into<String>) -> Self {
        self.headers.insert(name.into(), None);
        self
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_credentials() -> ClientCredentials {
        ClientCredentials::new("client-1", "s3cret", "issuer.fga.example")
    }

    #[test]
    fn defaults() {
        let config = Configuration::default();
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.minimum_retry_delay, Duration::from_millis(100));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("openfga-sdk rust/"));
        config.validate().unwrap();
    }

    #[test]
    fn blank_api_url_uses_default() {
        let config = Configuration {
            api_url: "  ".into(),
            ..Configuration::default()
        };
        assert_eq!(config.parsed_api_url().unwrap().as_str(), "http://localhost:8080/");
    }

    #[test]
    fn figment_merges_over_defaults() {
        let figment = Figment::from(Serialized::defaults(Configuration::default())).merge(
            Serialized::defaults(json!({
                "api_url": "https://api.fga.example",
                "minimum_retry_delay": "250ms",
                "request_timeout": 2000,
                "credentials": {
                    "method": "client_credentials",
                    "client_id": "client-1",
                    "client_secret": "s3cret",
                    "api_token_issuer": "issuer.fga.example",
                    "api_audience": "https://api.fga.example/"
                }
            })),
        );

        let config = Configuration::from_figment(&figment).unwrap();
        assert_eq!(config.api_url(), "https://api.fga.example");
        assert_eq!(config.minimum_retry_delay, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.max_retries, 3);

        let cc = config.credentials.client_credentials().unwrap();
        assert_eq!(cc.client_id, "client-1");
        assert_eq!(cc.client_secret.expose(), "s3cret");
        assert_eq!(cc.api_audience.as_deref(), Some("https://api.fga.example/"));
        config.validate().unwrap();
    }

    #[test]
    fn bad_duration_is_a_config_error() {
        let figment = Figment::from(Serialized::defaults(json!({ "connect_timeout": "soon" })));
        let err = Configuration::from_figment(&figment).unwrap_err();
        assert!(matches!(err, FgaError::Config(msg) if msg.contains("soon")));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = Configuration {
            credentials: Credentials::ClientCredentials(client_credentials()),
            ..Configuration::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn validation_names_the_parameter() {
        let cases = [
            (
                Configuration {
                    api_url: "not a url".into(),
                    ..Configuration::default()
                },
                "Required parameter apiUrl was invalid when calling Configuration.",
            ),
            (
                Configuration {
                    api_url: "ftp://fga.example".into(),
                    ..Configuration::default()
                },
                "Required parameter scheme was invalid when calling Configuration.",
            ),
            (
                Configuration {
                    max_retries: 16,
                    ..Configuration::default()
                },
                "Required parameter maxRetries was invalid when calling Configuration.",
            ),
            (
                Configuration {
                    credentials: Credentials::ApiToken {
                        api_token: " ".into(),
                    },
                    ..Configuration::default()
                },
                "Required parameter apiToken was invalid when calling ApiToken.",
            ),
            (
                Configuration {
                    credentials: Credentials::ClientCredentials(ClientCredentials::new(
                        "", "s3cret", "issuer",
                    )),
                    ..Configuration::default()
                },
                "Required parameter clientId was invalid when calling ClientCredentials.",
            ),
            (
                Configuration {
                    credentials: Credentials::ClientCredentials(ClientCredentials::new(
                        "client", "", "issuer",
                    )),
                    ..Configuration::default()
                },
                "Required parameter clientSecret was invalid when calling ClientCredentials.",
            ),
            (
                Configuration {
                    credentials: Credentials::ClientCredentials(ClientCredentials::new(
                        "client",
                        "s3cret",
                        "ftp://issuer",
                    )),
                    ..Configuration::default()
                },
                "Required parameter scheme was invalid when calling apiTokenIssuer.",
            ),
        ];

        for (config, expected) in cases {
            assert_eq!(config.validate().unwrap_err().to_string(), expected);
        }
    }

    #[test]
    fn request_headers_merge_and_remove() {
        let mut config = Configuration::default();
        config.default_headers.insert("X-Tenant".into(), "acme".into());
        config.default_headers.insert("X-Trace".into(), "on".into());

        let options = RequestOptions::default()
            .with_header("X-Tenant", "globex")
            .without_header("x-trace");
        let headers = config.request_headers(&options).unwrap();

        assert_eq!(headers["x-tenant"], "globex");
        assert!(headers.get("x-trace").is_none());
        assert_eq!(headers[USER_AGENT], DEFAULT_USER_AGENT);
    }

    #[test]
    fn retry_params_apply_overrides() {
        let config = Configuration::default();
        let params = config
            .retry_params(&RequestOptions::default().with_max_retries(0))
            .unwrap();
        assert_eq!(params.max_retries, 0);
        assert_eq!(params.minimum_retry_delay, DEFAULT_MIN_RETRY_DELAY);

        let err = config
            .retry_params(&RequestOptions::default().with_max_retries(99))
            .unwrap_err();
        assert!(matches!(err, FgaError::InvalidParameter { .. }));
    }
}
