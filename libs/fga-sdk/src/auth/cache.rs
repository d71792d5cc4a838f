use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwapOption;
use fga_utils::SecretString;
use http::Method;
use tokio::sync::Mutex;
use url::Url;
use zeroize::Zeroizing;

use super::issuer::resolve_token_endpoint;
use super::token::AccessToken;
use super::types::TokenResponse;
use crate::attempt::{Orchestrator, RetryParams};
use crate::config::ClientCredentials;
use crate::error::FgaError;
use crate::request::ApiRequest;

/// Operation name of the token exchange in errors, logs and telemetry.
pub const EXCHANGE_OPERATION: &str = "exchangeToken";

/// One cached bearer token per client-credentials set.
///
/// Reads are lock-free. Refreshes are serialized: callers that find the token
/// stale while another caller is already exchanging wait for that exchange
/// and reuse its result instead of posting to the token endpoint again.
pub struct AccessTokenCache {
    token_endpoint: Url,
    client_id: String,
    client_secret: SecretString,
    audience: Option<String>,
    scopes: Option<String>,
    retry: RetryParams,
    current: ArcSwapOption<AccessToken>,
    refresh: Mutex<()>,
}

impl fmt::Debug for AccessTokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenCache")
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("client_id", &self.client_id)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl AccessTokenCache {
    /// Empty cache; the first [`get_token`](Self::get_token) performs the exchange.
    ///
    /// # Errors
    /// `InvalidParameter` if the credentials are incomplete or the issuer is invalid.
    pub fn new(credentials: &ClientCredentials, retry: RetryParams) -> Result<Self, FgaError> {
        credentials.validate()?;
        Ok(Self {
            token_endpoint: resolve_token_endpoint(&credentials.api_token_issuer)?,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            audience: credentials.api_audience.clone(),
            scopes: credentials.scopes.clone(),
            retry,
            current: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Token currently held, valid or not.
    #[must_use]
    pub fn current(&self) -> Option<Arc<AccessToken>> {
        self.current.load_full()
    }

    /// Drop the cached token; the next call exchanges again.
    pub fn invalidate(&self) {
        self.current.store(None);
    }

    /// A usable token, exchanging credentials if the cached one is missing or stale.
    ///
    /// # Errors
    /// Exchange failures, classified like any other call.
    pub async fn get_token(&self, orchestrator: &Orchestrator) -> Result<SecretString, FgaError> {
        let seen = self.current.load_full();
        if let Some(token) = &seen
            && token.is_valid()
        {
            return Ok(token.value().clone());
        }

        let _guard = self.refresh.lock().await;

        // Someone else refreshed while we were waiting
        let latest = self.current.load_full();
        if let Some(token) = &latest
            && !same_token(seen.as_ref(), Some(token))
        {
            tracing::debug!(operation = EXCHANGE_OPERATION, "Reusing token refreshed by a concurrent caller");
            return Ok(token.value().clone());
        }

        let token = Arc::new(self.exchange(orchestrator).await?);
        self.current.store(Some(Arc::clone(&token)));
        orchestrator.record_credentials_request();
        Ok(token.value().clone())
    }

    async fn exchange(&self, orchestrator: &Orchestrator) -> Result<AccessToken, FgaError> {
        let secret = Zeroizing::new(self.client_secret.expose().to_owned());
        let mut fields: Vec<(&str, &str)> = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", secret.as_str()),
        ];
        if let Some(audience) = &self.audience {
            fields.push(("audience", audience.as_str()));
        }
        fields.push(("grant_type", "client_credentials"));
        if let Some(scope) = &self.scopes {
            fields.push(("scope", scope.as_str()));
        }

        let request = ApiRequest::new(EXCHANGE_OPERATION, Method::POST, self.token_endpoint.clone())
            .form(fields.as_slice())?;
        let response = orchestrator
            .attempt_unauthenticated(&request, &self.retry)
            .await?;

        let body = response.bytes().await.map_err(|source| FgaError::transport(EXCHANGE_OPERATION, source))?;
        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(|source| FgaError::Decode {
                operation: EXCHANGE_OPERATION.to_owned(),
                source,
            })?;

        if let Some(token_type) = &parsed.token_type
            && !token_type.eq_ignore_ascii_case("bearer")
        {
            tracing::warn!(
                operation = EXCHANGE_OPERATION,
                token_type = %token_type,
                "Token endpoint returned a non-bearer token type; sending it as bearer"
            );
        }

        tracing::debug!(
            operation = EXCHANGE_OPERATION,
            client_id = %self.client_id,
            expires_in = ?parsed.expires_in,
            "Access token refreshed"
        );

        Ok(AccessToken::expiring_in(
            parsed.access_token,
            SystemTime::now(),
            parsed.expires_in.map(Duration::from_secs),
        ))
    }
}

fn same_token(a: Option<&Arc<AccessToken>>, b: Option<&Arc<AccessToken>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{ScriptedTransport, Step};
    use tracing_test::traced_test;

    fn credentials() -> ClientCredentials {
        ClientCredentials::new("client-1", "s3cret", "issuer.fga.example")
            .with_audience("https://api.fga.example/")
    }

    fn cache() -> AccessTokenCache {
        AccessTokenCache::new(
            &credentials(),
            RetryParams {
                max_retries: 2,
                minimum_retry_delay: Duration::from_millis(10),
            },
        )
        .unwrap()
    }

    fn token_body(token: &str, expires_in: u64) -> String {
        format!(r#"{{"access_token":"{token}","expires_in":{expires_in},"token_type":"Bearer"}}"#)
    }

    #[tokio::test]
    async fn first_call_exchanges_then_caches() {
        let transport = ScriptedTransport::new(vec![Step::status(200, &token_body("tok-1", 3600))]);
        let orchestrator = Orchestrator::new(transport.clone());
        let cache = cache();

        assert!(cache.current().is_none());
        assert_eq!(cache.get_token(&orchestrator).await.unwrap().expose(), "tok-1");
        assert_eq!(cache.get_token(&orchestrator).await.unwrap().expose(), "tok-1");
        assert_eq!(transport.call_count(), 1);

        let call = &transport.calls()[0];
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.uri, "https://issuer.fga.example/oauth/token");
        assert_eq!(
            call.headers[http::header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        let form: Vec<(String, String)> = serde_urlencoded::from_bytes(&call.body).unwrap();
        let field = |name: &str| {
            form.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(field("client_id"), Some("client-1"));
        assert_eq!(field("client_secret"), Some("s3cret"));
        assert_eq!(field("audience"), Some("https://api.fga.example/"));
        assert_eq!(field("grant_type"), Some("client_credentials"));
        assert_eq!(field("scope"), None);
        assert!(call.headers.get(http::header::AUTHORIZATION).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_exchange_leaves_cache_empty() {
        let transport = ScriptedTransport::with_latency(
            vec![
                Step::status(200, &token_body("tok-lost", 3600)),
                Step::status(200, &token_body("tok-2", 3600)),
            ],
            Duration::from_secs(10),
        );
        let orchestrator = Orchestrator::new(transport.clone());
        let cache = cache();

        let outcome =
            tokio::time::timeout(Duration::from_secs(1), cache.get_token(&orchestrator)).await;
        assert!(outcome.is_err());
        assert!(cache.current().is_none());

        assert_eq!(cache.get_token(&orchestrator).await.unwrap().expose(), "tok-2");
        assert_eq!(transport.call_count(), 2);
        assert_eq!(cache.current().unwrap().value().expose(), "tok-2");
    }

    #[tokio::test]
    async fn stale_token_is_refreshed() {
        // 60s lifetime is inside the expiry buffer: stale immediately
        let transport = ScriptedTransport::new(vec![
            Step::status(200, &token_body("short", 60)),
            Step::status(200, &token_body("long", 3600)),
        ]);
        let orchestrator = Orchestrator::new(transport.clone());
        let cache = cache();

        assert_eq!(cache.get_token(&orchestrator).await.unwrap().expose(), "short");
        assert_eq!(cache.get_token(&orchestrator).await.unwrap().expose(), "long");
        assert_eq!(cache.get_token(&orchestrator).await.unwrap().expose(), "long");
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn missing_expires_in_never_expires() {
        let transport =
            ScriptedTransport::new(vec![Step::status(200, r#"{"access_token":"forever"}"#)]);
        let orchestrator = Orchestrator::new(transport.clone());
        let cache = cache();

        cache.get_token(&orchestrator).await.unwrap();
        assert!(cache.current().unwrap().expires_at().is_none());
        cache.get_token(&orchestrator).await.unwrap();
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_exchange() {
        let transport = ScriptedTransport::with_latency(
            vec![Step::status(200, &token_body("shared", 3600))],
            Duration::from_millis(50),
        );
        let orchestrator = Orchestrator::new(transport.clone());
        let cache = Arc::new(cache());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move { cache.get_token(&orchestrator).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().expose(), "shared");
        }
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_failure_is_classified() {
        let transport = ScriptedTransport::new(vec![Step::status(
            401,
            r#"{"error":"invalid_client","error_description":"bad secret"}"#,
        )]);
        let orchestrator = Orchestrator::new(transport.clone());
        let err = cache().get_token(&orchestrator).await.unwrap_err();

        let api = err.api_error().unwrap();
        assert_eq!(api.kind(), &ErrorKind::Authentication);
        assert_eq!(api.operation(), EXCHANGE_OPERATION);
        assert_eq!(err.to_string(), "[exchangeToken] invalid_client");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_is_retried_on_server_errors() {
        let transport = ScriptedTransport::new(vec![
            Step::status(503, ""),
            Step::status(200, &token_body("tok", 3600)),
        ]);
        let orchestrator = Orchestrator::new(transport.clone());
        assert_eq!(cache().get_token(&orchestrator).await.unwrap().expose(), "tok");
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn malformed_token_response_is_a_decode_error() {
        let transport = ScriptedTransport::new(vec![Step::status(200, r#"{"access_token":""}"#)]);
        let orchestrator = Orchestrator::new(transport);
        let cache = cache();
        let err = cache.get_token(&orchestrator).await.unwrap_err();
        assert!(matches!(err, FgaError::Decode { ref operation, .. } if operation == EXCHANGE_OPERATION));
        assert!(cache.current().is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn non_bearer_token_type_only_warns() {
        let transport = ScriptedTransport::new(vec![Step::status(
            200,
            r#"{"access_token":"tok","expires_in":3600,"token_type":"mac"}"#,
        )]);
        let orchestrator = Orchestrator::new(transport);
        assert_eq!(cache().get_token(&orchestrator).await.unwrap().expose(), "tok");
        assert!(logs_contain("non-bearer token type"));
        assert!(!logs_contain("s3cret"));
    }

    #[tokio::test]
    async fn invalidate_forces_exchange() {
        let transport = ScriptedTransport::new(vec![
            Step::status(200, &token_body("one", 3600)),
            Step::status(200, &token_body("two", 3600)),
        ]);
        let orchestrator = Orchestrator::new(transport);
        let cache = cache();
        assert_eq!(cache.get_token(&orchestrator).await.unwrap().expose(), "one");
        cache.invalidate();
        assert_eq!(cache.get_token(&orchestrator).await.unwrap().expose(), "two");
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", cache());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("client-1"));
    }
}
