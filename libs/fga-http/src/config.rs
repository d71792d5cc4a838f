use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("fga-http/", env!("CARGO_PKG_VERSION"));

/// Source of root certificates for TLS verification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsRootConfig {
    /// Mozilla root certificates bundled at build time
    #[default]
    WebPki,
    /// Certificates from the OS trust store (loaded once, cached)
    Native,
}

/// Which URL schemes the transport accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportSecurity {
    /// `https://` only
    #[default]
    TlsOnly,
    /// `http://` and `https://`. For local servers and mock servers.
    AllowInsecureHttp,
}

/// Transport configuration.
///
/// There is no retry section: the transport issues one attempt per call and
/// leaves retry decisions to the caller.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Timeout for one attempt, from send until response headers arrive
    pub request_timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Limit for fully buffered bodies (`bytes`, `json`, `text`).
    /// Streaming bodies are not limited.
    pub max_body_size: usize,

    /// `User-Agent` sent when the request does not carry one
    pub user_agent: String,

    /// Headers added to every request that does not already set them
    pub default_headers: Vec<(String, String)>,

    pub transport: TransportSecurity,

    pub tls_roots: TlsRootConfig,

    /// Queue depth of the internal request buffer. Zero is clamped to 1.
    pub buffer_capacity: usize,

    /// Idle pooled connections are closed after this long
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: Vec::new(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// Configuration for `OAuth2` token endpoints: small bodies, few
    /// connections.
    #[must_use]
    pub fn token_endpoint() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1 MB
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(60)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }

    /// Configuration for tests against mock servers (plain HTTP allowed).
    ///
    /// **WARNING**: never use in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_body_size: 1024 * 1024, // 1 MB
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}
