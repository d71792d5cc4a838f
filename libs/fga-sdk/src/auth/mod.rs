//! Request authentication: static API tokens and the client-credentials
//! token cache.

mod cache;
mod issuer;
mod token;
mod types;

use std::sync::Arc;

use fga_utils::SecretString;
use http::HeaderValue;
use zeroize::Zeroizing;

pub use cache::{AccessTokenCache, EXCHANGE_OPERATION};
pub use issuer::{DEFAULT_TOKEN_PATH, resolve_token_endpoint};
pub use token::{AccessToken, TOKEN_EXPIRY_BUFFER, TOKEN_EXPIRY_JITTER};

use crate::attempt::{Orchestrator, RetryParams};
use crate::config::Credentials;
use crate::error::FgaError;

/// Source of the `Authorization` header for API calls.
#[derive(Debug, Clone, Default)]
pub enum Authorizer {
    #[default]
    None,
    ApiToken(SecretString),
    ClientCredentials(Arc<AccessTokenCache>),
}

impl Authorizer {
    /// # Errors
    /// `InvalidParameter` if the credentials are incomplete.
    pub fn from_credentials(credentials: &Credentials, retry: RetryParams) -> Result<Self, FgaError> {
        credentials.validate()?;
        Ok(match credentials {
            Credentials::ApiToken { api_token } => Self::ApiToken(api_token.clone()),
            Credentials::ClientCredentials(cc) => {
                Self::ClientCredentials(Arc::new(AccessTokenCache::new(cc, retry)?))
            }
            Credentials::None => Self::None,
        })
    }

    /// Current bearer token, exchanging credentials when needed.
    ///
    /// # Errors
    /// Token exchange failures.
    pub async fn token(&self, orchestrator: &Orchestrator) -> Result<Option<SecretString>, FgaError> {
        match self {
            Self::None => Ok(None),
            Self::ApiToken(token) => Ok(Some(token.clone())),
            Self::ClientCredentials(cache) => cache.get_token(orchestrator).await.map(Some),
        }
    }

    /// `Bearer <token>` header value, marked sensitive.
    ///
    /// # Errors
    /// Token exchange failures, or a token that is not a valid header value.
    pub async fn authorization(
        &self,
        orchestrator: &Orchestrator,
    ) -> Result<Option<HeaderValue>, FgaError> {
        let Some(token) = self.token(orchestrator).await? else {
            return Ok(None);
        };
        let header = Zeroizing::new(format!("Bearer {}", token.expose()));
        let mut value = HeaderValue::from_str(&header)
            .map_err(|_| FgaError::invalid_parameter("accessToken", "Authorization"))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}
