use url::Url;

use crate::error::FgaError;

/// Path used when the issuer has none.
pub const DEFAULT_TOKEN_PATH: &str = "/oauth/token";

/// Token endpoint URL for an `api_token_issuer` value.
///
/// `issuer.fga.example` becomes `https://issuer.fga.example/oauth/token`; an
/// explicit path is kept as-is.
///
/// # Errors
/// `InvalidParameter` for unparseable values and schemes other than `http`/`https`.
pub fn resolve_token_endpoint(issuer: &str) -> Result<Url, FgaError> {
    let issuer = issuer.trim();
    let invalid = || FgaError::invalid_parameter("apiTokenIssuer", "ClientCredentials");

    let mut url = if issuer.contains("://") {
        Url::parse(issuer).map_err(|_| invalid())?
    } else {
        Url::parse(&format!("https://{issuer}")).map_err(|_| invalid())?
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FgaError::invalid_parameter("scheme", "apiTokenIssuer"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(DEFAULT_TOKEN_PATH);
    }

    Ok(url)
}
