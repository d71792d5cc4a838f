use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};

/// Reject URLs the transport must not send to: relative URLs, schemes other
/// than http/https, and plain http unless explicitly allowed.
pub(crate) fn validate_uri(uri: &http::Uri, transport: TransportSecurity) -> Result<(), HttpError> {
    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: uri.to_string(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    match uri.scheme_str() {
        Some("https") => Ok(()),
        Some("http") => match transport {
            TransportSecurity::AllowInsecureHttp => Ok(()),
            TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
        },
        Some(scheme) => Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "only http:// and https:// schemes are supported".to_owned(),
        }),
        None => Err(HttpError::InvalidUri {
            url: uri.to_string(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        }),
    }
}
