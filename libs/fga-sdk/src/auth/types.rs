use fga_utils::SecretString;
use serde::{Deserialize, Deserializer};

/// Token endpoint response (client-credentials grant).
///
/// `Deserialize`-only so the access token cannot be serialized by accident.
/// Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(deserialize_with = "non_blank")]
    pub access_token: SecretString,
    /// Seconds from now. Absent means the token does not expire.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

fn non_blank<'de, D>(d: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let value = SecretString::deserialize(d)?;
    if value.is_blank() {
        return Err(serde::de::Error::custom("access_token is empty"));
    }
    Ok(value)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_response() {
        let json = r#"{"access_token":"tok","expires_in":3600,"token_type":"Bearer"}"#;
        let r: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(r.access_token.expose(), "tok");
        assert_eq!(r.expires_in, Some(3600));
        assert_eq!(r.token_type.as_deref(), Some("Bearer"));
    }

    #[test]
    fn deserialize_minimal_response() {
        let r: TokenResponse = serde_json::from_str(r#"{"access_token":"tok","scope":"x"}"#).unwrap();
        assert_eq!(r.expires_in, None);
        assert_eq!(r.token_type, None);
    }

    #[test]
    fn empty_or_missing_token_is_rejected() {
        assert!(serde_json::from_str::<TokenResponse>(r#"{"access_token":"  "}"#).is_err());
        assert!(serde_json::from_str::<TokenResponse>(r#"{"expires_in":60}"#).is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let r: TokenResponse = serde_json::from_str(r#"{"access_token":"tok-secret"}"#).unwrap();
        assert!(!format!("{r:?}").contains("tok-secret"));
    }
}
