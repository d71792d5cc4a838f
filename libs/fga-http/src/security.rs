//! Limits applied when reading untrusted response bodies.

/// Maximum number of body bytes kept when a non-2xx response is turned into
/// an error (8KB).
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;
