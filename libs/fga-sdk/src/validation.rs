use crate::error::FgaError;

/// Reject a missing or blank required argument before any I/O.
///
/// # Errors
/// `InvalidParameter { param, context }`.
pub fn assert_param_exists(value: Option<&str>, param: &str, context: &str) -> Result<(), FgaError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(FgaError::invalid_parameter(param, context)),
    }
}
