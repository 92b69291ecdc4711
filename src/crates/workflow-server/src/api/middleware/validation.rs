//! Request validation helpers

use crate::api::error::{ApiError, ApiResult};

/// Reject empty or whitespace-only required fields
pub fn validate_not_empty(value: &str, field_name: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::ValidationError(format!("{} cannot be empty", field_name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(validate_not_empty("g-1", "graph_id").is_ok());
        assert!(validate_not_empty("", "graph_id").is_err());
        assert!(validate_not_empty("  ", "graph_id").is_err());
    }
}
