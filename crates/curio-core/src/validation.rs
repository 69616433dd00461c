//! # Validation Module
//!
//! Draft validation for the Curio engine.
//!
//! Validation runs in the engine facade before a draft touches the local
//! store or the mutation queue, so queued payloads are always replayable.
//! The remote store validates again on replay (defense in depth); anything
//! it rejects for non-connectivity reasons surfaces as a permanent
//! validation error on the queued mutation.
//!
//! ## Usage
//! ```rust
//! use curio_core::types::RecordDraft;
//! use curio_core::validation::validate_draft;
//!
//! let draft = RecordDraft::named("Brass astrolabe");
//! assert!(validate_draft(&draft).is_ok());
//! ```

use crate::error::ValidationError;
use crate::types::{ImageData, RecordDraft};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum record name length.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum description length.
pub const MAX_DESCRIPTION_LEN: usize = 2000;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a record name.
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - Must be at most 200 characters
pub fn validate_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a full draft before it is cached and enqueued.
pub fn validate_draft(draft: &RecordDraft) -> ValidationResult<()> {
    validate_name(&draft.name)?;

    if let Some(ref description) = draft.description {
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::TooLong {
                field: "description".to_string(),
                max: MAX_DESCRIPTION_LEN,
            });
        }
    }

    if !draft.attributes.is_object() {
        return Err(ValidationError::InvalidFormat {
            field: "attributes".to_string(),
            reason: "must be a JSON object".to_string(),
        });
    }

    if let Some(ImageData::Inline { base64 }) = &draft.image {
        if base64.is_empty() {
            return Err(ValidationError::Required {
                field: "image.base64".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_draft() {
        let draft = RecordDraft::named("Sextant");
        assert!(validate_draft(&draft).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn test_long_name_rejected() {
        let name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            validate_name(&name),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_non_object_attributes_rejected() {
        let mut draft = RecordDraft::named("Sextant");
        draft.attributes = serde_json::json!([1, 2, 3]);
        assert!(matches!(
            validate_draft(&draft),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_empty_inline_image_rejected() {
        let mut draft = RecordDraft::named("Sextant");
        draft.image = Some(ImageData::Inline { base64: "".into() });
        assert!(validate_draft(&draft).is_err());
    }
}
