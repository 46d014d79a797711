//! Transfer option validation.

use super::TransferOptions;
use crate::error::{Result, TransferError};

/// Validate the options.
pub fn validate(options: &TransferOptions) -> Result<()> {
    if let Some(0) = options.failure_policy.max_consecutive_failures {
        return Err(TransferError::Config(
            "failure_policy.max_consecutive_failures must be at least 1 when set".into(),
        ));
    }

    Ok(())
}
