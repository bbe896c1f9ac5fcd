use std::path::{Component, Path};

use crate::TransferError;

/// Longest identity accepted from the wire.
const MAX_IDENTITY_LEN: usize = 128;

/// Validates a file identity before it is used as a directory name.
///
/// Identities are ASCII alphanumeric, which rules out separators, `.` and
/// `..` in one check.
pub fn validate_identity(identity: &str) -> Result<(), TransferError> {
    if identity.is_empty() {
        return Err(TransferError::InvalidName("empty identity".into()));
    }
    if identity.len() > MAX_IDENTITY_LEN {
        return Err(TransferError::InvalidName(format!(
            "identity longer than {MAX_IDENTITY_LEN} characters"
        )));
    }
    if !identity.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(TransferError::InvalidName(format!(
            "identity must be ASCII alphanumeric: {identity:?}"
        )));
    }
    Ok(())
}

/// Validates a target filename for the assembled file.
///
/// Rejects:
/// - Empty names
/// - Anything that is not exactly one normal path component
/// - Either path separator, on every platform
/// - Dot-prefixed names (reserved for housekeeping entries)
pub fn validate_filename(filename: &str) -> Result<(), TransferError> {
    if filename.is_empty() {
        return Err(TransferError::InvalidName("empty filename".into()));
    }
    if filename.contains(['/', '\\']) {
        return Err(TransferError::InvalidName(format!(
            "path separators not allowed: {filename}"
        )));
    }
    if filename.starts_with('.') {
        return Err(TransferError::InvalidName(format!(
            "dot-prefixed names are reserved: {filename}"
        )));
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidName(format!(
            "not a plain file name: {filename}"
        ))),
    }
}
