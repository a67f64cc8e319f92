use std::path::{Component, Path};

use crate::error::{Result, TransferError};

/// Validates that `value` is exactly one plain path component.
///
/// Session ids, file names, bucket names and object keys all end up joined
/// onto a root directory, so each must stay inside it. Rejects:
/// - Empty values
/// - Absolute paths and Windows prefixes (`C:`, `\\server`)
/// - Parent (`..`) and current (`.`) directory references
/// - Anything containing a separator
pub fn validate_path_component(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(TransferError::validation_error_with_field("value cannot be empty", field));
    }

    if value.contains('/') || value.contains('\\') || value.contains('\0') {
        return Err(TransferError::validation_error_with_field(
            format!("path separators not allowed: {value}"),
            field,
        ));
    }

    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::validation_error_with_field(
            format!("parent directory traversal not allowed: {value}"),
            field,
        )),
        _ => Err(TransferError::validation_error_with_field(
            format!("not a plain file name: {value}"),
            field,
        )),
    }
}
