//! Identifier safety for adapters that splice names into query text.

use omnistore_core::{StorageError, StorageResult};

/// Conservative identifier check: `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn is_valid_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate an identifier, failing the operation otherwise.
///
/// Values never go through this path; they are parameter-bound. Only names
/// (tables, columns, predicates, index fields) are spliced, and only after
/// passing here.
pub fn ensure_valid_identifier<'a>(ident: &'a str, kind: &str) -> StorageResult<&'a str> {
    if is_valid_identifier(ident) {
        Ok(ident)
    } else {
        Err(StorageError::Validation(format!(
            "invalid {kind} identifier: {ident}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(is_valid_identifier("users"));
        assert!(is_valid_identifier("_meta"));
        assert!(is_valid_identifier("col_2"));
    }

    #[test]
    fn rejects_injection_shapes() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2col"));
        assert!(!is_valid_identifier("users;drop"));
        assert!(!is_valid_identifier("a-b"));
        assert!(!is_valid_identifier("a.b"));
    }

    #[test]
    fn ensure_returns_validation_error() {
        let err = ensure_valid_identifier("bad name", "column").unwrap_err();
        assert!(err.to_string().contains("column"));
    }
}
