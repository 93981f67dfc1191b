use crate::error::DalError;

/// Validates `ident` against `^[A-Za-z_][A-Za-z0-9_]*$` and returns it
/// double-quoted. Anything else is rejected before it can reach a query
/// string; values never go through this path, they are always bound.
pub fn quote_ident(ident: &str) -> Result<String, DalError> {
    let mut chars = ident.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(DalError::UnsafeIdentifier {
            identifier: ident.to_string(),
        });
    }
    Ok(format!("\"{ident}\""))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert_eq!(quote_ident("audit_logs").unwrap(), "\"audit_logs\"");
        assert_eq!(quote_ident("_private").unwrap(), "\"_private\"");
        assert_eq!(quote_ident("t2").unwrap(), "\"t2\"");
    }

    #[test]
    fn rejects_injection_attempts() {
        for bad in [
            "",
            "2table",
            "audit logs",
            "audit\"logs",
            "audit;DROP TABLE users",
            "schéma",
            "a-b",
        ] {
            assert_matches!(quote_ident(bad), Err(DalError::UnsafeIdentifier { .. }), "{bad}");
        }
    }
}
