//! Git reference validation.

use crate::{Error, Result};

/// Validate a requested git reference (branch, tag or SHA).
///
/// This is a syntactic check only; whether the reference actually exists in
/// the repository is left to the deploy command itself.
pub fn validate_reference(reference: &str) -> Result<()> {
    if reference.is_empty() {
        return Err(Error::InvalidInput("reference must not be empty".into()));
    }
    if reference.starts_with('-') || reference.starts_with('.') {
        return Err(Error::InvalidInput(format!(
            "reference must not start with '{}'",
            &reference[..1]
        )));
    }
    if reference.contains("..") {
        return Err(Error::InvalidInput(
            "reference must not contain '..'".into(),
        ));
    }
    if let Some(c) = reference
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '/' | '-'))
    {
        return Err(Error::InvalidInput(format!(
            "reference contains invalid character {c:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_branches_tags_and_shas() {
        assert!(validate_reference("main").is_ok());
        assert!(validate_reference("v1.2.3").is_ok());
        assert!(validate_reference("feature/foo-bar").is_ok());
        assert!(validate_reference("abc123def456").is_ok());
    }

    #[test]
    fn rejects_bad_references() {
        assert!(validate_reference("").is_err());
        assert!(validate_reference("-rf").is_err());
        assert!(validate_reference("a..b").is_err());
        assert!(validate_reference("has space").is_err());
        assert!(validate_reference("semi;colon").is_err());
        assert!(validate_reference(".hidden").is_err());
    }
}
