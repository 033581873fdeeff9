use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("WOLFRAM_API_KEY environment variable is not set")]
    Missing,
    #[error("WOLFRAM_API_KEY is empty")]
    Empty,
}

/// The Wolfram|Alpha app id.
///
/// Loaded once at startup and immutable afterwards. `Debug` output is
/// redacted and there is no `Display` impl.
#[derive(Debug, Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Validate a raw value from the provisioning source.
    ///
    /// `None` and blank values are both fatal; there is no retry.
    pub fn from_raw(raw: Option<String>) -> Result<Self, CredentialError> {
        let raw = raw.ok_or(CredentialError::Missing)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CredentialError::Empty);
        }

        // App ids are alphanumeric with hyphens; anything else is suspicious but not fatal.
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            tracing::warn!("WOLFRAM_API_KEY contains unexpected characters");
        }

        Ok(Self(SecretString::new(trimmed.to_string())))
    }

    /// Expose the raw value. Only the transport should call this.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_blank_are_rejected() {
        assert_eq!(Credential::from_raw(None).unwrap_err(), CredentialError::Missing);
        assert_eq!(
            Credential::from_raw(Some("  \n".into())).unwrap_err(),
            CredentialError::Empty
        );
    }

    #[test]
    fn debug_output_is_redacted() {
        let cred = Credential::from_raw(Some(" ABCD-1234 ".into())).unwrap();
        assert_eq!(cred.expose(), "ABCD-1234");
        assert!(!format!("{cred:?}").contains("ABCD-1234"));
    }
}
