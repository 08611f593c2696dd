//! Where the Drive bearer token comes from.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

pub const TOKEN_ENV: &str = "WARDEN_DRIVE_ACCESS_TOKEN";
/// Path to a file holding the token, for mounted secrets.
pub const TOKEN_FILE_ENV: &str = "WARDEN_DRIVE_ACCESS_TOKEN_FILE";

/// Drive bearer token; never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Surrounding whitespace is stripped; an empty token is `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("failed to read token file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("token file {} is empty", .0.display())]
    EmptyFile(PathBuf),
}

/// Source of the Drive access token.
pub trait VaultProvider: Send + Sync {
    /// `Ok(None)` when no token is configured.
    fn access_token(
        &self,
    ) -> impl Future<Output = Result<Option<AccessToken>, VaultError>> + Send;
}

/// Reads the token from an environment variable, falling back to a file
/// named by a second variable.
#[derive(Debug, Clone)]
pub struct EnvVaultProvider {
    token_var: String,
    file_var: String,
}

impl Default for EnvVaultProvider {
    fn default() -> Self {
        Self {
            token_var: TOKEN_ENV.to_owned(),
            file_var: TOKEN_FILE_ENV.to_owned(),
        }
    }
}

impl EnvVaultProvider {
    #[must_use]
    pub fn new(token_var: impl Into<String>, file_var: impl Into<String>) -> Self {
        Self {
            token_var: token_var.into(),
            file_var: file_var.into(),
        }
    }
}

impl VaultProvider for EnvVaultProvider {
    async fn access_token(&self) -> Result<Option<AccessToken>, VaultError> {
        if let Some(token) = std::env::var(&self.token_var)
            .ok()
            .and_then(|v| AccessToken::parse(&v))
        {
            return Ok(Some(token));
        }

        let Some(path) = std::env::var_os(&self.file_var).map(PathBuf::from) else {
            return Ok(None);
        };
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| VaultError::Read {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "access token read from file");
        AccessToken::parse(&raw)
            .map(Some)
            .ok_or(VaultError::EmptyFile(path))
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    const TOKEN_VAR: &str = "WARDEN_TEST_VAULT_TOKEN";
    const FILE_VAR: &str = "WARDEN_TEST_VAULT_TOKEN_FILE";

    fn vault() -> EnvVaultProvider {
        EnvVaultProvider::new(TOKEN_VAR, FILE_VAR)
    }

    fn clear() {
        unsafe {
            std::env::remove_var(TOKEN_VAR);
            std::env::remove_var(FILE_VAR);
        }
    }

    #[test]
    fn token_is_redacted_and_trimmed() {
        let token = AccessToken::parse("  ya29.token\n").unwrap();
        assert_eq!(format!("{token:?}"), "AccessToken([REDACTED])");
        assert_eq!(token.to_string(), "[REDACTED]");
        assert_eq!(token.expose(), "ya29.token");
        assert!(AccessToken::parse(" \n").is_none());
    }

    #[tokio::test]
    #[serial]
    async fn env_var_wins_over_file() {
        clear();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "from-file").unwrap();
        unsafe {
            std::env::set_var(TOKEN_VAR, "from-env");
            std::env::set_var(FILE_VAR, &path);
        }
        let token = vault().access_token().await.unwrap().unwrap();
        clear();
        assert_eq!(token.expose(), "from-env");
    }

    #[tokio::test]
    #[serial]
    async fn blank_env_var_falls_back_to_file() {
        clear();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "ya29.mounted\n").unwrap();
        unsafe {
            std::env::set_var(TOKEN_VAR, "");
            std::env::set_var(FILE_VAR, &path);
        }
        let token = vault().access_token().await.unwrap().unwrap();
        clear();
        assert_eq!(token.expose(), "ya29.mounted");
    }

    #[tokio::test]
    #[serial]
    async fn unreadable_or_empty_file_is_an_error() {
        clear();
        let dir = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var(FILE_VAR, dir.path().join("missing")) };
        assert!(matches!(
            vault().access_token().await,
            Err(VaultError::Read { .. })
        ));

        let empty = dir.path().join("empty");
        std::fs::write(&empty, "  ").unwrap();
        unsafe { std::env::set_var(FILE_VAR, &empty) };
        let result = vault().access_token().await;
        clear();
        assert!(matches!(result, Err(VaultError::EmptyFile(_))));
    }

    #[tokio::test]
    #[serial]
    async fn nothing_configured_is_none() {
        clear();
        assert!(vault().access_token().await.unwrap().is_none());
    }
}
