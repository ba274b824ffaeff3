use crate::models::Credentials;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

/// Service identifiers the two secrets are stored under
pub const ACCESS_TOKEN_SERVICE: &str = "accessToken";
pub const REFRESH_TOKEN_SERVICE: &str = "refreshToken";

/// Errors that can occur while persisting credentials
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse credential file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to encode credential file: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Durable home of the session's two tokens
///
/// Only the gateway writes through this trait.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credentials>, StoreError>;
    async fn store(&self, credentials: &Credentials) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store, gone when the process exits
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: RwLock::new(Some(credentials)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>, StoreError> {
        Ok(self.inner.read().await.clone())
    }

    async fn store(&self, credentials: &Credentials) -> Result<(), StoreError> {
        *self.inner.write().await = Some(credentials.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.inner.write().await = None;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SecretEntry {
    secret: String,
}

/// On-disk layout: one table per service identifier
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(rename = "accessToken", default, skip_serializing_if = "Option::is_none")]
    access_token: Option<SecretEntry>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<SecretEntry>,
}

/// TOML file store, readable only by the owner on unix
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: CredentialFile = toml::from_str(&raw)?;

        Ok(match (file.access_token, file.refresh_token) {
            (Some(access), Some(refresh)) => Some(Credentials::new(access.secret, refresh.secret)),
            (Some(access), None) => Some(Credentials::new(access.secret, String::new())),
            _ => None,
        })
    }

    async fn store(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let file = CredentialFile {
            access_token: Some(SecretEntry {
                secret: credentials.access_token.clone(),
            }),
            refresh_token: Some(SecretEntry {
                secret: credentials.refresh_token.clone(),
            })
            .filter(|e| !e.secret.is_empty()),
        };
        let encoded = toml::to_string(&file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, encoded).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tracing::debug!("Credentials written to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
