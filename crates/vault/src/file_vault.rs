//! Software root-key vault backed by a single key file.
//!
//! The file holds the base64-encoded root key and is created with mode 0600.
//! Intended for hosts without an OS keychain (CI, containers, headless boxes).

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    tokio::{io::AsyncWriteExt, sync::OnceCell},
    zeroize::Zeroizing,
};

use crate::{
    encoding,
    error::VaultError,
    key_wrap::RootKey,
    traits::{KeyVault, Sealed},
};

pub struct FileKeyVault {
    path: PathBuf,
    root: OnceCell<RootKey>,
}

impl FileKeyVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn root_key(&self) -> Result<&RootKey, VaultError> {
        self.root
            .get_or_try_init(|| load_or_create(&self.path))
            .await
    }
}

async fn load_or_create(path: &Path) -> Result<RootKey, VaultError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let bytes = Zeroizing::new(encoding::decode(contents.trim()).map_err(|_| {
                VaultError::VaultUnavailable(format!(
                    "root key file {} is not valid base64",
                    path.display()
                ))
            })?);
            let key = RootKey::from_slice(&bytes)?;

            #[cfg(feature = "tracing")]
            tracing::info!(path = %path.display(), "loaded root key from file");

            Ok(key)
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let key = RootKey::generate();
            write_key_file(path, &key).await?;

            #[cfg(feature = "tracing")]
            tracing::info!(path = %path.display(), "created root key file");

            Ok(key)
        },
        Err(e) => Err(unavailable(path, e)),
    }
}

async fn write_key_file(path: &Path, key: &RootKey) -> Result<(), VaultError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| unavailable(parent, e))?;
    }

    // Created 0600 beside the target, then renamed: the key file is never partial.
    let tmp = temp_path(path);
    match tokio::fs::remove_file(&tmp).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(unavailable(&tmp, e)),
        _ => {},
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let encoded = Zeroizing::new(encoding::encode(key.persisted_bytes()));
    let mut file = options.open(&tmp).await.map_err(|e| unavailable(&tmp, e))?;
    file.write_all(encoded.as_bytes())
        .await
        .map_err(|e| unavailable(&tmp, e))?;
    file.sync_all().await.map_err(|e| unavailable(&tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| unavailable(path, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn unavailable(path: &Path, e: std::io::Error) -> VaultError {
    VaultError::VaultUnavailable(format!("{}: {e}", path.display()))
}

#[async_trait]
impl KeyVault for FileKeyVault {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn ensure_root_key(&self) -> Result<(), VaultError> {
        self.root_key().await.map(|_| ())
    }

    async fn wrap(&self, plaintext: &[u8]) -> Result<Sealed, VaultError> {
        self.root_key().await?.wrap(plaintext)
    }

    async fn unwrap(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        self.root_key().await?.unwrap(ciphertext, nonce)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_key_file_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("keys").join("root.key");

        let vault = FileKeyVault::new(&path);
        vault.ensure_root_key().await.unwrap();
        assert!(path.exists());
        let first = std::fs::read_to_string(&path).unwrap();

        vault.ensure_root_key().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("root.key");
        FileKeyVault::new(&path).ensure_root_key().await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn leftover_temp_file_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("root.key");
        // What an interrupted write leaves behind.
        std::fs::write(temp_path(&path), "trunc").unwrap();

        let sealed = FileKeyVault::new(&path).wrap(b"dek").await.unwrap();

        assert!(!temp_path(&path).exists());
        let reopened = FileKeyVault::new(&path);
        let opened = reopened
            .unwrap(&sealed.ciphertext, &sealed.nonce)
            .await
            .unwrap();
        assert_eq!(opened.as_slice(), b"dek");
    }

    #[tokio::test]
    async fn survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("root.key");

        let sealed = FileKeyVault::new(&path).wrap(b"dek").await.unwrap();

        // A second instance stands in for the next process start.
        let reopened = FileKeyVault::new(&path);
        let opened = reopened
            .unwrap(&sealed.ciphertext, &sealed.nonce)
            .await
            .unwrap();
        assert_eq!(opened.as_slice(), b"dek");
    }

    #[tokio::test]
    async fn garbage_key_file_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("root.key");
        std::fs::write(&path, "definitely not a key").unwrap();

        let result = FileKeyVault::new(&path).ensure_root_key().await;
        assert!(matches!(result, Err(VaultError::VaultUnavailable(_))));
    }

    #[tokio::test]
    async fn unreachable_location_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file cannot be used as a parent directory.
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let vault = FileKeyVault::new(blocker.join("root.key"));
        let result = vault.ensure_root_key().await;
        assert!(matches!(result, Err(VaultError::VaultUnavailable(_))));
    }
}
