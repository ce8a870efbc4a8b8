/// Key store implementations
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::domain::keys::KeyStore;
use crate::domain::shared::{Result, TelephonyError};

const PRIVATE_KEY_EXT: &str = "pem";
const PASSWORD_EXT: &str = "secret";

/// Process-local key store; keys are lost when the process exits
#[derive(Default)]
pub struct InMemoryKeyStore {
    private_keys: Mutex<HashMap<String, Vec<u8>>>,
    passwords: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn private_key(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let keys = self.private_keys.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys.get(name).cloned())
    }

    fn store_private_key(&self, name: &str, der: &[u8]) -> Result<()> {
        let mut keys = self.private_keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.insert(name.to_string(), der.to_vec());
        Ok(())
    }

    fn password(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let passwords = self.passwords.lock().unwrap_or_else(|e| e.into_inner());
        Ok(passwords.get(name).cloned())
    }

    fn store_password(&self, name: &str, value: &[u8]) -> Result<()> {
        let mut passwords = self.passwords.lock().unwrap_or_else(|e| e.into_inner());
        passwords.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.private_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.passwords
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}

/// Key store persisting one file per entry in a directory.
///
/// Private keys are written as PKCS#8 PEM, passwords as raw bytes.
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            TelephonyError::KeyStore(format!("cannot create {}: {}", dir.display(), e))
        })?;
        info!("Opened key store at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str, ext: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.{}", file, ext))
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TelephonyError::KeyStore(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::write(path, bytes).map_err(|e| {
            TelephonyError::KeyStore(format!("cannot write {}: {}", path.display(), e))
        })
    }
}

impl KeyStore for FileKeyStore {
    fn private_key(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(pem) = self.read(&self.path(name, PRIVATE_KEY_EXT))? else {
            return Ok(None);
        };
        let pem = String::from_utf8(pem)
            .map_err(|e| TelephonyError::KeyStore(format!("private key {} is not PEM: {}", name, e)))?;
        let key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| TelephonyError::KeyStore(format!("private key {}: {}", name, e)))?;
        let der = key
            .to_pkcs8_der()
            .map_err(|e| TelephonyError::KeyStore(format!("private key {}: {}", name, e)))?;
        Ok(Some(der.as_bytes().to_vec()))
    }

    fn store_private_key(&self, name: &str, der: &[u8]) -> Result<()> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| TelephonyError::KeyStore(format!("private key {}: {}", name, e)))?;
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| TelephonyError::KeyStore(format!("private key {}: {}", name, e)))?;
        debug!("Storing private key {}", name);
        self.write(&self.path(name, PRIVATE_KEY_EXT), pem.as_bytes())
    }

    fn password(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.read(&self.path(name, PASSWORD_EXT))
    }

    fn store_password(&self, name: &str, value: &[u8]) -> Result<()> {
        self.write(&self.path(name, PASSWORD_EXT), value)
    }

    fn remove_all(&self) -> Result<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            TelephonyError::KeyStore(format!("cannot list {}: {}", self.dir.display(), e))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            let ours = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == PRIVATE_KEY_EXT || ext == PASSWORD_EXT)
                .unwrap_or(false);
            if ours {
                fs::remove_file(&path).map_err(|e| {
                    TelephonyError::KeyStore(format!("cannot remove {}: {}", path.display(), e))
                })?;
            }
        }
        info!("Removed all keys from {}", self.dir.display());
        Ok(())
    }
}
