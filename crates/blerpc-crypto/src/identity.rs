//! Trust-on-first-use identity pinning.
//!
//! The central records the peripheral's Ed25519 identity key on the first
//! successful handshake and verifies every later handshake against it.
//! Key rotation is an out-of-band operation: remove the pin, then pair
//! again.

use std::{collections::HashMap, fs, io::Write, path::PathBuf};

use crate::error::{CryptoError, Result};

/// Pinned-identity storage.
///
/// Implementations must persist pins across reconnects; the file-backed
/// store also persists across process restarts.
pub trait IdentityStore: Send {
    /// Identity key pinned for `peer`, if any.
    fn pinned(&self, peer: &str) -> Result<Option<[u8; 32]>>;

    /// Pin `key` for `peer`. Called once, on first successful handshake.
    fn pin(&mut self, peer: &str, key: &[u8; 32]) -> Result<()>;
}

/// In-memory pin store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    pins: HashMap<String, [u8; 32]>,
}

impl IdentityStore for MemoryIdentityStore {
    fn pinned(&self, peer: &str) -> Result<Option<[u8; 32]>> {
        Ok(self.pins.get(peer).copied())
    }

    fn pin(&mut self, peer: &str, key: &[u8; 32]) -> Result<()> {
        self.pins.insert(peer.to_string(), *key);
        Ok(())
    }
}

/// File-backed pin store: one hex-encoded key per peer under `dir`.
///
/// Pin files are created with owner-only permissions (0o600 on Unix) so
/// another local user cannot swap the trusted key.
#[derive(Debug)]
pub struct FileIdentityStore {
    dir: PathBuf,
}

impl FileIdentityStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CryptoError::Store(e.to_string()))?;
        Ok(Self { dir })
    }

    fn pin_path(&self, peer: &str) -> PathBuf {
        // Peer ids come from the channel layer (device addresses); keep
        // only filename-safe characters.
        let safe: String = peer
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.identity"))
    }
}

impl IdentityStore for FileIdentityStore {
    fn pinned(&self, peer: &str) -> Result<Option<[u8; 32]>> {
        let path = self.pin_path(peer);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CryptoError::Store(e.to_string())),
        };

        let corrupt = || CryptoError::Store(format!("corrupt pin file {}", path.display()));
        let bytes = hex::decode(contents.trim()).map_err(|_| corrupt())?;
        let key = <[u8; 32]>::try_from(bytes).map_err(|_| corrupt())?;
        Ok(Some(key))
    }

    fn pin(&mut self, peer: &str, key: &[u8; 32]) -> Result<()> {
        let path = self.pin_path(peer);

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path).map_err(|e| CryptoError::Store(e.to_string()))?;
        file.write_all(hex::encode(key).as_bytes())
            .map_err(|e| CryptoError::Store(e.to_string()))?;
        Ok(())
    }
}
