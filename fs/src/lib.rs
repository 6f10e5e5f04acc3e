//! File system storage backend for blep Long Term Keys.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, io};

use tracing::{debug, error};

use blep::le::Addr;
use blep::smp::{Keyring, LongTermKey};
use blep_crypto::Key;

/// Long Term Key storage with one JSON file per peer in a file system
/// directory.
#[derive(Clone, Debug)]
#[repr(transparent)]
pub struct KeyStore(PathBuf);

impl KeyStore {
    const NAME: &'static str = "keys";

    /// Opens a key store in the specified root directory. The directory is
    /// created when the first key is saved.
    #[inline(always)]
    #[must_use]
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self(root.as_ref().join(Self::NAME))
    }

    /// Opens a key store in the current user's local data directory. Returns
    /// `None` if the user directory cannot be determined.
    #[must_use]
    pub fn per_user(app: impl AsRef<Path>) -> Option<Self> {
        Some(Self::open(dirs::data_local_dir()?.join(app.as_ref())))
    }

    /// Returns the store directory.
    #[inline(always)]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.0
    }

    /// Removes the key for the specified peer.
    pub fn remove(&self, peer: Addr) -> io::Result<()> {
        match fs::remove_file(self.path(peer)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Removes all keys.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.0) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Returns the key file path for the specified peer address.
    fn path(&self, peer: Addr) -> PathBuf {
        let (typ, raw) = match peer {
            Addr::Public(ref raw) => ('P', raw.as_le_bytes()),
            Addr::Random(ref raw) => ('R', raw.as_le_bytes()),
        };
        let name = format!(
            "{typ}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}.json",
            raw[5], raw[4], raw[3], raw[2], raw[1], raw[0]
        );
        self.0.join(name)
    }
}

impl Keyring for KeyStore {
    fn store(&self, k: &LongTermKey) -> io::Result<()> {
        let s = serde_json::to_string_pretty(k)?;
        fs::create_dir_all(&self.0)?;
        let path = self.path(k.peer);
        let tmp = path.with_extension("tmp");
        let r = fs::File::create(&tmp)
            .and_then(|mut f| f.write_all(s.as_bytes()).and_then(|_| f.sync_data()))
            .and_then(|_| fs::rename(&tmp, &path));
        match r {
            Ok(()) => debug!("Wrote: {}", path.display()),
            Err(ref e) => error!("Failed to write: {} ({e})", path.display()),
        }
        r
    }

    fn load(&self, peer: Addr, ediv: u16, rand: u64) -> io::Result<Option<Key>> {
        let path = self.path(peer);
        let s = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let k: LongTermKey = serde_json::from_str(&s).map_err(|e| {
            error!("Invalid file contents: {} ({e})", path.display());
            io::Error::from(e)
        })?;
        Ok((k.peer == peer && k.ediv == ediv && k.rand == rand).then_some(k.key))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::Builder;

    use blep::le::RawAddr;

    use super::*;

    const PEER: Addr = Addr::Public(RawAddr::from_le_bytes([0x55, 0x44, 0x33, 0x22, 0x11, 0x00]));

    fn ltk(ediv: u16, key: u128) -> LongTermKey {
        LongTermKey {
            peer: PEER,
            authenticated: false,
            central: false,
            ediv,
            rand: 0x0102_0304_0506_0708,
            key: Key::new(key),
        }
    }

    #[test]
    fn store_load() {
        let tmp = (Builder::new().prefix("blep-test-")).tempdir().unwrap();
        let ks = KeyStore::open(tmp.path());
        assert_eq!(ks.load(PEER, 1, 0x0102_0304_0506_0708).unwrap(), None);

        ks.store(&ltk(1, 0xAA)).unwrap();
        assert!(ks.dir().join("P-001122334455.json").exists());
        assert_eq!(
            ks.load(PEER, 1, 0x0102_0304_0506_0708).unwrap(),
            Some(Key::new(0xAA))
        );
        assert_eq!(ks.load(PEER, 2, 0x0102_0304_0506_0708).unwrap(), None);

        // One key per peer
        ks.store(&ltk(2, 0xBB)).unwrap();
        assert_eq!(ks.load(PEER, 1, 0x0102_0304_0506_0708).unwrap(), None);
        assert_eq!(
            ks.load(PEER, 2, 0x0102_0304_0506_0708).unwrap(),
            Some(Key::new(0xBB))
        );

        ks.remove(PEER).unwrap();
        ks.remove(PEER).unwrap();
        assert_eq!(ks.load(PEER, 2, 0x0102_0304_0506_0708).unwrap(), None);
        ks.clear().unwrap();
        assert!(!ks.dir().exists());
    }

    #[test]
    fn invalid() {
        let tmp = (Builder::new().prefix("blep-test-")).tempdir().unwrap();
        let ks = KeyStore::open(tmp.path());
        fs::create_dir_all(ks.dir()).unwrap();
        fs::write(ks.dir().join("P-001122334455.json"), "{").unwrap();
        assert_eq!(
            ks.load(PEER, 0, 0).unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }
}
