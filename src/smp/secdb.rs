use std::fmt::Debug;
use std::io;

use parking_lot::Mutex;

use blep_crypto::Key;

use crate::le::Addr;

/// Long Term Key distributed to or derived with a peer
/// ([Vol 3] Part H, Section 2.4.2).
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LongTermKey {
    /// Peer identity address.
    pub peer: Addr,
    /// Whether the key was generated with MITM protection.
    pub authenticated: bool,
    /// Whether the local device was the central.
    pub central: bool,
    /// Encrypted Diversifier.
    pub ediv: u16,
    /// Random Number.
    pub rand: u64,
    pub key: Key,
}

/// Interface to Long Term Key storage.
pub trait Keyring: Debug + Send + Sync {
    /// Saves a key, replacing any existing key for the same peer.
    fn store(&self, k: &LongTermKey) -> io::Result<()>;

    /// Loads the key identified by `ediv` and `rand` for a peer.
    fn load(&self, peer: Addr, ediv: u16, rand: u64) -> io::Result<Option<Key>>;
}

/// Keyring that is lost when dropped.
#[derive(Debug, Default)]
pub struct MemKeyring(Mutex<Vec<LongTermKey>>);

impl MemKeyring {
    /// Creates an empty keyring.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Returns whether the keyring is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl Keyring for MemKeyring {
    fn store(&self, k: &LongTermKey) -> io::Result<()> {
        let mut v = self.0.lock();
        v.retain(|old| old.peer != k.peer);
        v.push(k.clone());
        Ok(())
    }

    fn load(&self, peer: Addr, ediv: u16, rand: u64) -> io::Result<Option<Key>> {
        Ok((self.0.lock().iter())
            .find(|k| k.peer == peer && k.ediv == ediv && k.rand == rand)
            .map(|k| k.key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use crate::le::RawAddr;

    use super::*;

    #[test]
    fn mem_keyring() {
        let peer = Addr::Random(RawAddr::from_le_bytes([1, 2, 3, 4, 5, 6]));
        let mut k = LongTermKey {
            peer,
            authenticated: false,
            central: false,
            ediv: 0,
            rand: 0,
            key: Key::new(1),
        };
        let kr = MemKeyring::new();
        kr.store(&k).unwrap();
        k.ediv = 7;
        k.key = Key::new(2);
        kr.store(&k).unwrap();
        assert_eq!(kr.len(), 1);
        assert_eq!(kr.load(peer, 0, 0).unwrap(), None);
        assert_eq!(kr.load(peer, 7, 0).unwrap(), Some(Key::new(2)));
        assert_eq!(kr.load(Addr::default(), 7, 0).unwrap(), None);
    }
}
