use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, IVec, Tree};

use crate::error::Result;

/// Handles on every tree the server persists to.
///
/// Keys are big-endian ids, so iteration order is id order. `request_pairs` is
/// keyed by the ordered `(from, to)` pair; `friendships` and `messages` by the
/// normalized [`messenger_common::UserPair`] key, with the message id appended
/// for messages so a prefix scan yields one conversation in creation order.
#[derive(Clone)]
pub struct Store {
    db: Db,
    pub users: Tree,
    pub usernames: Tree,
    pub emails: Tree,
    pub requests: Tree,
    pub request_pairs: Tree,
    pub friendships: Tree,
    pub messages: Tree,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            users: db.open_tree("users")?,
            usernames: db.open_tree("usernames")?,
            emails: db.open_tree("emails")?,
            requests: db.open_tree("requests")?,
            request_pairs: db.open_tree("request_pairs")?,
            friendships: db.open_tree("friendships")?,
            messages: db.open_tree("messages")?,
            db,
        })
    }

    /// Monotonic across restarts; ids handed out later always compare greater.
    pub fn next_id(&self) -> Result<u64> {
        // sled ids start at 0; keep 0 free so no record ever has it.
        Ok(self.db.generate_id()? + 1)
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

pub fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub fn id_from_key(key: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(key.try_into().ok()?))
}

/// Key of a directed pair, used where direction matters (pending requests).
pub fn ordered_pair_key(from: u64, to: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&from.to_be_bytes());
    key[8..].copy_from_slice(&to.to_be_bytes());
    key
}

pub fn encode<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

pub fn decode<T: DeserializeOwned>(bytes: &IVec) -> serde_json::Result<T> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_increasing_and_never_zero() {
        let store = Store::temporary().unwrap();
        let first = store.next_id().unwrap();
        let second = store.next_id().unwrap();
        assert!(first > 0);
        assert!(second > first);
    }

    #[test]
    fn id_keys_round_trip_and_sort() {
        assert_eq!(id_from_key(&id_key(42)), Some(42));
        assert!(id_key(9) < id_key(10));
        assert_eq!(id_from_key(b"short"), None);
    }

    #[test]
    fn ordered_pair_key_keeps_direction() {
        assert_ne!(ordered_pair_key(1, 2), ordered_pair_key(2, 1));
    }
}
