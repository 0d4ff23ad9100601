use crate::core::cache::KeyValueCollection;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Entries are stored as an 8 byte big-endian expiry (seconds since the
/// epoch, zero for none) followed by the value.
const EXPIRY_LEN: usize = 8;

fn encode_entry(value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
    let expires_at = ttl
        .map(|d| SystemTime::now() + d)
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs().max(1));
    let mut entry = Vec::with_capacity(EXPIRY_LEN + value.len());
    entry.extend_from_slice(&expires_at.to_be_bytes());
    entry.extend_from_slice(value);
    entry
}

fn decode_entry(entry: &[u8]) -> Result<(Option<SystemTime>, &[u8])> {
    if entry.len() < EXPIRY_LEN {
        return Err(anyhow!("Truncated cache entry of {} bytes", entry.len()));
    }
    let (header, value) = entry.split_at(EXPIRY_LEN);
    let mut secs = [0u8; EXPIRY_LEN];
    secs.copy_from_slice(header);
    let expires_at = match u64::from_be_bytes(secs) {
        0 => None,
        secs => Some(UNIX_EPOCH + Duration::from_secs(secs)),
    };
    Ok((expires_at, value))
}

/// Collection persisted in a fjall partition. Holds on to the keyspace so
/// the partition stays usable after the store that opened it is dropped.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Keyspace, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let key_str = String::from_utf8_lossy(key);
        let res: Result<Option<Vec<u8>>> = (|| {
            let Some(entry) = self.partition.get(key)? else {
                debug!("Cache MISS for key: {}", key_str);
                return Ok(None);
            };
            let (expires_at, value) = decode_entry(&entry)?;
            if expires_at.is_some_and(|t| SystemTime::now() > t) {
                debug!("Cache entry expired for key: {}", key_str);
                self.partition.remove(key)?;
                return Ok(None);
            }
            debug!("Cache HIT for key: {}", key_str);
            Ok(Some(value.to_vec()))
        })();

        match res {
            Ok(val) => val,
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        let entry = encode_entry(value, ttl);
        let res = self
            .partition
            .insert(key, entry)
            .and_then(|()| self.keyspace.persist(PersistMode::Buffer));
        match res {
            Ok(()) => debug!("Cache PUT for key: {}", String::from_utf8_lossy(key)),
            Err(e) => debug!("DiskCollection put error: {}", e),
        }
    }

    async fn remove(&self, key: &[u8]) {
        if let Err(e) = self.partition.remove(key) {
            debug!("DiskCollection remove error: {}", e);
        }
    }
}
