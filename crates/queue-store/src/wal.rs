//! Write-ahead-log-backed [`MessageStore`]: every mutation is appended as a
//! length-prefixed, crc32-checked `bincode` frame before the in-memory
//! index is updated, so [`WalStore::recover`] can rebuild the index from
//! the file alone after a restart.
//!
//! One file, no segment rotation or compaction: a long-lived queue with
//! this store backing it grows its WAL forever. Rotation/compaction is a
//! real gap for a production store, left open deliberately here (see
//! `DESIGN.md`) rather than building it unobserved against any real
//! workload shape.

use crate::wal_record::{WalMessage, WalRecord};
use queue_core::{Message, MessageId, MessageStore, RecoveryListener, SingleAck, StoreError, OperationContext, UsageManager};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

pub struct WalStore {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
    cache: Mutex<HashMap<MessageId, Message>>,
    usage: Mutex<Option<Arc<dyn UsageManager>>>,
}

impl WalStore {
    /// Opens (creating if absent) the log at `path`. Does not replay it;
    /// call [`MessageStore::recover`] explicitly during startup, same as
    /// any other store, so the caller controls when the pending cursor
    /// gets rebuilt.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
            cache: Mutex::new(HashMap::new()),
            usage: Mutex::new(None),
        })
    }

    async fn append(&self, record: &WalRecord) -> Result<(), StoreError> {
        let body = bincode::serialize(record).map_err(|e| StoreError::Io(e.to_string()))?;
        let crc = crc32fast::hash(&body);
        let mut file = self.file.lock().await;
        file.write_all(&(body.len() as u32).to_le_bytes())
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(&crc.to_le_bytes())
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(&body).await.map_err(|e| StoreError::Io(e.to_string()))?;
        file.sync_data().await.map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    /// Replays every frame in the file from the start, tolerating a
    /// truncated final frame (a crash mid-write leaves at most one).
    async fn replay(path: &Path) -> Result<Vec<WalRecord>, StoreError> {
        let mut file = match File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        file.seek(SeekFrom::Start(0)).await.map_err(|e| StoreError::Io(e.to_string()))?;
        let mut records = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            if file.read_exact(&mut len_buf).await.is_err() {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if file.read_exact(&mut crc_buf).await.is_err() {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let expected_crc = u32::from_le_bytes(crc_buf);
            let mut body = vec![0u8; len];
            if file.read_exact(&mut body).await.is_err() {
                break;
            }
            if crc32fast::hash(&body) != expected_crc {
                break;
            }
            match bincode::deserialize::<WalRecord>(&body) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
        }
        Ok(records)
    }
}

impl MessageStore for WalStore {
    async fn add_message(&self, _ctx: &OperationContext, msg: &Message) -> Result<(), StoreError> {
        self.append(&WalRecord::Insert(WalMessage::from_message(msg))).await?;
        self.cache.lock().unwrap().insert(msg.id, msg.clone());
        Ok(())
    }

    async fn remove_message(&self, _ctx: &OperationContext, ack: SingleAck) -> Result<(), StoreError> {
        self.append(&WalRecord::Tombstone(ack.0)).await?;
        self.cache.lock().unwrap().remove(&ack.0);
        Ok(())
    }

    async fn remove_all_messages(&self, _ctx: &OperationContext) -> Result<(), StoreError> {
        self.append(&WalRecord::Clear).await?;
        self.cache.lock().unwrap().clear();
        Ok(())
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.cache.lock().unwrap().get(&id).cloned())
    }

    async fn recover(&self, listener: &mut dyn RecoveryListener) -> Result<(), StoreError> {
        let records = Self::replay(&self.path).await?;
        let mut live: HashMap<MessageId, Message> = HashMap::new();
        for record in records {
            match record {
                WalRecord::Insert(wal_msg) => {
                    let msg = wal_msg.into_message();
                    live.insert(msg.id, msg);
                }
                WalRecord::Tombstone(id) => {
                    live.remove(&id);
                }
                WalRecord::Clear => {
                    live.clear();
                }
            }
        }
        let mut messages: Vec<Message> = live.values().cloned().collect();
        messages.sort_by_key(|m| m.id);
        *self.cache.lock().unwrap() = live;
        for msg in messages {
            listener.on_recovered(msg);
        }
        Ok(())
    }

    fn set_usage_manager(&self, usage: Arc<dyn UsageManager>) {
        *self.usage.lock().unwrap() = Some(usage);
    }
}
