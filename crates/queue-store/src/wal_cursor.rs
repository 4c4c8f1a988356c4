//! A disk-backed [`PendingCursor`]: every add/remove is appended to a log
//! file synchronously (blocking, on local disk this is fast) before the
//! in-memory backlog changes, so [`WalCursor::start`] can rebuild the
//! backlog by replaying the file after a restart.
//!
//! `PendingCursor` methods other than `start` are synchronous by contract
//! (see `queue-core::cursor`). This cursor keeps the whole backlog
//! resident in memory and treats the file purely as the durability layer
//! underneath it, rather than streaming from disk on every call.

use crate::wal_record::{WalMessage, WalRecord};
use queue_core::{CursorError, Message, MessageId, PendingCursor};
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;

struct CursorState {
    items: VecDeque<Message>,
    position: usize,
    last_yielded: Option<(usize, MessageId)>,
}

pub struct WalCursor {
    path: PathBuf,
    file: Mutex<File>,
    state: Mutex<CursorState>,
}

impl WalCursor {
    /// Opens (creating if absent) the log at `path`. Does not replay it;
    /// call `start()` explicitly, same as any other cursor, so the caller
    /// controls when the backlog gets rebuilt.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CursorError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| CursorError::Fatal(e.to_string()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            state: Mutex::new(CursorState {
                items: VecDeque::new(),
                position: 0,
                last_yielded: None,
            }),
        })
    }

    fn append_record(&self, record: &WalRecord) -> Result<(), CursorError> {
        let body = bincode::serialize(record).map_err(|e| CursorError::Fatal(e.to_string()))?;
        let crc = crc32fast::hash(&body);
        let mut file = self.file.lock().unwrap();
        file.write_all(&(body.len() as u32).to_le_bytes())
            .map_err(|e| CursorError::Transient(e.to_string()))?;
        file.write_all(&crc.to_le_bytes()).map_err(|e| CursorError::Transient(e.to_string()))?;
        file.write_all(&body).map_err(|e| CursorError::Transient(e.to_string()))?;
        file.sync_data().map_err(|e| CursorError::Transient(e.to_string()))?;
        Ok(())
    }

    /// Tolerates a truncated final frame (a crash mid-write leaves at most
    /// one) the same way `WalStore::replay` does.
    fn replay(path: &Path) -> Result<VecDeque<Message>, CursorError> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VecDeque::new()),
            Err(e) => return Err(CursorError::Fatal(e.to_string())),
        };
        let mut order: Vec<MessageId> = Vec::new();
        let mut live: HashMap<MessageId, Message> = HashMap::new();
        loop {
            let mut len_buf = [0u8; 4];
            if file.read_exact(&mut len_buf).is_err() {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if file.read_exact(&mut crc_buf).is_err() {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let expected_crc = u32::from_le_bytes(crc_buf);
            let mut body = vec![0u8; len];
            if file.read_exact(&mut body).is_err() {
                break;
            }
            if crc32fast::hash(&body) != expected_crc {
                break;
            }
            let record: WalRecord = match bincode::deserialize(&body) {
                Ok(r) => r,
                Err(_) => break,
            };
            match record {
                WalRecord::Insert(wal_msg) => {
                    let msg = wal_msg.into_message();
                    if !live.contains_key(&msg.id) {
                        order.push(msg.id);
                    }
                    live.insert(msg.id, msg);
                }
                WalRecord::Tombstone(id) => {
                    live.remove(&id);
                }
                WalRecord::Clear => {
                    live.clear();
                    order.clear();
                }
            }
        }
        Ok(order.into_iter().filter_map(|id| live.remove(&id)).collect())
    }
}

impl PendingCursor for WalCursor {
    fn start(&self) -> Pin<Box<dyn Future<Output = Result<(), CursorError>> + Send + '_>> {
        Box::pin(async move {
            let path = self.path.clone();
            let items = tokio::task::spawn_blocking(move || Self::replay(&path))
                .await
                .map_err(|e| CursorError::Fatal(e.to_string()))??;
            let mut state = self.state.lock().unwrap();
            state.items = items;
            state.position = 0;
            state.last_yielded = None;
            Ok(())
        })
    }

    fn is_recovery_required(&self) -> bool {
        true
    }

    fn add_message_last(&self, msg: Message) -> Result<(), CursorError> {
        self.append_record(&WalRecord::Insert(WalMessage::from_message(&msg)))?;
        self.state.lock().unwrap().items.push_back(msg);
        Ok(())
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.position = 0;
        state.last_yielded = None;
    }

    fn has_next(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.position < state.items.len()
    }

    fn next(&self) -> Option<Message> {
        let mut state = self.state.lock().unwrap();
        if state.position >= state.items.len() {
            return None;
        }
        let msg = state.items[state.position].clone();
        state.last_yielded = Some((state.position, msg.id));
        state.position += 1;
        Some(msg)
    }

    fn remove(&self) {
        let removed_id = {
            let mut state = self.state.lock().unwrap();
            let Some((idx, id)) = state.last_yielded.take() else { return };
            state.items.remove(idx);
            if state.position > idx {
                state.position -= 1;
            }
            id
        };
        // Best-effort: a tombstone write failure here leaves the record on
        // disk to be replayed again after a crash, re-delivering a message
        // that was already removed in memory. Acceptable for a backlog
        // cursor under an at-least-once contract; logged by the caller.
        let _ = self.append_record(&WalRecord::Tombstone(removed_id));
    }

    fn size(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64) -> Message {
        Message::new(id, "x")
    }

    #[tokio::test]
    async fn start_replays_empty_backlog_for_a_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = WalCursor::open(dir.path().join("cursor.wal")).unwrap();
        cursor.start().await.unwrap();
        assert_eq!(cursor.size(), 0);
    }

    #[tokio::test]
    async fn restart_recovers_undelivered_backlog_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.wal");
        {
            let cursor = WalCursor::open(&path).unwrap();
            cursor.start().await.unwrap();
            cursor.add_message_last(msg(1)).unwrap();
            cursor.add_message_last(msg(2)).unwrap();
            cursor.add_message_last(msg(3)).unwrap();
            cursor.reset();
            assert_eq!(cursor.next().map(|m| m.id), Some(1));
            cursor.remove();
        }
        let cursor = WalCursor::open(&path).unwrap();
        cursor.start().await.unwrap();
        assert!(cursor.is_recovery_required());
        cursor.reset();
        let mut seen = Vec::new();
        while cursor.has_next() {
            let Some(m) = cursor.next() else { break };
            seen.push(m.id);
        }
        assert_eq!(seen, vec![2, 3]);
    }
}
