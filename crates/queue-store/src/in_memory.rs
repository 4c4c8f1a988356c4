//! A volatile `MessageStore`: durable in name only, useful for tests and
//! for queues explicitly configured without persistence.

use queue_core::{Message, MessageId, MessageStore, RecoveryListener, SingleAck, StoreError, OperationContext, UsageManager};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct InMemoryStore {
    messages: Mutex<HashMap<MessageId, Message>>,
    usage: Mutex<Option<Arc<dyn UsageManager>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            usage: Mutex::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for InMemoryStore {
    async fn add_message(&self, _ctx: &OperationContext, msg: &Message) -> Result<(), StoreError> {
        self.messages.lock().unwrap().insert(msg.id, msg.clone());
        Ok(())
    }

    async fn remove_message(&self, _ctx: &OperationContext, ack: SingleAck) -> Result<(), StoreError> {
        self.messages.lock().unwrap().remove(&ack.0);
        Ok(())
    }

    async fn remove_all_messages(&self, _ctx: &OperationContext) -> Result<(), StoreError> {
        self.messages.lock().unwrap().clear();
        Ok(())
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.lock().unwrap().get(&id).cloned())
    }

    /// Replays whatever is currently resident. Meaningful only when the
    /// owning component (not the process) is restarting; a real process
    /// restart loses everything, since this store keeps no on-disk copy.
    async fn recover(&self, listener: &mut dyn RecoveryListener) -> Result<(), StoreError> {
        let mut messages: Vec<Message> = self.messages.lock().unwrap().values().cloned().collect();
        messages.sort_by_key(|m| m.id);
        for msg in messages {
            listener.on_recovered(msg);
        }
        Ok(())
    }

    fn set_usage_manager(&self, usage: Arc<dyn UsageManager>) {
        *self.usage.lock().unwrap() = Some(usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    struct Collect(Vec<Message>);
    impl RecoveryListener for Collect {
        fn on_recovered(&mut self, msg: Message) {
            self.0.push(msg);
        }
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let store = InMemoryStore::new();
        let msg = Message::new(1, Bytes::from_static(b"hello"));
        store.add_message(&OperationContext::none(), &msg).await.unwrap();
        let fetched = store.get_message(1).await.unwrap();
        assert_eq!(fetched.unwrap().payload, msg.payload);
    }

    #[tokio::test]
    async fn remove_then_get_returns_none() {
        let store = InMemoryStore::new();
        let msg = Message::new(1, "x");
        store.add_message(&OperationContext::none(), &msg).await.unwrap();
        store.remove_message(&OperationContext::none(), SingleAck(1)).await.unwrap();
        assert!(store.get_message(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recover_replays_in_id_order() {
        let store = InMemoryStore::new();
        store.add_message(&OperationContext::none(), &Message::new(2, "b")).await.unwrap();
        store.add_message(&OperationContext::none(), &Message::new(1, "a")).await.unwrap();
        let mut collect = Collect(Vec::new());
        store.recover(&mut collect).await.unwrap();
        assert_eq!(collect.0.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 2]);
    }
}
