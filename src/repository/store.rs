use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Conversation, ConversationMessage, ConversationStore};
use crate::utils::{atomic_write, ensure_dir};

/// File-backed conversation store: one JSON document per conversation,
/// written atomically, fronted by an LRU cache. Ids are numeric and
/// allocated from the highest id found on disk at startup.
pub struct FileConversationStore {
    dir: PathBuf,
    cache: Mutex<LruCache<i64, Conversation>>,
    next_id: Mutex<i64>,
    max_messages: usize,
}

impl FileConversationStore {
    pub fn new(dir: PathBuf, max_cached: usize, max_messages: usize) -> Result<Self> {
        let dir = ensure_dir(dir)?;
        let next_id = highest_existing_id(&dir)? + 1;
        let capacity = NonZeroUsize::new(max_cached.max(1)).expect("capacity is at least 1");
        Ok(Self {
            dir,
            cache: Mutex::new(LruCache::new(capacity)),
            next_id: Mutex::new(next_id),
            max_messages,
        })
    }

    fn conversation_path(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read_from_disk(&self, id: i64) -> Result<Option<Conversation>> {
        let path = self.conversation_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read conversation {}", path.display()))?;
        let conversation: Conversation = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse conversation {}", path.display()))?;
        Ok(Some(conversation))
    }

    fn persist(&self, conversation: &Conversation) -> Result<()> {
        let content = serde_json::to_string_pretty(conversation)?;
        atomic_write(&self.conversation_path(conversation.id), &content)
    }
}

fn highest_existing_id(dir: &std::path::Path) -> Result<i64> {
    let mut highest = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix(".json") {
            if let Ok(id) = stem.parse::<i64>() {
                highest = highest.max(id);
            }
        }
    }
    Ok(highest)
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn create(&self, title: &str) -> Result<i64> {
        let id = {
            let mut next = self.next_id.lock().await;
            let id = *next;
            *next += 1;
            id
        };
        let conversation = Conversation::new(id, title);
        self.persist(&conversation)?;
        self.cache.lock().await.put(id, conversation);
        debug!(conversation_id = id, "created conversation");
        Ok(id)
    }

    async fn append_message(
        &self,
        conversation_id: i64,
        message: ConversationMessage,
    ) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let mut conversation = match cache.pop(&conversation_id) {
            Some(c) => c,
            None => self
                .read_from_disk(conversation_id)?
                .with_context(|| format!("Conversation {conversation_id} does not exist"))?,
        };

        conversation.messages.push(message);
        conversation.updated_at = Utc::now();

        // Prune oldest messages
        if conversation.messages.len() > self.max_messages {
            let drain_count = conversation.messages.len() - self.max_messages;
            conversation.messages.drain(..drain_count);
        }

        self.persist(&conversation)?;
        cache.put(conversation_id, conversation);
        Ok(())
    }

    async fn load(&self, conversation_id: i64) -> Result<Option<Conversation>> {
        if let Some(conversation) = self.cache.lock().await.get(&conversation_id) {
            return Ok(Some(conversation.clone()));
        }
        let loaded = self.read_from_disk(conversation_id)?;
        if let Some(ref conversation) = loaded {
            self.cache
                .lock()
                .await
                .put(conversation_id, conversation.clone());
        }
        Ok(loaded)
    }
}
