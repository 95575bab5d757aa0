use tracing::{debug, warn};

use crate::core::message::{Message, MessagePatch};
use crate::core::storage::{SnapshotStorage, HISTORY_STORAGE_KEY};

/// Authoritative message sequence, mirrored to a [`SnapshotStorage`].
///
/// Mutators only touch memory and mark the store dirty; [`commit`] writes the
/// whole sequence. A commit with nothing changed since the last load or write
/// is skipped, so freshly hydrated history is never written back to itself.
///
/// [`commit`]: ConversationStore::commit
pub struct ConversationStore {
    messages: Vec<Message>,
    storage: Box<dyn SnapshotStorage>,
    dirty: bool,
    unsynced: bool,
}

impl ConversationStore {
    /// Hydrate from storage. Missing, unreadable, malformed, or empty
    /// snapshots all start an empty conversation.
    pub fn load(storage: Box<dyn SnapshotStorage>) -> Self {
        let messages = match storage.read(HISTORY_STORAGE_KEY) {
            Ok(Some(blob)) => parse_snapshot(&blob),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "History recovery failed; starting empty");
                Vec::new()
            }
        };
        debug!(count = messages.len(), "Conversation hydrated");

        Self {
            messages,
            storage,
            dirty: false,
            unsynced: false,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Append at the end. A message whose id is already present is rejected.
    pub fn append(&mut self, message: Message) -> bool {
        if self.contains_id(&message.id) {
            warn!(message_id = %message.id, "Refusing to append duplicate message id");
            return false;
        }
        self.messages.push(message);
        self.dirty = true;
        true
    }

    /// Apply `patch` to the message with `id`. Returns false if none exists.
    pub fn replace(&mut self, id: &str, patch: MessagePatch) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                patch.apply(message);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Drop every message matching `predicate`, keeping the rest in order.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Message) -> bool,
    {
        let before = self.messages.len();
        self.messages.retain(|m| !predicate(m));
        let removed = before - self.messages.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Mark images whose turn ended without a result (the process exited
    /// mid-request) as failed. Returns how many were settled.
    pub fn settle_interrupted_images(&mut self) -> usize {
        let stale: Vec<String> = self
            .messages
            .iter()
            .filter(|m| m.is_generating_image())
            .map(|m| m.id.clone())
            .collect();
        for id in &stale {
            warn!(message_id = %id, "Settling image left generating by a previous session");
            self.replace(id, MessagePatch::image_settled(None));
        }
        stale.len()
    }

    /// Write the full snapshot if anything changed since the last synced
    /// write. Failures are logged; the in-memory state stays authoritative.
    pub fn commit(&mut self) {
        self.write_snapshot(true);
    }

    /// [`commit`](Self::commit) without forcing the write to disk, for
    /// per-chunk streaming updates. The turn's closing commit syncs.
    pub fn commit_unsynced(&mut self) {
        self.write_snapshot(false);
    }

    fn write_snapshot(&mut self, sync: bool) {
        if !self.dirty && !(sync && self.unsynced) {
            debug!("Skipping commit; conversation unchanged");
            return;
        }

        let blob = match serde_json::to_string(&self.messages) {
            Ok(blob) => blob,
            Err(err) => {
                warn!(error = %err, "Failed to serialize conversation");
                return;
            }
        };
        let written = if sync {
            self.storage.write(HISTORY_STORAGE_KEY, &blob)
        } else {
            self.storage.write_unsynced(HISTORY_STORAGE_KEY, &blob)
        };
        match written {
            Ok(()) => {
                self.dirty = false;
                self.unsynced = !sync;
            }
            Err(err) => warn!(error = %err, "Failed to persist conversation"),
        }
    }

    /// Clear memory and the persisted snapshot, then seed `greeting` and
    /// commit it.
    pub fn purge(&mut self, greeting: Message) {
        self.messages.clear();
        if let Err(err) = self.storage.remove(HISTORY_STORAGE_KEY) {
            warn!(error = %err, "Failed to remove persisted conversation");
        }
        self.messages.push(greeting);
        self.dirty = true;
        self.commit();
    }
}

fn parse_snapshot(blob: &str) -> Vec<Message> {
    if blob.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Message>>(blob) {
        Ok(messages) => dedup_ids(messages),
        Err(err) => {
            warn!(error = %err, "History recovery failed; snapshot is malformed");
            Vec::new()
        }
    }
}

fn dedup_ids(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = std::collections::HashSet::new();
    messages
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{greeting_text, GroundingSource, MessageRole, IMAGE_FAILURE_NOTICE};
    use crate::core::storage::MemorySnapshotStorage;

    fn message(id: &str, content: &str) -> Message {
        let mut message = Message::user(id, content);
        message.timestamp = 1;
        message
    }

    #[test]
    fn malformed_or_empty_snapshots_load_as_empty() {
        for blob in ["not json", "", "{\"a\":1}", "[]"] {
            let storage = MemorySnapshotStorage::with_blob(HISTORY_STORAGE_KEY, blob);
            let store = ConversationStore::load(Box::new(storage));
            assert!(store.is_empty(), "blob {blob:?} should load empty");
        }
    }

    #[test]
    fn commit_is_skipped_until_something_changes() {
        let storage = MemorySnapshotStorage::new();
        let mut store = ConversationStore::load(Box::new(storage.clone()));

        store.commit();
        assert_eq!(storage.write_count(), 0);

        store.append(message("1", "hi"));
        store.commit();
        assert_eq!(storage.write_count(), 1);

        store.commit();
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn unsynced_commits_are_synced_by_the_next_commit() {
        let storage = MemorySnapshotStorage::new();
        let mut store = ConversationStore::load(Box::new(storage.clone()));

        store.append(message("1", "a"));
        store.commit_unsynced();
        store.replace("1", MessagePatch::content("ab"));
        store.commit_unsynced();
        assert_eq!(storage.unsynced_write_count(), 2);
        assert_eq!(storage.write_count(), 0);

        store.commit();
        assert_eq!(storage.write_count(), 1);
        store.commit();
        assert_eq!(storage.write_count(), 1);
        assert!(storage
            .get(HISTORY_STORAGE_KEY)
            .expect("snapshot written")
            .contains("\"ab\""));
    }

    #[test]
    fn snapshot_round_trip_reproduces_messages() {
        let storage = MemorySnapshotStorage::new();
        let mut store = ConversationStore::load(Box::new(storage.clone()));
        store.append(message("1", "draw a cat"));
        let mut visual = Message::visual_pending("2", "Here you go", "a cat");
        visual.timestamp = 2;
        store.append(visual);
        store.replace("2", MessagePatch::image_settled(Some("img1".into())));
        let mut reply = Message::assistant("3", "CODEX", "sources below");
        reply.timestamp = 3;
        reply.grounding_metadata = Some(vec![GroundingSource {
            title: "Docs".into(),
            uri: "https://example.com".into(),
        }]);
        store.append(reply);
        store.commit();

        let reloaded = ConversationStore::load(Box::new(storage));
        assert_eq!(reloaded.messages(), store.messages());
        assert_eq!(reloaded.messages()[1].role, MessageRole::Visual);
    }

    #[test]
    fn append_rejects_duplicate_ids_and_preserves_order() {
        let mut store = ConversationStore::load(Box::new(MemorySnapshotStorage::new()));
        assert!(store.append(message("1", "a")));
        assert!(store.append(message("2", "b")));
        assert!(!store.append(message("1", "c")));
        let ids: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn remove_where_and_replace_report_effects() {
        let mut store = ConversationStore::load(Box::new(MemorySnapshotStorage::new()));
        store.append(message("1", "keep"));
        store.append(message("2", &greeting_text("CODEX")));
        store.append(message("3", "keep too"));

        assert_eq!(store.remove_where(|m| m.is_greeting()), 1);
        assert!(store.replace("3", MessagePatch::content("edited")));
        assert!(!store.replace("missing", MessagePatch::content("x")));
        assert_eq!(store.messages()[1].content, "edited");
    }

    #[test]
    fn interrupted_images_settle_as_failed() {
        let storage = MemorySnapshotStorage::new();
        let mut store = ConversationStore::load(Box::new(storage.clone()));
        store.append(message("1", "draw a cat"));
        store.append(Message::visual_pending("2", "Here you go", "a cat"));
        store.commit();

        let mut reloaded = ConversationStore::load(Box::new(storage));
        assert_eq!(reloaded.settle_interrupted_images(), 1);
        let visual = reloaded.get("2").expect("visual kept");
        assert!(!visual.is_generating_image());
        assert_eq!(visual.content, IMAGE_FAILURE_NOTICE);
        assert_eq!(reloaded.settle_interrupted_images(), 0);
    }

    #[test]
    fn purge_clears_and_seeds_one_greeting() {
        let storage = MemorySnapshotStorage::new();
        let mut store = ConversationStore::load(Box::new(storage.clone()));
        store.append(message("1", "old"));
        store.commit();

        let greeting = Message::assistant("init-codex-1", "CODEX", greeting_text("CODEX"));
        store.purge(greeting);

        assert_eq!(store.len(), 1);
        assert!(store.messages()[0].is_greeting());
        let persisted = storage.get(HISTORY_STORAGE_KEY).expect("snapshot written");
        let parsed: Vec<Message> = serde_json::from_str(&persisted).expect("valid json");
        assert_eq!(parsed.len(), 1);
    }
}
