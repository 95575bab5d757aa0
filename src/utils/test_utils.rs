use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;

use crate::core::app::App;
use crate::core::chat_stream::{
    CompletionClient, CompletionError, CompletionRequest, EventStream, StreamEvent,
};
use crate::core::conversation::ConversationStore;
use crate::core::persona::PersonaManager;
use crate::core::storage::MemorySnapshotStorage;

type Script = Result<Vec<Result<StreamEvent, CompletionError>>, CompletionError>;

/// Scripted [`CompletionClient`]. Each `stream_reply` call consumes the next
/// script; once they run out, replies are empty streams.
pub struct FakeCompletionClient {
    scripts: Mutex<VecDeque<Script>>,
    image: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
    image_prompts: Mutex<Vec<String>>,
}

impl FakeCompletionClient {
    pub fn new(events: Vec<Result<StreamEvent, CompletionError>>) -> Self {
        Self::scripted(Ok(events))
    }

    /// Fails when the stream is opened, before any event.
    pub fn failing_open(error: CompletionError) -> Self {
        Self::scripted(Err(error))
    }

    fn scripted(script: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::from([script])),
            image: None,
            requests: Mutex::new(Vec::new()),
            image_prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue the reply for the following turn.
    pub fn then(self, events: Vec<Result<StreamEvent, CompletionError>>) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .push_back(Ok(events));
        self
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn image_prompts(&self) -> Vec<String> {
        self.image_prompts.lock().expect("prompts lock").clone()
    }

    pub fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            history: Vec::new(),
            new_message: text.to_string(),
            system_instruction: "You are a test persona.".to_string(),
        }
    }
}

#[async_trait]
impl CompletionClient for FakeCompletionClient {
    async fn stream_reply(
        &self,
        request: CompletionRequest,
    ) -> Result<EventStream, CompletionError> {
        self.requests.lock().expect("requests lock").push(request);
        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        let events = script?;
        Ok(stream::iter(events).boxed())
    }

    async fn generate_image(&self, prompt: &str) -> Option<String> {
        self.image_prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        self.image.clone()
    }
}

/// App over in-memory storage, plus a handle to inspect what it persisted.
pub fn create_test_app() -> (App, MemorySnapshotStorage) {
    create_test_app_with(MemorySnapshotStorage::new())
}

pub fn create_test_app_with(storage: MemorySnapshotStorage) -> (App, MemorySnapshotStorage) {
    let store = ConversationStore::load(Box::new(storage.clone()));
    let app = App::new(store, PersonaManager::load_personas(&[]), None)
        .expect("default persona exists");
    (app, storage)
}

pub fn text(delta: &str) -> Result<StreamEvent, CompletionError> {
    Ok(StreamEvent::Text(delta.to_string()))
}
