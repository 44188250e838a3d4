//! High-level client for the Folio SDK.

use crate::error::{Result, SdkError};
use crate::session::DocumentSession;
use crate::store::{HighlightStore, MemoryDeltaLog, MemoryHighlightStore, RemoteDeltaLog};
use crate::sync::SyncConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Where a client finds the delta log and highlight collection of each
/// document.
pub trait Backend: Send + Sync + 'static {
    fn delta_log(&self, document_id: &str) -> Arc<dyn RemoteDeltaLog>;

    fn highlight_store(&self, document_id: &str) -> Arc<dyn HighlightStore>;
}

/// A backend holding every document in memory. Clients sharing one
/// `MemoryBackend` collaborate.
#[derive(Default)]
pub struct MemoryBackend {
    logs: RwLock<HashMap<String, MemoryDeltaLog>>,
    highlights: RwLock<HashMap<String, MemoryHighlightStore>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The log for `document_id`, created on first use.
    pub fn memory_log(&self, document_id: &str) -> MemoryDeltaLog {
        self.logs
            .write()
            .entry(document_id.to_string())
            .or_default()
            .clone()
    }

    /// The highlight collection for `document_id`, created on first use.
    pub fn memory_highlights(&self, document_id: &str) -> MemoryHighlightStore {
        self.highlights
            .write()
            .entry(document_id.to_string())
            .or_default()
            .clone()
    }
}

impl Backend for MemoryBackend {
    fn delta_log(&self, document_id: &str) -> Arc<dyn RemoteDeltaLog> {
        Arc::new(self.memory_log(document_id))
    }

    fn highlight_store(&self, document_id: &str) -> Arc<dyn HighlightStore> {
        Arc::new(self.memory_highlights(document_id))
    }
}

/// Configuration for the Folio client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Author name stamped on every record.
    pub user_name: String,
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_name: "Anonymous".to_string(),
            sync: SyncConfig::default(),
        }
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.config.user_name = name.into();
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.config.sync = sync;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The main Folio client.
///
/// Opens at most one session per document and hands out clones of it.
///
/// # Example
///
/// ```rust
/// use folio_sdk::{Client, ClientConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> folio_sdk::Result<()> {
/// let client = Client::new_with_memory_backend(ClientConfig {
///     user_name: "Alice".to_string(),
///     ..Default::default()
/// });
///
/// let doc = client.open_document("notes").await?;
/// doc.insert_text(0, "Hello").await?;
/// assert_eq!(doc.text().await?, "Hello\n");
///
/// client.close_all().await;
/// # Ok(())
/// # }
/// ```
pub struct Client<B: Backend> {
    config: ClientConfig,
    backend: Arc<B>,
    documents: Arc<RwLock<HashMap<String, DocumentSession>>>,
}

impl Client<MemoryBackend> {
    /// Create a client with its own in-memory backend.
    pub fn new_with_memory_backend(config: ClientConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }
}

impl<B: Backend> Client<B> {
    pub fn new(backend: Arc<B>, config: ClientConfig) -> Self {
        Self {
            config,
            backend,
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the user name.
    pub fn user_name(&self) -> &str {
        &self.config.user_name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Open a document, or return the session already open for it.
    pub async fn open_document(&self, document_id: &str) -> Result<DocumentSession> {
        if let Some(session) = self.get_document(document_id) {
            return Ok(session);
        }

        let session = DocumentSession::open(
            document_id,
            self.config.user_name.clone(),
            self.backend.delta_log(document_id),
            self.backend.highlight_store(document_id),
            self.config.sync.clone(),
        )
        .await?;

        let existing = {
            let mut documents = self.documents.write();
            match documents.get(document_id) {
                Some(existing) => Some(existing.clone()),
                None => {
                    documents.insert(document_id.to_string(), session.clone());
                    None
                }
            }
        };

        match existing {
            // Lost a race with a concurrent open.
            Some(existing) => {
                debug!(document_id, "Document opened concurrently, keeping first session");
                session.close().await;
                Ok(existing)
            }
            None => Ok(session),
        }
    }

    /// Get an open document.
    pub fn get_document(&self, document_id: &str) -> Option<DocumentSession> {
        self.documents.read().get(document_id).cloned()
    }

    /// Like [`get_document`](Self::get_document), as an error when missing.
    pub fn document(&self, document_id: &str) -> Result<DocumentSession> {
        self.get_document(document_id)
            .ok_or_else(|| SdkError::DocumentNotFound(document_id.to_string()))
    }

    /// List all open document IDs.
    pub fn document_ids(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }

    /// Close a document. Returns false if it was not open.
    pub async fn close_document(&self, document_id: &str) -> bool {
        let session = self.documents.write().remove(document_id);
        match session {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every open document.
    pub async fn close_all(&self) {
        let sessions: Vec<DocumentSession> = self
            .documents
            .write()
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in sessions {
            session.close().await;
        }
    }
}

/// Convenience functions for quickly setting up collaborating clients.
pub mod quick {
    use super::*;

    /// Create one client per user name, all sharing a single in-memory
    /// backend.
    pub fn create_collaborative_clients(
        user_names: &[&str],
        sync: SyncConfig,
    ) -> (Arc<MemoryBackend>, Vec<Client<MemoryBackend>>) {
        let backend = Arc::new(MemoryBackend::new());

        let clients = user_names
            .iter()
            .map(|name| {
                let config = ClientConfigBuilder::new()
                    .user_name(*name)
                    .sync(sync.clone())
                    .build();
                Client::new(backend.clone(), config)
            })
            .collect();
        (backend, clients)
    }
}
