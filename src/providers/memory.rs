//! In-process document store
//!
//! Holds documents in memory with the same semantics as the Drive store:
//! text-only listing, trash vs. permanent delete, idempotent delete and
//! optional title propagation on update. Used by `--memory` mode and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use super::{
    decode_text, require_id, DeleteMode, DocumentId, DocumentStore, ListQuery, RemoteFile,
    StoreError, StoreKind, WriteRequest, TEXT_MIME_TYPE,
};

#[derive(Debug, Clone)]
struct MemoryDocument {
    name: String,
    mime_type: String,
    content: Vec<u8>,
    parent: Option<String>,
    trashed: bool,
    /// Logical modification clock
    modified: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<String, MemoryDocument>,
    next_id: u64,
    clock: u64,
}

impl MemoryState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// In-memory `DocumentStore`
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    delete_mode: DeleteMode,
    propagate_title: bool,
    parent: Option<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            delete_mode: DeleteMode::Permanent,
            propagate_title: false,
            parent: None,
        }
    }

    pub fn with_delete_mode(mut self, mode: DeleteMode) -> Self {
        self.delete_mode = mode;
        self
    }

    pub fn with_title_propagation(mut self, enabled: bool) -> Self {
        self.propagate_title = enabled;
        self
    }

    /// Folder assigned to newly created documents
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Store raw bytes under a new id, bypassing text handling
    pub async fn insert_raw(&self, name: &str, mime_type: &str, content: Vec<u8>) -> DocumentId {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        let modified = state.tick();
        state.documents.insert(
            id.clone(),
            MemoryDocument {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                content,
                parent: self.parent.clone(),
                trashed: false,
                modified,
            },
        );
        DocumentId::new(id)
    }

    /// Stored name of a document, including trashed ones
    pub async fn name_of(&self, id: &DocumentId) -> Option<String> {
        let state = self.state.read().await;
        state.documents.get(id.as_str()).map(|d| d.name.clone())
    }

    pub async fn is_trashed(&self, id: &DocumentId) -> Option<bool> {
        let state = self.state.read().await;
        state.documents.get(id.as_str()).map(|d| d.trashed)
    }

    /// Number of stored documents, including trashed ones
    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    async fn list_documents(&self, query: &ListQuery) -> Result<Vec<RemoteFile>, StoreError> {
        let state = self.state.read().await;
        let parent = query.parent.as_deref().filter(|p| !p.is_empty());

        let mut matches: Vec<(&String, &MemoryDocument)> = state
            .documents
            .iter()
            .filter(|(_, d)| !d.trashed && d.mime_type == query.mime_type)
            .filter(|(_, d)| parent.is_none() || d.parent.as_deref() == parent)
            .collect();

        let order = query.order_by.trim();
        if order.starts_with("name") {
            matches.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        } else {
            matches.sort_by_key(|(_, d)| d.modified);
        }
        if order.ends_with("desc") {
            matches.reverse();
        }

        Ok(matches
            .into_iter()
            .take(query.effective_page_size() as usize)
            .map(|(id, d)| RemoteFile {
                id: DocumentId::new(id.clone()),
                name: d.name.clone(),
                mime_type: d.mime_type.clone(),
                modified_time: None,
            })
            .collect())
    }

    async fn read_document(&self, id: &DocumentId) -> Result<String, StoreError> {
        require_id(id)?;
        let content = {
            let state = self.state.read().await;
            match state.documents.get(id.as_str()) {
                Some(doc) => doc.content.clone(),
                None => return Err(StoreError::NotFound(id.to_string())),
            }
        };
        decode_text(id, content)
    }

    async fn write_document(&self, request: &WriteRequest) -> Result<DocumentId, StoreError> {
        let mut state = self.state.write().await;
        let modified = state.tick();

        match &request.id {
            None => {
                state.next_id += 1;
                let id = format!("mem-{}", state.next_id);
                state.documents.insert(
                    id.clone(),
                    MemoryDocument {
                        name: request.name.clone(),
                        mime_type: TEXT_MIME_TYPE.to_string(),
                        content: request.text.as_bytes().to_vec(),
                        parent: self.parent.clone(),
                        trashed: false,
                        modified,
                    },
                );
                info!("Created {} ({})", request.name, id);
                Ok(DocumentId::new(id))
            }
            Some(id) => {
                require_id(id)?;
                let doc = state
                    .documents
                    .get_mut(id.as_str())
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                doc.content = request.text.as_bytes().to_vec();
                if self.propagate_title {
                    doc.name = request.name.clone();
                }
                doc.modified = modified;
                info!("Updated {}", id);
                Ok(id.clone())
            }
        }
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<(), StoreError> {
        require_id(id)?;
        let mut state = self.state.write().await;
        match self.delete_mode {
            DeleteMode::Permanent => {
                state.documents.remove(id.as_str());
            }
            DeleteMode::Trash => {
                if let Some(doc) = state.documents.get_mut(id.as_str()) {
                    doc.trashed = true;
                }
            }
        }
        info!("Deleted {}", id);
        Ok(())
    }
}
