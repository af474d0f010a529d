//! Document Store Module
//!
//! A document store holds the plain-text notes. Every store implements the
//! `DocumentStore` trait, so the editor session works the same against
//! Google Drive or the in-process store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            DocumentStore Trait              │
//! │       list, read, write, delete             │
//! └─────────────────────────────────────────────┘
//!                      │
//!           ┌──────────┴──────────┐
//!           ▼                     ▼
//!     ┌────────────┐        ┌──────────┐
//!     │  GDrive    │        │  Memory  │
//!     └────────────┘        └──────────┘
//!           │
//!           ▼
//!     ┌────────────┐
//!     │TokenSource │
//!     └────────────┘
//! ```

pub mod types;
pub mod http_retry;
pub mod service_account;
pub mod google_drive;
pub mod memory;

pub use types::*;
pub use google_drive::{GoogleDriveConfig, GoogleDriveStore};
pub use memory::MemoryStore;
pub use service_account::{ServiceAccountKey, ServiceAccountTokenSource, StaticTokenSource, TokenSource};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::AppConfig;

/// Unified document store trait
///
/// Each method is a single round trip to the store. Implementations must
/// make create and update one atomic request each.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the store type identifier
    fn kind(&self) -> StoreKind;

    /// List documents matching the query. Returns an empty list, not an
    /// error, when nothing matches.
    async fn list_documents(&self, query: &ListQuery) -> Result<Vec<RemoteFile>, StoreError>;

    /// Read a document's content as UTF-8 text
    async fn read_document(&self, id: &DocumentId) -> Result<String, StoreError>;

    /// Create (`request.id == None`) or overwrite a document, returning its id
    async fn write_document(&self, request: &WriteRequest) -> Result<DocumentId, StoreError>;

    /// Delete a document. Deleting an id that no longer exists succeeds.
    async fn delete_document(&self, id: &DocumentId) -> Result<(), StoreError>;
}

/// Supported document store types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    GoogleDrive,
    Memory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::GoogleDrive => write!(f, "Google Drive"),
            StoreKind::Memory => write!(f, "Memory"),
        }
    }
}

/// Store factory for creating store instances from configuration
pub struct StoreFactory;

impl StoreFactory {
    /// Create the store the configuration describes
    pub fn create(config: &AppConfig, kind: StoreKind) -> Result<Arc<dyn DocumentStore>, StoreError> {
        match kind {
            StoreKind::Memory => {
                let mut store = MemoryStore::new()
                    .with_delete_mode(config.delete_mode)
                    .with_title_propagation(config.propagate_title_on_update);
                // Listings are scoped to this folder, so new documents must land in it
                if let Some(parent) = config.parent_folder_id.as_deref().filter(|p| !p.is_empty()) {
                    store = store.with_parent(parent);
                }
                Ok(Arc::new(store))
            }
            StoreKind::GoogleDrive => {
                let tokens = Self::token_source(config)?;
                Ok(Arc::new(GoogleDriveStore::new(config.drive_config(), tokens)?))
            }
        }
    }

    /// A pre-issued token wins over the key file
    fn token_source(config: &AppConfig) -> Result<Arc<dyn TokenSource>, StoreError> {
        if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(Arc::new(StaticTokenSource::new(token)));
        }
        let path = config.credentials_path.as_deref().ok_or_else(|| {
            StoreError::InvalidConfig(format!(
                "No credentials: set credentials_path or {}",
                crate::config::ENV_CREDENTIALS
            ))
        })?;
        let key = ServiceAccountKey::from_file(path)?;
        Ok(Arc::new(ServiceAccountTokenSource::new(key, config.request_timeout())?))
    }
}

/// Reject empty ids before any network call
pub(crate) fn require_id(id: &DocumentId) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::InvalidArgument("document id is empty".to_string()));
    }
    Ok(())
}

/// Decode downloaded bytes as UTF-8 text
pub(crate) fn decode_text(id: &DocumentId, bytes: Vec<u8>) -> Result<String, StoreError> {
    String::from_utf8(bytes).map_err(|e| StoreError::Decode(format!("{}: {}", id, e.utf8_error())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_requires_credentials_for_drive() {
        let config = AppConfig::default();
        assert!(matches!(
            StoreFactory::create(&config, StoreKind::GoogleDrive),
            Err(StoreError::InvalidConfig(_))
        ));

        let config = AppConfig { access_token: Some("tok".into()), ..AppConfig::default() };
        let store = StoreFactory::create(&config, StoreKind::GoogleDrive).unwrap();
        assert_eq!(store.kind(), StoreKind::GoogleDrive);
    }

    #[test]
    fn test_factory_memory_store() {
        let store = StoreFactory::create(&AppConfig::default(), StoreKind::Memory).unwrap();
        assert_eq!(store.kind(), StoreKind::Memory);
        assert_eq!(store.kind().to_string(), "Memory");
    }

    #[tokio::test]
    async fn test_memory_store_uses_configured_parent() {
        let config = AppConfig {
            parent_folder_id: Some("folder-1".to_string()),
            ..AppConfig::default()
        };
        let store = StoreFactory::create(&config, StoreKind::Memory).unwrap();
        let id = store
            .write_document(&WriteRequest::create("scoped.txt", "x"))
            .await
            .unwrap();

        let listed = store.list_documents(&config.list_query()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }

    #[test]
    fn test_require_id() {
        assert!(require_id(&DocumentId::new("abc")).is_ok());
        assert!(matches!(
            require_id(&DocumentId::new("  ")),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_decode_text() {
        let id = DocumentId::new("d");
        assert_eq!(decode_text(&id, "héllo".as_bytes().to_vec()).unwrap(), "héllo");
        assert!(matches!(
            decode_text(&id, vec![0xff, 0xfe, 0x00]),
            Err(StoreError::Decode(_))
        ));
    }
}
