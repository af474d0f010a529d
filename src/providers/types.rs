//! Shared types for document stores
//!
//! This module contains the types shared by every `DocumentStore`
//! implementation: document identity and metadata, list/write requests,
//! and the error taxonomy surfaced to the editor session.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// MIME type of every document this application manages
pub const TEXT_MIME_TYPE: &str = "text/plain";

/// Upper bound on a single list request. There is no cursor follow-up, so
/// documents beyond this bound are unreachable from one listing.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Default list size
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Default list ordering (most recently modified first)
pub const DEFAULT_ORDER_BY: &str = "modifiedTime desc";

/// Store-assigned document identifier.
///
/// Only ever constructed from a value the store returned (list or create),
/// or from user input that is validated before use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One stored document as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: DocumentId,
    /// Display name. The store does not enforce uniqueness.
    pub name: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// RFC 3339 timestamp assigned by the store, if reported
    #[serde(default)]
    pub modified_time: Option<String>,
}

fn default_mime_type() -> String {
    TEXT_MIME_TYPE.to_string()
}

impl RemoteFile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(id),
            name: name.into(),
            mime_type: default_mime_type(),
            modified_time: None,
        }
    }
}

/// Parameters of a single list request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub mime_type: String,
    pub page_size: u32,
    pub order_by: String,
    /// Restrict the listing to children of this folder
    pub parent: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            mime_type: TEXT_MIME_TYPE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            order_by: DEFAULT_ORDER_BY.to_string(),
            parent: None,
        }
    }
}

impl ListQuery {
    /// Page size clamped into `1..=MAX_PAGE_SIZE`
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Drive-style filter expression for this query
    pub fn filter(&self) -> String {
        let mut q = format!(
            "mimeType = '{}' and trashed = false",
            escape_query_literal(&self.mime_type)
        );
        if let Some(parent) = self.parent.as_deref().filter(|p| !p.is_empty()) {
            q.push_str(&format!(" and '{}' in parents", escape_query_literal(parent)));
        }
        q
    }
}

/// Escape a value for use inside a single-quoted query literal
pub fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// A create-or-update request. `id == None` creates a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub id: Option<DocumentId>,
    pub name: String,
    pub text: String,
}

impl WriteRequest {
    pub fn create(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn update(id: DocumentId, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            text: text.into(),
        }
    }
}

/// How `delete_document` removes a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Remove the document immediately
    #[default]
    Permanent,
    /// Move the document to the store's reversible trash
    Trash,
}

/// Document store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Request failed{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Content is not valid UTF-8 text: {0}")]
    Decode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl StoreError {
    /// Transport failure with no HTTP status (connection, timeout, body read)
    pub fn network(message: impl Into<String>) -> Self {
        StoreError::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Check if the user can retry the same action and expect it may succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            StoreError::Authentication(_) | StoreError::InvalidConfig(_)
        )
    }

    /// HTTP status carried by a transport failure
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StoreError::network(format!("request timed out: {}", e))
        } else {
            StoreError::network(e.to_string())
        }
    }
}
