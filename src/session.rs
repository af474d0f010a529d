//! Editor Session - which document is being edited, and what the form shows
//!
//! `EditorSession` is the per-user editing state. It is owned by the caller
//! and passed into `EditorController::handle` for every action; nothing here
//! is global, so sessions cannot leak into each other.
//!
//! A failed store call never changes the session: no half-adopted id, no
//! cleared buffer. The user can retry the same action without losing text.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::providers::{DocumentId, DocumentStore, ListQuery, RemoteFile, StoreError, WriteRequest};

/// Title given to a fresh, unsaved document
pub const DEFAULT_TITLE: &str = "untitled.txt";

/// Whether the session is composing a new document or editing a stored one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Create,
    Edit(DocumentId),
}

impl Mode {
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            Mode::Create => None,
            Mode::Edit(id) => Some(id),
        }
    }
}

/// Two-step delete guard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteConfirm {
    #[default]
    Idle,
    AwaitingConfirmation,
}

/// User actions the controller understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Re-list documents from the store
    Refresh,
    StartNew,
    SelectFile(DocumentId),
    EditTitle(String),
    EditBody(String),
    Save,
    /// First press arms the guard, second press deletes
    RequestDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
    /// The session cannot continue until credentials are fixed
    Fatal,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeLevel::Info => write!(f, "info"),
            NoticeLevel::Success => write!(f, "ok"),
            NoticeLevel::Warning => write!(f, "warning"),
            NoticeLevel::Error => write!(f, "error"),
            NoticeLevel::Fatal => write!(f, "fatal"),
        }
    }
}

/// User-visible message produced by an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Fatal, message)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Per-user editing state
#[derive(Debug, Clone)]
pub struct EditorSession {
    mode: Mode,
    title: String,
    body: String,
    delete_confirm: DeleteConfirm,
    /// Result of the last successful listing, kept in sync with local saves
    listing: Vec<RemoteFile>,
    /// Title and body as last loaded from or written to the store
    synced_title: String,
    synced_body: String,
    default_title: String,
    /// Set once credentials fail; every later action is refused
    halted: Option<String>,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE)
    }
}

impl EditorSession {
    pub fn new(default_title: impl Into<String>) -> Self {
        let default_title = default_title.into();
        Self {
            mode: Mode::Create,
            title: default_title.clone(),
            body: String::new(),
            delete_confirm: DeleteConfirm::Idle,
            listing: Vec::new(),
            synced_title: default_title.clone(),
            synced_body: String::new(),
            default_title,
            halted: None,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn selected_id(&self) -> Option<&DocumentId> {
        self.mode.document_id()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn delete_confirm(&self) -> DeleteConfirm {
        self.delete_confirm
    }

    pub fn listing(&self) -> &[RemoteFile] {
        &self.listing
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// True when title or body differ from what the store last saw
    pub fn is_dirty(&self) -> bool {
        self.title != self.synced_title || self.body != self.synced_body
    }

    /// One-line description of the current mode for the form header
    pub fn status_line(&self) -> String {
        let dirty = if self.is_dirty() { " (modified)" } else { "" };
        match &self.mode {
            Mode::Create => format!("New document{}", dirty),
            Mode::Edit(id) => format!("Editing {}{}", id, dirty),
        }
    }

    fn listed(&self, id: &DocumentId) -> Option<&RemoteFile> {
        self.listing.iter().find(|f| &f.id == id)
    }

    fn mark_synced(&mut self) {
        self.synced_title = self.title.clone();
        self.synced_body = self.body.clone();
    }

    fn start_new(&mut self) {
        self.mode = Mode::Create;
        self.title = self.default_title.clone();
        self.body.clear();
        self.delete_confirm = DeleteConfirm::Idle;
        self.mark_synced();
    }

    /// Reflect a successful write in the cached listing
    fn remember_saved(&mut self, id: &DocumentId) {
        match self.listing.iter_mut().find(|f| &f.id == id) {
            Some(entry) => entry.name = self.title.clone(),
            None => self
                .listing
                .insert(0, RemoteFile::new(id.as_str(), self.title.clone())),
        }
    }
}

/// Drives a `DocumentStore` on behalf of editor sessions.
///
/// The controller holds no per-user state and may be shared by any number
/// of sessions.
pub struct EditorController {
    store: Arc<dyn DocumentStore>,
    query: ListQuery,
    /// Must match the store's setting: whether an update also renames
    propagate_title: bool,
}

impl EditorController {
    pub fn new(store: Arc<dyn DocumentStore>, query: ListQuery) -> Self {
        Self {
            store,
            query,
            propagate_title: false,
        }
    }

    pub fn with_title_propagation(mut self, enabled: bool) -> Self {
        self.propagate_title = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Apply one action to the session. Returns the message to show, if any.
    pub async fn handle(&self, session: &mut EditorSession, action: Action) -> Option<Notice> {
        if let Some(reason) = &session.halted {
            return Some(Notice::fatal(reason.clone()));
        }

        if action != Action::RequestDelete {
            session.delete_confirm = DeleteConfirm::Idle;
        }

        match action {
            Action::Refresh => Some(self.refresh(session).await),
            Action::StartNew => {
                session.start_new();
                None
            }
            Action::SelectFile(id) => Some(self.select(session, id).await),
            Action::EditTitle(title) => {
                session.title = title;
                None
            }
            Action::EditBody(body) => {
                session.body = body;
                None
            }
            Action::Save => Some(self.save(session).await),
            Action::RequestDelete => Some(self.request_delete(session).await),
        }
    }

    async fn refresh(&self, session: &mut EditorSession) -> Notice {
        match self.store.list_documents(&self.query).await {
            Ok(files) => {
                let count = files.len();
                session.listing = files;
                if count == 0 {
                    Notice::info("No text documents")
                } else {
                    Notice::info(format!("{} document(s)", count))
                }
            }
            Err(e) => failure(session, "List failed", e),
        }
    }

    async fn select(&self, session: &mut EditorSession, id: DocumentId) -> Notice {
        let Some(name) = session.listed(&id).map(|f| f.name.clone()) else {
            return Notice::warning(format!("{} is not in the current list; refresh first", id));
        };

        match self.store.read_document(&id).await {
            Ok(text) => {
                session.mode = Mode::Edit(id);
                session.title = name;
                session.body = text;
                session.mark_synced();
                Notice::info(format!("Opened {}", session.title))
            }
            Err(StoreError::NotFound(_)) => {
                session.listing.retain(|f| f.id != id);
                warn!("{} vanished from the store", id);
                Notice::error(format!("{} no longer exists; removed it from the list", name))
            }
            Err(e) => failure(session, "Open failed", e),
        }
    }

    async fn save(&self, session: &mut EditorSession) -> Notice {
        if session.title.trim().is_empty() {
            return Notice::warning("Enter a file name before saving");
        }

        let request = match &session.mode {
            Mode::Create => WriteRequest::create(session.title.clone(), session.body.clone()),
            Mode::Edit(id) => {
                WriteRequest::update(id.clone(), session.title.clone(), session.body.clone())
            }
        };

        match self.store.write_document(&request).await {
            Ok(id) => {
                let created = request.id.is_none();
                // The store kept its name; show that name rather than the edit
                let title_dropped =
                    !created && !self.propagate_title && session.title != session.synced_title;
                if title_dropped {
                    session.title = session.synced_title.clone();
                }
                session.mode = Mode::Edit(id.clone());
                session.mark_synced();
                session.remember_saved(&id);
                if created {
                    info!("Session created {} as {}", session.title, id);
                    Notice::success(format!("Created {} (id {})", session.title, id))
                } else if title_dropped {
                    Notice::success(format!(
                        "Saved {} (content only; existing documents keep their name)",
                        session.title
                    ))
                } else {
                    Notice::success(format!("Saved {}", session.title))
                }
            }
            Err(e) => failure(session, "Save failed", e),
        }
    }

    async fn request_delete(&self, session: &mut EditorSession) -> Notice {
        let Mode::Edit(id) = session.mode.clone() else {
            return Notice::warning("Nothing to delete: this document has not been saved");
        };

        match session.delete_confirm {
            DeleteConfirm::Idle => {
                session.delete_confirm = DeleteConfirm::AwaitingConfirmation;
                Notice::warning(format!("Delete {}? Press delete again to confirm", session.title))
            }
            DeleteConfirm::AwaitingConfirmation => match self.store.delete_document(&id).await {
                Ok(()) => {
                    let title = session.title.clone();
                    session.listing.retain(|f| f.id != id);
                    session.start_new();
                    Notice::success(format!("Deleted {}", title))
                }
                Err(e) => failure(session, "Delete failed", e),
            },
        }
    }
}

/// Turn a store failure into a notice. Authentication failures halt the session.
fn failure(session: &mut EditorSession, what: &str, e: StoreError) -> Notice {
    if !e.is_recoverable() {
        let reason = format!("{}: {}. Fix the credentials and restart.", what, e);
        warn!("{}", reason);
        session.halted = Some(reason.clone());
        return Notice::fatal(reason);
    }

    match e {
        StoreError::Decode(_) | StoreError::InvalidArgument(_) => {
            Notice::warning(format!("{}: {}", what, e))
        }
        _ if e.status() == Some(429) => {
            warn!("{}: rate limited", what);
            Notice::error(format!("{}: too many requests, try again in a moment", what))
        }
        _ => {
            warn!("{}: {}", what, e);
            Notice::error(format!("{}: {}", what, e))
        }
    }
}
