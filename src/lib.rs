// Drive Notepad - plain-text notes kept in a Google Drive account
// Document store client, editor session state machine, configuration

pub mod config;
pub mod providers;
pub mod session;

pub use config::AppConfig;
pub use providers::{
    DocumentId, DocumentStore, ListQuery, RemoteFile, StoreError, StoreFactory, StoreKind,
    WriteRequest,
};
pub use session::{Action, DeleteConfirm, EditorController, EditorSession, Mode, Notice, NoticeLevel};
