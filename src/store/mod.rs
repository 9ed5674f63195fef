//! Persistence layer: libSQL-backed storage for conversations and messages.

pub mod libsql_backend;
pub(crate) mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Author, ChatStore, Conversation, NewMessage, StoredMessage};
