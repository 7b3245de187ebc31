//! Consumer side of the auth API: token storage and the session manager

mod session;
mod storage;

pub use session::{
    ApiRequest, ApiResponse, DEFAULT_REFRESH_TIMEOUT, LogListener, SessionError, SessionListener,
    SessionManager,
};
pub use storage::{FileSessionStore, MemorySessionStore, SessionStore, SessionTokens, StorageError};
