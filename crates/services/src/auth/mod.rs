pub mod ports;
pub mod tokens;

pub use ports::{Session, SessionRepository};
pub use tokens::{generate_session_token, hash_session_token, SESSION_TOKEN_PREFIX};
