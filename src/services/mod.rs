// Service exports
pub mod auth;
pub mod memory;
pub mod postgres;
pub mod storage;

pub use auth::{bearer_token, AuthError, AuthProvider, JwtAuth, RemoteAuth};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use storage::{Storage, StoreError};
