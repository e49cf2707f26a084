//! Repository Implementations
//!
//! PostgreSQL implementations of domain repository traits.

pub mod message_repository;

pub use message_repository::PgMessageRepository;
