//! Application Services
//!
//! - **ChatService**: authoring path for chat content (persist, then publish)

pub mod chat_service;

pub use chat_service::{ChatError, ChatService, ChatServiceImpl};
