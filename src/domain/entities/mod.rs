//! # Domain Entities
//!
//! - **Envelope**: the immutable message unit passed between connections,
//!   the hub and the bus
//! - **Message**: what the persistence collaborator stores
//!
//! The repository trait is implemented in the infrastructure layer.

mod envelope;
mod message;

pub use envelope::{Envelope, EnvelopeKind};
pub use message::{MessageRepository, NewMessage, StoredMessage};

#[cfg(test)]
pub use message::MockMessageRepository;
