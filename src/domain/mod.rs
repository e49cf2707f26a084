//! # Domain Layer
//!
//! Core types of the fan-out service, independent of transport and storage.
//!
//! ## Structure
//!
//! - **entities**: message envelope and persisted message
//! - **value_objects**: user, room and connection identifiers

pub mod entities;
pub mod value_objects;

pub use entities::*;
pub use value_objects::*;
