//! Read model storage abstractions. Read models are disposable; the event
//! streams are the source of truth.

pub mod store;

pub use store::{InMemoryReadModelStore, ReadModelStore};
