//! Event abstractions: the `Event` trait, seller-scoped envelopes, and the
//! pub/sub bus used to distribute committed events to read models and
//! notification workers.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod seller;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use seller::SellerScoped;
