//! Core infrastructure shared by every resilience primitive crate.
//!
//! - [`events`] — the synchronous `on_*` callback system plus the bounded-ring
//!   `EventPublisher`/`EventSubscription` pair.
//! - [`error`] — the cross-primitive [`error::ResilienceError`] wrapper and the
//!   domain exception taxonomy (`CallNotPermitted`, `BulkheadFull`, …).
//! - [`registry`] — [`registry::Registry`], the concurrent name→entry table
//!   with config-store and base-config inheritance shared by every
//!   primitive's `XRegistry` facade.

pub mod error;
pub mod events;
pub mod registry;

pub use error::ResilienceError;
pub use events::{
    EventListener, EventListeners, EventPublisher, EventSubscription, FnListener, ResilienceEvent,
};
pub use registry::{ConfigurationNotFound, Overlay, Registry};
