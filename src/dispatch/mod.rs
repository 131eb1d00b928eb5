//! Telemetry dispatch
//!
//! - [`payload`]: collector request bodies
//! - [`collector`]: HTTP delivery to the collector endpoints
//! - [`outbox`]: optional bounded retry queue
//! - [`dispatcher`]: mode selection and delivery

pub mod collector;
pub mod dispatcher;
pub mod outbox;
pub mod payload;

pub use collector::{Collector, DeliveryError, HttpCollector};
pub use dispatcher::{DispatchOutcome, Dispatcher, DropReason, Strategy};
pub use outbox::{Outbox, PendingDelivery, PushOutcome};
pub use payload::{AuthLogPayload, TokenLogPayload};
