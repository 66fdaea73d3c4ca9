//! Message bus side of the relay: the publisher seam and its NATS adapter.

mod client;
mod error;
mod mock;

pub use client::{encode_row, EventPublisher, NatsPublisher, SubjectRouting};
pub use error::{BusError, BusResult};
pub use mock::{MockPublisher, PublishedMessage};
