//! Delivery strategies: blocking request/response and live streaming.

pub mod blocking;
pub mod streaming;

pub use blocking::{BlockingDelivery, QueueTicket};
pub use streaming::{
    LineDelimitedSink, StreamHandle, StreamSink, StreamState, StreamingDelivery,
};
