//! Streaming events.
//!
//! Every run produces an ordered stream of [`StreamingEvent`]s. Sequence
//! numbers start at 1 and have no gaps; the store assigns them under a lock
//! that is held until the event has been handed to the run's [`EventSink`].

mod event;
mod sink;
pub mod sse;

pub use event::{EventType, StreamingEvent};
pub use sink::{
    ChannelEventSink, CollectingEventSink, EventSink, FanoutEventSink, LoggingEventSink,
    NoOpEventSink,
};
pub use sse::{SseDecoder, SseFrame};
