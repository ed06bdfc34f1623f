//! Event sink trait and implementations.

use super::StreamingEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, Level};

/// Receives the streaming events of a run.
///
/// The orchestrator delivers through [`EventSink::try_emit`] while it holds
/// the run's sequence lock, so sinks see events in sequence order.
/// Implementations must not block.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &StreamingEvent);

    /// Emits an event without blocking.
    ///
    /// Never fails; delivery problems are logged and dropped.
    fn try_emit(&self, event: &StreamingEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &StreamingEvent) {}

    fn try_emit(&self, _event: &StreamingEvent) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the given level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub const fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_event(&self, event: &StreamingEvent) {
        if self.level == Level::DEBUG {
            debug!(
                execution_id = %event.execution_id,
                sequence = event.sequence,
                event_data = %event.data,
                "Event: {}", event.event_type
            );
        } else {
            info!(
                execution_id = %event.execution_id,
                sequence = event.sequence,
                step_id = event.step_id().unwrap_or_default(),
                "Event: {}", event.event_type
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &StreamingEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &StreamingEvent) {
        self.log_event(event);
    }
}

/// Collects events in memory. Mostly useful in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<StreamingEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events, in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<StreamingEvent> {
        self.events.read().clone()
    }

    /// Wire names of the collected event types, in delivery order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .read()
            .iter()
            .map(|e| e.event_type.as_str())
            .collect()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Events whose type starts with `type_prefix`, e.g. `step.`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<StreamingEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.as_str().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &StreamingEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &StreamingEvent) {
        self.events.write().push(event.clone());
    }
}

/// Forwards events into an unbounded channel.
///
/// Backs the event stream handed out for each run. A closed receiver is
/// not an error: the run keeps going and later events are dropped.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<StreamingEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiving half of its channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamingEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Returns true once the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: &StreamingEvent) {
        self.try_emit(event);
    }

    fn try_emit(&self, event: &StreamingEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(
                execution_id = %event.execution_id,
                sequence = event.sequence,
                "Event receiver dropped; discarding {}", event.event_type
            );
        }
    }
}

/// Delivers every event to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if there are no sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEventSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    async fn emit(&self, event: &StreamingEvent) {
        for sink in &self.sinks {
            sink.emit(event).await;
        }
    }

    fn try_emit(&self, event: &StreamingEvent) {
        for sink in &self.sinks {
            sink.try_emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use serde_json::json;

    fn event(event_type: EventType, sequence: u64) -> StreamingEvent {
        StreamingEvent::new(event_type, "exec", sequence, json!({}))
    }

    #[test]
    fn test_noop_sink() {
        let sink = NoOpEventSink;
        tokio_test::block_on(sink.emit(&event(EventType::Heartbeat, 1)));
        sink.try_emit(&event(EventType::Heartbeat, 2));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::debug();
        sink.emit(&event(EventType::StepStarted, 1)).await;
        LoggingEventSink::default().try_emit(&event(EventType::StepCompleted, 2));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&event(EventType::ExecutionStarted, 1)).await;
        sink.try_emit(&event(EventType::StepStarted, 2));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.event_types(), vec!["execution.started", "step.started"]);
    }

    #[tokio::test]
    async fn test_collecting_sink_filter_and_clear() {
        let sink = CollectingEventSink::new();
        sink.try_emit(&event(EventType::StepStarted, 1));
        sink.try_emit(&event(EventType::StepCompleted, 2));
        sink.try_emit(&event(EventType::ExecutionCompleted, 3));

        assert_eq!(sink.events_of_type("step.").len(), 2);
        assert_eq!(sink.events_of_type("execution.").len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelEventSink::channel();
        sink.try_emit(&event(EventType::ExecutionStarted, 1));
        sink.emit(&event(EventType::ExecutionCompleted, 2)).await;

        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(rx.recv().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelEventSink::channel();
        drop(rx);
        assert!(sink.is_closed());
        sink.try_emit(&event(EventType::Heartbeat, 1));
    }

    #[tokio::test]
    async fn test_fanout_sink() {
        let a = Arc::new(CollectingEventSink::new());
        let b = Arc::new(CollectingEventSink::new());
        let fanout = FanoutEventSink::new()
            .with_sink(a.clone())
            .with_sink(b.clone());

        fanout.try_emit(&event(EventType::StepStarted, 1));
        fanout.emit(&event(EventType::StepFailed, 2)).await;

        assert_eq!(fanout.len(), 2);
        assert_eq!(a.len(), 2);
        assert_eq!(b.event_types(), vec!["step.started", "step.failed"]);
    }
}
