//! In-process message bus.
//!
//! Topic-routed delivery with priority queues, TTL expiry, per-subscriber
//! circuit breakers, a bounded dead-letter ring, and request/response
//! correlation. A single dispatcher task drains the queues in priority
//! order (critical > high > normal > low, FIFO within a level); starvation
//! across levels is possible by design. Delivery is at-most-once per
//! subscription, and one subscriber's error never affects another.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

/// Message payload map.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Types of messages in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// An instruction to perform an action.
    Command,
    /// A fact that something happened.
    Event,
    /// A request expecting a correlated response.
    Request,
    /// The response to a request.
    Response,
    /// A fire-and-forget notification.
    Notification,
    /// A liveness signal.
    Heartbeat,
}

/// Message priority levels, dispatch order descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    /// Lowest priority.
    Low,
    /// Default priority.
    Normal,
    /// Elevated priority.
    High,
    /// Dispatched before everything else.
    Critical,
}

impl MessagePriority {
    /// All levels in dispatch order (critical first).
    pub const DISPATCH_ORDER: [Self; 4] = [Self::Critical, Self::High, Self::Normal, Self::Low];

    const fn queue_index(self) -> usize {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

/// A message traveling over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: Uuid,
    /// Message type.
    pub message_type: MessageType,
    /// Priority level.
    pub priority: MessagePriority,
    /// Source agent or service.
    pub source: String,
    /// Target agent (None for broadcast).
    pub target: Option<String>,
    /// Topic string.
    pub topic: String,
    /// Payload map.
    pub payload: Payload,
    /// Publish instant.
    pub timestamp: DateTime<Utc>,
    /// Correlation id for request/response pairs.
    pub correlation_id: Option<String>,
    /// Reply topic for requests.
    pub reply_to: Option<String>,
    /// Time to live in seconds; expired messages are dropped undelivered.
    pub ttl_secs: Option<f64>,
}

impl Message {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl_secs.is_some_and(|ttl| {
            let age = (now - self.timestamp).num_milliseconds() as f64 / 1000.0;
            age > ttl
        })
    }
}

/// Publish parameters. Build with [`Publish::event`] and adjust with
/// the setters; `request`/`respond` on the bus fill in the
/// correlation fields themselves.
#[derive(Debug, Clone)]
pub struct Publish {
    /// Topic to publish on.
    pub topic: String,
    /// Payload map.
    pub payload: Payload,
    /// Message type.
    pub message_type: MessageType,
    /// Priority level.
    pub priority: MessagePriority,
    /// Source agent or service.
    pub source: String,
    /// Target agent (None for broadcast).
    pub target: Option<String>,
    /// Correlation id.
    pub correlation_id: Option<String>,
    /// Reply topic.
    pub reply_to: Option<String>,
    /// Time to live in seconds.
    pub ttl_secs: Option<f64>,
}

impl Publish {
    /// An event publication with normal priority from `system`.
    #[must_use]
    pub fn event(topic: impl Into<String>, payload: Payload) -> Self {
        Self {
            topic: topic.into(),
            payload,
            message_type: MessageType::Event,
            priority: MessagePriority::Normal,
            source: "system".to_string(),
            target: None,
            correlation_id: None,
            reply_to: None,
            ttl_secs: None,
        }
    }

    /// Sets the message type.
    #[must_use]
    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the source.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the target.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the TTL in seconds.
    #[must_use]
    pub const fn ttl_secs(mut self, ttl: f64) -> Self {
        self.ttl_secs = Some(ttl);
        self
    }
}

/// Outcome a subscriber handler reports back to the bus.
pub type HandlerResult = std::result::Result<(), String>;

/// Boxed handler future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Subscriber callback invoked per delivered message.
pub type Handler = Arc<dyn Fn(Message) -> HandlerFuture + Send + Sync>;

/// A registered subscription.
#[derive(Clone)]
struct Subscription {
    subscriber_id: String,
    topic_pattern: String,
    handler: Handler,
}

/// A failed delivery captured in the dead-letter ring.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The message that failed to deliver.
    pub message: Message,
    /// Subscriber that errored.
    pub subscriber_id: String,
    /// Pattern the subscription was registered under.
    pub topic_pattern: String,
    /// Error string the handler reported.
    pub error: String,
    /// Capture instant.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct CircuitBreaker {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    const fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
        }
    }
}

/// Bus counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BusStats {
    /// Messages accepted by `publish`.
    pub messages_sent: u64,
    /// Successful handler invocations.
    pub messages_processed: u64,
    /// Failed or breaker-skipped deliveries.
    pub messages_failed: u64,
    /// Messages dropped past their TTL.
    pub messages_expired: u64,
    /// Live subscriptions.
    pub subscriptions_active: u64,
}

/// Bus construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// Per-priority queue capacity; the oldest message is dropped on
    /// overflow.
    pub max_queue_size: usize,
    /// History and dead-letter ring capacity.
    pub ring_size: usize,
    /// Consecutive failures that open a subscriber's breaker.
    pub breaker_threshold: u32,
    /// How long an open breaker skips deliveries before probing again.
    pub breaker_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            ring_size: 1000,
            breaker_threshold: 5,
            breaker_timeout: Duration::from_secs(60),
        }
    }
}

struct BusState {
    queues: [VecDeque<Message>; 4],
    subscriptions: HashMap<String, Vec<Subscription>>,
    history: VecDeque<Message>,
    dead_letter: VecDeque<DeadLetter>,
    breakers: HashMap<String, CircuitBreaker>,
    stats: BusStats,
    running: bool,
}

/// Central message bus for inter-component communication.
pub struct MessageBus {
    config: BusConfig,
    state: Mutex<BusState>,
    notify: Notify,
    dispatcher: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MessageBus {
    /// Creates a bus with the given configuration. Call
    /// [`MessageBus::start`] to begin dispatching.
    #[must_use]
    pub fn new(config: BusConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(BusState {
                queues: [const { VecDeque::new() }; 4],
                subscriptions: HashMap::new(),
                history: VecDeque::new(),
                dead_letter: VecDeque::new(),
                breakers: HashMap::new(),
                stats: BusStats::default(),
                running: false,
            }),
            notify: Notify::new(),
            dispatcher: Mutex::new(None),
        })
    }

    /// Creates a bus with default configuration.
    #[must_use]
    pub fn with_defaults() -> Arc<Self> {
        Self::new(BusConfig::default())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BusState>> {
        self.state
            .lock()
            .map_err(|_| Error::Dependency("bus state lock poisoned".to_string()))
    }

    /// Starts the dispatcher task. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if internal state is unavailable.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.lock()?;
            if state.running {
                return Ok(());
            }
            state.running = true;
        }
        let bus = Arc::clone(self);
        let handle = tokio::spawn(async move {
            bus.run_dispatcher().await;
        });
        if let Ok(mut slot) = self.dispatcher.lock() {
            *slot = Some(handle);
        }
        tracing::info!("message bus started");
        Ok(())
    }

    /// Stops the dispatcher task, letting an in-flight delivery finish.
    ///
    /// # Errors
    ///
    /// Returns an error if internal state is unavailable.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.lock()?;
            if !state.running {
                return Ok(());
            }
            state.running = false;
        }
        self.notify.notify_waiters();
        let handle = self
            .dispatcher
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!("message bus stopped");
        Ok(())
    }

    async fn run_dispatcher(self: Arc<Self>) {
        loop {
            let message = {
                let Ok(mut state) = self.lock() else { break };
                if !state.running {
                    break;
                }
                let mut popped = None;
                for priority in MessagePriority::DISPATCH_ORDER {
                    if let Some(msg) = state.queues[priority.queue_index()].pop_front() {
                        popped = Some(msg);
                        break;
                    }
                }
                popped
            };

            match message {
                Some(msg) => self.deliver(msg).await,
                None => self.notify.notified().await,
            }
        }
    }

    /// Delivers one message to every matching subscription.
    async fn deliver(&self, message: Message) {
        // TTL check happens at dispatch time, not publish time.
        if message.is_expired(Utc::now()) {
            tracing::debug!(id = %message.id, topic = %message.topic, "message expired");
            if let Ok(mut state) = self.lock() {
                state.stats.messages_expired += 1;
            }
            return;
        }

        let matching: Vec<Subscription> = {
            let Ok(state) = self.lock() else { return };
            state
                .subscriptions
                .iter()
                .filter(|(pattern, _)| topic_matches(&message.topic, pattern))
                .flat_map(|(_, subs)| subs.iter().cloned())
                .collect()
        };

        if matching.is_empty() {
            tracing::debug!(topic = %message.topic, "no subscribers");
            return;
        }

        for subscription in matching {
            if self.breaker_is_open(&subscription.subscriber_id) {
                tracing::warn!(
                    subscriber = %subscription.subscriber_id,
                    "circuit breaker open, skipping delivery"
                );
                if let Ok(mut state) = self.lock() {
                    state.stats.messages_failed += 1;
                }
                continue;
            }

            let outcome = (subscription.handler)(message.clone()).await;
            match outcome {
                Ok(()) => {
                    if let Ok(mut state) = self.lock() {
                        state.stats.messages_processed += 1;
                        state
                            .breakers
                            .entry(subscription.subscriber_id.clone())
                            .and_modify(|b| {
                                b.state = BreakerState::Closed;
                                b.failure_count = 0;
                            });
                    }
                }
                Err(error) => {
                    tracing::error!(
                        subscriber = %subscription.subscriber_id,
                        %error,
                        "subscriber failed"
                    );
                    self.record_failure(&subscription, &message, error);
                }
            }
        }
    }

    fn breaker_is_open(&self, subscriber_id: &str) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        let Some(breaker) = state.breakers.get_mut(subscriber_id) else {
            return false;
        };
        if breaker.state == BreakerState::Open {
            let elapsed = breaker.last_failure.map(|t| t.elapsed());
            if elapsed.is_some_and(|e| e > self.config.breaker_timeout) {
                breaker.state = BreakerState::HalfOpen;
                return false;
            }
            return true;
        }
        false
    }

    fn record_failure(&self, subscription: &Subscription, message: &Message, error: String) {
        let Ok(mut state) = self.lock() else { return };
        state.stats.messages_failed += 1;

        let threshold = self.config.breaker_threshold;
        let breaker = state
            .breakers
            .entry(subscription.subscriber_id.clone())
            .or_insert_with(CircuitBreaker::new);
        breaker.failure_count += 1;
        breaker.last_failure = Some(Instant::now());
        if breaker.failure_count >= threshold {
            breaker.state = BreakerState::Open;
            tracing::warn!(subscriber = %subscription.subscriber_id, "circuit breaker opened");
        }

        let ring = self.config.ring_size;
        if state.dead_letter.len() >= ring {
            state.dead_letter.pop_front();
        }
        state.dead_letter.push_back(DeadLetter {
            message: message.clone(),
            subscriber_id: subscription.subscriber_id.clone(),
            topic_pattern: subscription.topic_pattern.clone(),
            error,
            timestamp: Utc::now(),
        });
    }

    /// Publishes a message. Delivery problems never surface here.
    ///
    /// Returns the message id.
    ///
    /// # Errors
    ///
    /// Returns an error only if internal state is unavailable.
    pub fn publish(&self, spec: Publish) -> Result<Uuid> {
        let message = Message {
            id: Uuid::new_v4(),
            message_type: spec.message_type,
            priority: spec.priority,
            source: spec.source,
            target: spec.target,
            topic: spec.topic,
            payload: spec.payload,
            timestamp: Utc::now(),
            correlation_id: spec.correlation_id,
            reply_to: spec.reply_to,
            ttl_secs: spec.ttl_secs,
        };
        let id = message.id;

        {
            let mut state = self.lock()?;
            let queue = &mut state.queues[spec.priority.queue_index()];
            if queue.len() >= self.config.max_queue_size {
                queue.pop_front();
            }
            queue.push_back(message.clone());

            let ring = self.config.ring_size;
            if state.history.len() >= ring {
                state.history.pop_front();
            }
            state.history.push_back(message);
            state.stats.messages_sent += 1;
        }

        self.notify.notify_one();
        Ok(id)
    }

    /// Subscribes a handler to a topic pattern.
    ///
    /// Patterns: exact topic, `prefix*`, `*suffix`, or `*`. No infix
    /// wildcards. Returns the subscription id for `unsubscribe`.
    ///
    /// # Errors
    ///
    /// Returns an error only if internal state is unavailable.
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        topic_pattern: impl Into<String>,
        handler: Handler,
    ) -> Result<String> {
        let subscriber_id = subscriber_id.into();
        let topic_pattern = topic_pattern.into();
        let subscription_id = format!("{subscriber_id}:{topic_pattern}");

        let mut state = self.lock()?;
        state
            .subscriptions
            .entry(topic_pattern.clone())
            .or_default()
            .push(Subscription {
                subscriber_id: subscriber_id.clone(),
                topic_pattern,
                handler,
            });
        state.stats.subscriptions_active += 1;
        tracing::debug!(subscriber = %subscriber_id, "subscribed");
        Ok(subscription_id)
    }

    /// Removes a subscription by id (`subscriber:pattern`).
    ///
    /// # Errors
    ///
    /// Returns an error only if internal state is unavailable.
    pub fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        let Some((subscriber_id, pattern)) = subscription_id.split_once(':') else {
            return Err(Error::invalid_input(format!(
                "bad subscription id {subscription_id}"
            )));
        };

        let mut state = self.lock()?;
        if let Some(subs) = state.subscriptions.get_mut(pattern) {
            let before = subs.len();
            subs.retain(|s| s.subscriber_id != subscriber_id);
            let removed = (before - subs.len()) as u64;
            if subs.is_empty() {
                state.subscriptions.remove(pattern);
            }
            state.stats.subscriptions_active =
                state.stats.subscriptions_active.saturating_sub(removed);
        }
        Ok(())
    }

    /// Sends a request and waits for the correlated response.
    ///
    /// Subscribes a one-shot handler on a unique reply topic, publishes
    /// the request, and waits up to `timeout`. The reply subscription is
    /// always removed, on response and on timeout alike.
    ///
    /// Returns `None` when no response arrived in time.
    ///
    /// # Errors
    ///
    /// Returns an error only if internal state is unavailable.
    pub async fn request(
        &self,
        topic: impl Into<String>,
        payload: Payload,
        source: impl Into<String>,
        target: Option<String>,
        timeout: Duration,
        priority: MessagePriority,
    ) -> Result<Option<Message>> {
        let correlation_id = Uuid::new_v4().to_string();
        let reply_topic = format!("reply:{correlation_id}");

        let (tx, rx) = tokio::sync::oneshot::channel::<Message>();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let handler_slot = Arc::clone(&slot);
        let handler: Handler = Arc::new(move |message: Message| {
            let slot = Arc::clone(&handler_slot);
            Box::pin(async move {
                if let Ok(mut guard) = slot.lock()
                    && let Some(tx) = guard.take()
                {
                    let _ = tx.send(message);
                }
                Ok(())
            })
        });

        // Subscriber ids must not contain ':' (it delimits the
        // subscription id), so the correlation id is joined with '-'.
        let subscription_id = self.subscribe(
            format!("request-{correlation_id}"),
            reply_topic.clone(),
            handler,
        )?;

        let topic = topic.into();
        let publish_result = self.publish(Publish {
            topic: topic.clone(),
            payload,
            message_type: MessageType::Request,
            priority,
            source: source.into(),
            target,
            correlation_id: Some(correlation_id),
            reply_to: Some(reply_topic),
            ttl_secs: None,
        });

        let response = match publish_result {
            Ok(_) => match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(message)) => Some(message),
                Ok(Err(_)) | Err(_) => {
                    tracing::warn!(%topic, "request timed out");
                    None
                }
            },
            Err(e) => {
                self.unsubscribe(&subscription_id)?;
                return Err(e);
            }
        };

        self.unsubscribe(&subscription_id)?;
        Ok(response)
    }

    /// Publishes a response correlated to a request message.
    ///
    /// No-op when the request has no `reply_to`.
    ///
    /// # Errors
    ///
    /// Returns an error only if internal state is unavailable.
    pub fn respond(&self, request: &Message, source: &str, payload: Payload) -> Result<()> {
        let Some(reply_to) = &request.reply_to else {
            return Ok(());
        };
        self.publish(Publish {
            topic: reply_to.clone(),
            payload,
            message_type: MessageType::Response,
            priority: request.priority,
            source: source.to_string(),
            target: Some(request.source.clone()),
            correlation_id: request.correlation_id.clone(),
            reply_to: None,
            ttl_secs: None,
        })?;
        Ok(())
    }

    /// Current counters.
    ///
    /// # Errors
    ///
    /// Returns an error only if internal state is unavailable.
    pub fn stats(&self) -> Result<BusStats> {
        Ok(self.lock()?.stats)
    }

    /// Snapshot of the dead-letter ring.
    ///
    /// # Errors
    ///
    /// Returns an error only if internal state is unavailable.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.lock()?.dead_letter.iter().cloned().collect())
    }

    /// Number of live subscriptions (for leak checks).
    ///
    /// # Errors
    ///
    /// Returns an error only if internal state is unavailable.
    pub fn subscription_count(&self) -> Result<usize> {
        Ok(self.lock()?.subscriptions.values().map(Vec::len).sum())
    }
}

/// Checks whether a topic matches a subscription pattern.
///
/// Supported patterns: `*` (everything), `prefix*`, `*suffix`, and exact
/// topics. No infix wildcards.
#[must_use]
pub fn topic_matches(topic: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return topic.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return topic.ends_with(suffix);
    }
    topic == pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_handler(log: Arc<Mutex<Vec<String>>>) -> Handler {
        Arc::new(move |message: Message| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                if let Ok(mut guard) = log.lock() {
                    guard.push(message.topic.clone());
                }
                Ok(())
            })
        })
    }

    fn failing_handler() -> Handler {
        Arc::new(|_message: Message| Box::pin(async { Err("boom".to_string()) }))
    }

    async fn drain(bus: &Arc<MessageBus>) {
        // The dispatcher runs on the same runtime; yielding a few times
        // lets it drain small queues deterministically.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("a.b", "a.b"));
        assert!(!topic_matches("a.b", "a.c"));
        assert!(topic_matches("a.b", "a.*"));
        assert!(topic_matches("ingestion.completed", "*completed"));
        assert!(topic_matches("anything", "*"));
        assert!(!topic_matches("a.b.c", "a.*c.d"));
    }

    #[tokio::test]
    async fn test_priority_dispatch_order() {
        let bus = MessageBus::with_defaults();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("recorder", "*", recording_handler(Arc::clone(&log)))
            .expect("subscribe");

        // Enqueue before the dispatcher starts so ordering is decided
        // purely by priority.
        for (topic, priority) in [
            ("critical", MessagePriority::Critical),
            ("low", MessagePriority::Low),
            ("high", MessagePriority::High),
            ("normal", MessagePriority::Normal),
        ] {
            bus.publish(Publish::event(topic, Payload::new()).priority(priority))
                .expect("publish");
        }

        bus.start().expect("start");
        drain(&bus).await;
        bus.stop().await.expect("stop");

        let order = log.lock().expect("log").clone();
        assert_eq!(order, vec!["critical", "high", "normal", "low"]);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let bus = MessageBus::with_defaults();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("recorder", "*", recording_handler(Arc::clone(&log)))
            .expect("subscribe");

        bus.publish(Publish::event("stale", Payload::new()).ttl_secs(0.1))
            .expect("publish");
        tokio::time::sleep(Duration::from_millis(250)).await;

        bus.start().expect("start");
        drain(&bus).await;
        bus.stop().await.expect("stop");

        assert!(log.lock().expect("log").is_empty());
        let stats = bus.stats().expect("stats");
        assert_eq!(stats.messages_expired, 1);
    }

    #[tokio::test]
    async fn test_subscriber_error_isolated_and_dead_lettered() {
        let bus = MessageBus::with_defaults();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("bad", "topic", failing_handler())
            .expect("subscribe");
        bus.subscribe("good", "topic", recording_handler(Arc::clone(&log)))
            .expect("subscribe");

        bus.start().expect("start");
        bus.publish(Publish::event("topic", Payload::new()))
            .expect("publish");
        drain(&bus).await;
        bus.stop().await.expect("stop");

        // The healthy subscriber still received the message.
        assert_eq!(log.lock().expect("log").len(), 1);
        let letters = bus.dead_letters().expect("dead letters");
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].subscriber_id, "bad");
        assert_eq!(letters[0].error, "boom");
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_and_recovers() {
        let bus = MessageBus::new(BusConfig {
            breaker_timeout: Duration::from_millis(200),
            ..BusConfig::default()
        });
        bus.subscribe("flaky", "t", failing_handler())
            .expect("subscribe");
        bus.start().expect("start");

        for _ in 0..5 {
            bus.publish(Publish::event("t", Payload::new()))
                .expect("publish");
        }
        drain(&bus).await;
        assert_eq!(bus.dead_letters().expect("letters").len(), 5);

        // Breaker is open: the 6th message is skipped, not delivered.
        bus.publish(Publish::event("t", Payload::new()))
            .expect("publish");
        drain(&bus).await;
        assert_eq!(bus.dead_letters().expect("letters").len(), 5);
        let failed_while_open = bus.stats().expect("stats").messages_failed;
        assert_eq!(failed_while_open, 6); // 5 handler errors + 1 skip

        // After the breaker window the next message is attempted again.
        tokio::time::sleep(Duration::from_millis(250)).await;
        bus.publish(Publish::event("t", Payload::new()))
            .expect("publish");
        drain(&bus).await;
        assert_eq!(bus.dead_letters().expect("letters").len(), 6);

        bus.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let bus = MessageBus::with_defaults();
        let responder_bus = Arc::clone(&bus);
        let handler: Handler = Arc::new(move |message: Message| {
            let bus = Arc::clone(&responder_bus);
            Box::pin(async move {
                let mut payload = Payload::new();
                payload.insert("echo".to_string(), serde_json::json!(message.topic));
                bus.respond(&message, "echo-agent", payload)
                    .map_err(|e| e.to_string())
            })
        });
        bus.subscribe("echo-agent", "echo.request", handler)
            .expect("subscribe");
        bus.start().expect("start");

        let response = bus
            .request(
                "echo.request",
                Payload::new(),
                "tester",
                None,
                Duration::from_secs(1),
                MessagePriority::Normal,
            )
            .await
            .expect("request");

        let response = response.expect("response received");
        assert_eq!(response.message_type, MessageType::Response);
        assert_eq!(
            response.payload.get("echo").and_then(|v| v.as_str()),
            Some("echo.request")
        );
        assert!(response.correlation_id.is_some());

        // Only the original subscription remains.
        assert_eq!(bus.subscription_count().expect("count"), 1);
        bus.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn test_request_timeout_cleans_subscription() {
        let bus = MessageBus::with_defaults();
        bus.start().expect("start");

        let started = Instant::now();
        let response = bus
            .request(
                "nobody.home",
                Payload::new(),
                "tester",
                None,
                Duration::from_millis(200),
                MessagePriority::Normal,
            )
            .await
            .expect("request");

        assert!(response.is_none());
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(bus.subscription_count().expect("count"), 0);
        bus.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn test_queue_overflow_drops_oldest() {
        let bus = MessageBus::new(BusConfig {
            max_queue_size: 2,
            ..BusConfig::default()
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("recorder", "*", recording_handler(Arc::clone(&log)))
            .expect("subscribe");

        for topic in ["first", "second", "third"] {
            bus.publish(Publish::event(topic, Payload::new()))
                .expect("publish");
        }
        bus.start().expect("start");
        drain(&bus).await;
        bus.stop().await.expect("stop");

        let order = log.lock().expect("log").clone();
        assert_eq!(order, vec!["second", "third"]);
    }
}
