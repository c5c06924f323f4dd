use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Whether a subscription targets an exact channel or a glob pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Channel,
    Pattern,
}

/// A message pushed by the server on a subscribed channel.
///
/// `pattern` is set when the delivery came through a pattern subscription
/// (`pmessage`). The message carries only the channel/pattern names, never a
/// reference to the subscription or the connection, so holding one cannot
/// keep a closed connection alive.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: String,
    pub pattern: Option<String>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn is_pattern(&self) -> bool {
        self.pattern.is_some()
    }
}

pub type MessageSender = mpsc::UnboundedSender<Message>;
pub type MessageReceiver = mpsc::UnboundedReceiver<Message>;

/// User-facing handle for one channel or pattern subscription.
///
/// Messages arrive in server order. The stream ends (`next_message` returns
/// `None`) when the matching unsubscribe is acknowledged or the connection
/// drops.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    kind: SubscriptionKind,
    messages: MessageReceiver,
}

impl Subscription {
    pub(crate) fn new(channel: String, kind: SubscriptionKind, messages: MessageReceiver) -> Self {
        Subscription {
            channel,
            kind,
            messages,
        }
    }

    /// The channel name or pattern this handle was created for.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Wait for the next message. Returns `None` once the subscription has
    /// been torn down.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.messages.recv().await
    }
}

/// Registry for the client's channel and pattern subscriptions.
///
/// A subscription is *pending* between the SUBSCRIBE write and the server's
/// ack, and *active* from ack until the matching unsubscribe ack. The active
/// count drives the engine's `PubSub(n)` state.
pub struct SubscriptionRegistry {
    /// channel name -> live message sink
    channels: HashMap<String, MessageSender>,
    /// pattern -> live message sink
    patterns: HashMap<String, MessageSender>,
    /// channel name -> sink awaiting the subscribe ack
    pending_channels: HashMap<String, MessageSender>,
    /// pattern -> sink awaiting the psubscribe ack
    pending_patterns: HashMap<String, MessageSender>,
    /// Whole-connection message fan-out, kept for consumers that predate
    /// per-channel handles.
    bus: Vec<MessageSender>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        SubscriptionRegistry {
            channels: HashMap::new(),
            patterns: HashMap::new(),
            pending_channels: HashMap::new(),
            pending_patterns: HashMap::new(),
            bus: Vec::new(),
        }
    }

    /// Number of acknowledged subscriptions, channels plus patterns.
    pub fn active_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    /// Register a sink for a subscription whose SUBSCRIBE is about to be
    /// written. Returns the receiving end for the caller's handle.
    pub fn add_pending(&mut self, name: &str, kind: SubscriptionKind) -> MessageReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        match kind {
            SubscriptionKind::Channel => self.pending_channels.insert(name.to_string(), tx),
            SubscriptionKind::Pattern => self.pending_patterns.insert(name.to_string(), tx),
        };
        rx
    }

    /// Handle a `subscribe`/`psubscribe` ack. Promotes the pending sink to
    /// active, creating a detached one if the subscribe was issued raw
    /// (no handle was registered). Returns the new active count.
    pub fn handle_subscribe_ack(&mut self, name: &str, kind: SubscriptionKind) -> usize {
        let (pending, active) = match kind {
            SubscriptionKind::Channel => (&mut self.pending_channels, &mut self.channels),
            SubscriptionKind::Pattern => (&mut self.pending_patterns, &mut self.patterns),
        };
        if let Some(tx) = pending.remove(name) {
            active.insert(name.to_string(), tx);
        } else if !active.contains_key(name) {
            // Raw SUBSCRIBE without a handle: messages reach only the bus.
            let (tx, _rx) = mpsc::unbounded_channel();
            active.insert(name.to_string(), tx);
        }
        debug!("subscribed {name}, {} active", self.active_count());
        self.active_count()
    }

    /// Handle an `unsubscribe`/`punsubscribe` ack. Dropping the sink
    /// completes the handle's message stream. Returns the new active count.
    pub fn handle_unsubscribe_ack(&mut self, name: &str, kind: SubscriptionKind) -> usize {
        let (pending, active) = match kind {
            SubscriptionKind::Channel => (&mut self.pending_channels, &mut self.channels),
            SubscriptionKind::Pattern => (&mut self.pending_patterns, &mut self.patterns),
        };
        pending.remove(name);
        if active.remove(name).is_none() {
            debug!("unsubscribe ack for unknown {name}");
        }
        self.active_count()
    }

    /// Deliver a `message` frame to the channel's handle and the bus.
    pub fn route_message(&mut self, channel: &str, payload: Vec<u8>) {
        let msg = Message {
            channel: channel.to_string(),
            pattern: None,
            payload,
        };
        match self.channels.get(channel) {
            Some(tx) => {
                let _ = tx.send(msg.clone());
            }
            None => {
                error!("message for unknown channel {channel}, dropping");
            }
        }
        self.fan_out(msg);
    }

    /// Deliver a `pmessage` frame to the pattern's handle and the bus.
    pub fn route_pattern_message(&mut self, pattern: &str, channel: &str, payload: Vec<u8>) {
        let msg = Message {
            channel: channel.to_string(),
            pattern: Some(pattern.to_string()),
            payload,
        };
        match self.patterns.get(pattern) {
            Some(tx) => {
                let _ = tx.send(msg.clone());
            }
            None => {
                error!("pmessage for unknown pattern {pattern}, dropping");
            }
        }
        self.fan_out(msg);
    }

    /// Attach a listener to the whole-connection message bus.
    pub fn add_bus_listener(&mut self) -> MessageReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bus.push(tx);
        rx
    }

    fn fan_out(&mut self, msg: Message) {
        self.bus.retain(|tx| tx.send(msg.clone()).is_ok());
    }

    /// Drop every sink so all handle streams complete. Called when the
    /// connection goes away.
    pub fn close_all(&mut self) {
        self.channels.clear();
        self.patterns.clear();
        self.pending_channels.clear();
        self.pending_patterns.clear();
        self.bus.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_ack_promotes_pending() {
        let mut reg = SubscriptionRegistry::new();
        let mut rx = reg.add_pending("news", SubscriptionKind::Channel);
        assert_eq!(reg.active_count(), 0);

        assert_eq!(reg.handle_subscribe_ack("news", SubscriptionKind::Channel), 1);
        reg.route_message("news", b"hello".to_vec());

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.channel, "news");
        assert_eq!(msg.payload, b"hello");
        assert!(!msg.is_pattern());
    }

    #[test]
    fn test_unsubscribe_ack_completes_stream() {
        let mut reg = SubscriptionRegistry::new();
        let mut rx = reg.add_pending("news", SubscriptionKind::Channel);
        reg.handle_subscribe_ack("news", SubscriptionKind::Channel);

        assert_eq!(reg.handle_unsubscribe_ack("news", SubscriptionKind::Channel), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_pattern_message_carries_pattern() {
        let mut reg = SubscriptionRegistry::new();
        let mut rx = reg.add_pending("news.*", SubscriptionKind::Pattern);
        assert_eq!(reg.handle_subscribe_ack("news.*", SubscriptionKind::Pattern), 1);

        reg.route_pattern_message("news.*", "news.sports", b"goal".to_vec());
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.pattern.as_deref(), Some("news.*"));
        assert_eq!(msg.channel, "news.sports");
    }

    #[test]
    fn test_channel_and_pattern_counts_are_summed() {
        let mut reg = SubscriptionRegistry::new();
        let _a = reg.add_pending("a", SubscriptionKind::Channel);
        let _b = reg.add_pending("b.*", SubscriptionKind::Pattern);
        reg.handle_subscribe_ack("a", SubscriptionKind::Channel);
        assert_eq!(reg.handle_subscribe_ack("b.*", SubscriptionKind::Pattern), 2);
        assert_eq!(reg.handle_unsubscribe_ack("a", SubscriptionKind::Channel), 1);
    }

    #[test]
    fn test_raw_subscribe_creates_detached_handle() {
        let mut reg = SubscriptionRegistry::new();
        assert_eq!(reg.handle_subscribe_ack("raw", SubscriptionKind::Channel), 1);
        // No handle to receive, but the bus still sees the message.
        let mut bus = reg.add_bus_listener();
        reg.route_message("raw", b"x".to_vec());
        assert_eq!(bus.try_recv().unwrap().payload, b"x");
    }

    #[test]
    fn test_bus_sees_all_messages() {
        let mut reg = SubscriptionRegistry::new();
        let mut bus = reg.add_bus_listener();
        let _rx = reg.add_pending("a", SubscriptionKind::Channel);
        reg.handle_subscribe_ack("a", SubscriptionKind::Channel);

        reg.route_message("a", b"1".to_vec());
        reg.route_message("nobody-listens", b"2".to_vec());

        assert_eq!(bus.try_recv().unwrap().payload, b"1");
        assert_eq!(bus.try_recv().unwrap().payload, b"2");
    }

    #[test]
    fn test_close_all_completes_streams() {
        let mut reg = SubscriptionRegistry::new();
        let mut rx = reg.add_pending("a", SubscriptionKind::Channel);
        reg.handle_subscribe_ack("a", SubscriptionKind::Channel);
        reg.close_all();
        assert_eq!(reg.active_count(), 0);
        assert!(rx.try_recv().is_err());
    }
}
