use tokio::sync::oneshot;

use crate::error::ScarletResult;
use crate::resp::RespValue;

/// Connection lifecycle states.
///
/// `PubSub` carries the number of active channel plus pattern subscriptions;
/// when it reaches zero the connection drops back to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    InTransaction,
    PubSub(usize),
    Closed,
}

impl ConnectionState {
    pub fn is_pubsub(&self) -> bool {
        matches!(self, ConnectionState::PubSub(_))
    }
}

/// One in-flight request: written to the socket, reply not yet received.
///
/// The pending queue is strictly FIFO; the head always corresponds to the
/// next non-pub/sub reply the server sends. Cancellation is "mark and
/// discard": a caller that drops its future leaves the entry in place, and
/// the reply is discarded when `completion.send` fails against the dropped
/// receiver.
#[derive(Debug)]
pub struct PendingRequest {
    /// Human-readable command summary, for logs.
    pub label: String,
    pub completion: oneshot::Sender<ScarletResult<RespValue>>,
    /// Set for MULTI: an error reply means the server refused the
    /// transaction and the connection falls back to `Ready`.
    pub enters_transaction: bool,
    /// Set for EXEC and DISCARD: resolving this entry ends the transaction
    /// and returns the connection to `Ready`.
    pub exits_transaction: bool,
}

/// Commands the server accepts while the connection is in pub/sub mode.
pub fn is_pubsub_safe(cmd: &str) -> bool {
    matches!(
        cmd.to_ascii_uppercase().as_str(),
        "SUBSCRIBE" | "PSUBSCRIBE" | "UNSUBSCRIBE" | "PUNSUBSCRIBE" | "PING" | "QUIT"
    )
}

/// Subscription-admin commands. These never take a pending-queue slot: the
/// server answers with one ack per channel, which would break the
/// one-reply-per-entry rule, so their acks route through the subscription
/// registry instead.
pub fn is_subscription_admin(cmd: &str) -> bool {
    matches!(
        cmd.to_ascii_uppercase().as_str(),
        "SUBSCRIBE" | "PSUBSCRIBE" | "UNSUBSCRIBE" | "PUNSUBSCRIBE"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubsub_safe_set() {
        assert!(is_pubsub_safe("subscribe"));
        assert!(is_pubsub_safe("PING"));
        assert!(is_pubsub_safe("quit"));
        assert!(!is_pubsub_safe("GET"));
        assert!(!is_pubsub_safe("MULTI"));
    }

    #[test]
    fn test_subscription_admin_set() {
        assert!(is_subscription_admin("PSUBSCRIBE"));
        assert!(is_subscription_admin("punsubscribe"));
        assert!(!is_subscription_admin("PING"));
    }
}
