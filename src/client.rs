use std::collections::VecDeque;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection::{is_pubsub_safe, is_subscription_admin, ConnectionState, PendingRequest};
use crate::error::{ScarletError, ScarletResult};
use crate::pubsub::{
    MessageReceiver, Subscription, SubscriptionKind, SubscriptionRegistry,
};
use crate::resp::{encode_command, RespParser, RespValue};

/// A single Redis connection: pipelined request/response plus pub/sub.
///
/// `Client` is a cheap handle (clone freely); all connection state lives
/// behind one lock shared with the read task. Commands are written in
/// submission order and replies are matched to requests strictly FIFO, so
/// many `execute_command` calls may be in flight at once.
///
/// Dropping a future returned by [`Client::execute_command`] cancels the
/// caller's interest but not the command itself: the entry stays in the
/// pending queue and its reply is discarded on arrival, keeping the stream
/// aligned.
#[derive(Clone)]
pub struct Client {
    config: Arc<Config>,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

struct Inner {
    state: ConnectionState,
    writer: Option<OwnedWriteHalf>,
    pending: VecDeque<PendingRequest>,
    subs: SubscriptionRegistry,
    disconnect_listeners: Vec<mpsc::UnboundedSender<()>>,
}

impl Inner {
    fn new() -> Self {
        Inner {
            state: ConnectionState::Disconnected,
            writer: None,
            pending: VecDeque::new(),
            subs: SubscriptionRegistry::new(),
            disconnect_listeners: Vec::new(),
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> ScarletResult<()> {
        let writer = self.writer.as_mut().ok_or(ScarletError::Disconnected)?;
        if let Err(e) = writer.write_all(frame).await {
            self.abort(ConnectionState::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    /// Write a frame and park a pending-queue entry for its reply. The entry
    /// is pushed under the same lock as the write, so the queue order always
    /// matches the byte order on the wire.
    async fn send_request(
        &mut self,
        label: String,
        frame: &[u8],
    ) -> ScarletResult<oneshot::Receiver<ScarletResult<RespValue>>> {
        let (tx, rx) = oneshot::channel();
        let enters_transaction = label == "MULTI";
        let exits_transaction = label == "EXEC" || label == "DISCARD";
        self.write_frame(frame).await?;
        self.pending.push_back(PendingRequest {
            label,
            completion: tx,
            enters_transaction,
            exits_transaction,
        });
        Ok(rx)
    }

    /// Tear the connection down: fail every pending request, complete every
    /// subscription stream, notify disconnect listeners. Idempotent.
    fn abort(&mut self, final_state: ConnectionState) {
        if matches!(
            self.state,
            ConnectionState::Closed | ConnectionState::Disconnected
        ) {
            self.writer = None;
            return;
        }
        self.state = final_state;
        self.writer = None;
        for req in self.pending.drain(..) {
            debug!("failing in-flight {}", req.label);
            let _ = req.completion.send(Err(ScarletError::Disconnected));
        }
        self.subs.close_all();
        for tx in self.disconnect_listeners.drain(..) {
            let _ = tx.send(());
        }
    }
}

impl Client {
    /// Connect to the server named by `config`.
    ///
    /// If a password is configured, AUTH is issued first and the connection
    /// only becomes ready once the server answers OK.
    pub async fn connect(config: Config) -> ScarletResult<Client> {
        let client = Client {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner::new())),
        };

        let addr = client.config.addr();
        {
            client.inner.lock().await.state = ConnectionState::Connecting;
        }
        let stream = TcpStream::connect(&addr).await?;
        let (read_half, write_half) = stream.into_split();
        {
            let mut inner = client.inner.lock().await;
            inner.writer = Some(write_half);
        }
        tokio::spawn(read_loop(client.inner.clone(), read_half));

        if let Some(password) = client.config.password.clone() {
            if let Err(e) = client.authenticate(&password).await {
                client.disconnect().await;
                return Err(e);
            }
        }

        {
            let mut inner = client.inner.lock().await;
            if inner.state == ConnectionState::Connecting {
                inner.state = ConnectionState::Ready;
            }
        }
        info!("connected to {addr}");
        Ok(client)
    }

    async fn authenticate(&self, password: &str) -> ScarletResult<()> {
        let frame = match &self.config.username {
            Some(user) => encode_command("AUTH", &[user.as_bytes(), password.as_bytes()]),
            None => encode_command("AUTH", &[password.as_bytes()]),
        };
        let rx = {
            let mut inner = self.inner.lock().await;
            inner.send_request("AUTH".to_string(), &frame).await?
        };
        let reply = match rx.await {
            Ok(result) => result?,
            Err(_) => return Err(ScarletError::Disconnected),
        };
        match reply {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            other => Err(ScarletError::UnexpectedReply(format!(
                "AUTH answered {other:?}"
            ))),
        }
    }

    /// Send one command and wait for its reply. The central primitive: every
    /// typed wrapper funnels through here, and the engine treats the command
    /// as an opaque argument array except for the small reserved set that
    /// switches connection modes.
    ///
    /// Subscription-admin commands (`SUBSCRIBE`, `PSUBSCRIBE`, `UNSUBSCRIBE`,
    /// `PUNSUBSCRIBE`) resolve as soon as the write completes; the server
    /// acknowledges them with one reply per channel, which routes through the
    /// subscription registry rather than the pending queue.
    pub async fn execute_command(&self, cmd: &str, args: &[&[u8]]) -> ScarletResult<RespValue> {
        let cmd_upper = cmd.to_ascii_uppercase();
        let rx = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                ConnectionState::Disconnected | ConnectionState::Closed => {
                    return Err(ScarletError::Disconnected);
                }
                ConnectionState::Connecting => {
                    return Err(ScarletError::Misuse("connection not ready".to_string()));
                }
                ConnectionState::PubSub(_) if !is_pubsub_safe(&cmd_upper) => {
                    return Err(ScarletError::Misuse(format!(
                        "'{cmd_upper}' is not allowed in pub/sub mode"
                    )));
                }
                ConnectionState::InTransaction if cmd_upper == "MULTI" => {
                    return Err(ScarletError::Misuse(
                        "MULTI calls can not be nested".to_string(),
                    ));
                }
                ConnectionState::InTransaction if is_subscription_admin(&cmd_upper) => {
                    return Err(ScarletError::Misuse(format!(
                        "'{cmd_upper}' is not allowed inside MULTI"
                    )));
                }
                _ => {}
            }

            let frame = encode_command(cmd, args);

            if is_subscription_admin(&cmd_upper) {
                inner.write_frame(&frame).await?;
                debug!("wrote {cmd_upper}, acks route via registry");
                return Ok(RespValue::ok());
            }

            let rx = inner.send_request(cmd_upper.clone(), &frame).await?;

            if cmd_upper == "MULTI" {
                inner.state = ConnectionState::InTransaction;
            }

            let watermark = self.config.pipeline_watermark;
            if watermark > 0 && inner.pending.len() > watermark {
                warn!(
                    "pipeline depth {} exceeds watermark {watermark}",
                    inner.pending.len()
                );
            }
            rx
        };

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ScarletError::Disconnected),
        }
    }

    /// Subscribe to a channel. The returned handle's future is resolved on
    /// write completion; the server's ack is routed through the registry and
    /// flips the connection into pub/sub mode.
    pub async fn subscribe(&self, channel: &str) -> ScarletResult<Subscription> {
        self.subscribe_inner(channel, SubscriptionKind::Channel).await
    }

    /// Subscribe to a glob pattern.
    pub async fn psubscribe(&self, pattern: &str) -> ScarletResult<Subscription> {
        self.subscribe_inner(pattern, SubscriptionKind::Pattern).await
    }

    async fn subscribe_inner(
        &self,
        name: &str,
        kind: SubscriptionKind,
    ) -> ScarletResult<Subscription> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            ConnectionState::Disconnected | ConnectionState::Closed => {
                return Err(ScarletError::Disconnected);
            }
            ConnectionState::Connecting => {
                return Err(ScarletError::Misuse("connection not ready".to_string()));
            }
            ConnectionState::InTransaction => {
                return Err(ScarletError::Misuse(
                    "SUBSCRIBE is not allowed inside MULTI".to_string(),
                ));
            }
            ConnectionState::Ready | ConnectionState::PubSub(_) => {}
        }
        let rx = inner.subs.add_pending(name, kind);
        let cmd = match kind {
            SubscriptionKind::Channel => "SUBSCRIBE",
            SubscriptionKind::Pattern => "PSUBSCRIBE",
        };
        inner
            .write_frame(&encode_command(cmd, &[name.as_bytes()]))
            .await?;
        Ok(Subscription::new(name.to_string(), kind, rx))
    }

    /// Unsubscribe from a channel. Resolves on write completion; the ack
    /// completes the handle's message stream and, when it was the last
    /// subscription, returns the connection to `Ready`.
    pub async fn unsubscribe(&self, channel: &str) -> ScarletResult<()> {
        self.unsubscribe_inner(channel, SubscriptionKind::Channel)
            .await
    }

    /// Unsubscribe from a pattern.
    pub async fn punsubscribe(&self, pattern: &str) -> ScarletResult<()> {
        self.unsubscribe_inner(pattern, SubscriptionKind::Pattern)
            .await
    }

    async fn unsubscribe_inner(&self, name: &str, kind: SubscriptionKind) -> ScarletResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            ConnectionState::Disconnected | ConnectionState::Closed => {
                return Err(ScarletError::Disconnected);
            }
            _ => {}
        }
        let cmd = match kind {
            SubscriptionKind::Channel => "UNSUBSCRIBE",
            SubscriptionKind::Pattern => "PUNSUBSCRIBE",
        };
        inner
            .write_frame(&encode_command(cmd, &[name.as_bytes()]))
            .await
    }

    /// Half-close the socket and fail everything in flight. Further calls
    /// return `Disconnected`.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(mut writer) = inner.writer.take() {
            let _ = writer.shutdown().await;
        }
        inner.abort(ConnectionState::Closed);
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Number of requests written but not yet answered. Read-only; writes
    /// are never gated on it.
    pub async fn pipeline_depth(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Receive a notification when the connection goes away. Fires
    /// immediately if it already has.
    pub async fn on_disconnect(&self) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        if matches!(
            inner.state,
            ConnectionState::Disconnected | ConnectionState::Closed
        ) {
            let _ = tx.send(());
        } else {
            inner.disconnect_listeners.push(tx);
        }
        rx
    }

    /// Whole-connection message bus: every pub/sub message, regardless of
    /// channel. Predates per-channel [`Subscription`] handles and is kept
    /// for compatibility; new code should use [`Client::subscribe`].
    pub async fn on_message(&self) -> MessageReceiver {
        self.inner.lock().await.subs.add_bus_listener()
    }
}

/// Inbound pub/sub frames, as decoded from 3- or 4-element reply arrays.
#[derive(Debug, PartialEq)]
enum PubSubEvent {
    SubscribeAck {
        name: String,
        kind: SubscriptionKind,
    },
    UnsubscribeAck {
        name: String,
        kind: SubscriptionKind,
        remaining: i64,
    },
    Message {
        channel: String,
        payload: Vec<u8>,
    },
    PatternMessage {
        pattern: String,
        channel: String,
        payload: Vec<u8>,
    },
}

fn parse_pubsub_event(reply: &RespValue) -> Option<PubSubEvent> {
    let items = match reply {
        RespValue::Array(Some(items)) => items,
        _ => return None,
    };
    let tag = items.first()?.to_string_lossy()?.to_ascii_lowercase();
    match (tag.as_str(), items.len()) {
        ("subscribe", 3) | ("psubscribe", 3) => Some(PubSubEvent::SubscribeAck {
            name: items[1].to_string_lossy()?,
            kind: if tag == "psubscribe" {
                SubscriptionKind::Pattern
            } else {
                SubscriptionKind::Channel
            },
        }),
        ("unsubscribe", 3) | ("punsubscribe", 3) => Some(PubSubEvent::UnsubscribeAck {
            // A blanket unsubscribe with nothing subscribed acks with a nil
            // name; route it so the count still settles.
            name: items[1].to_string_lossy().unwrap_or_default(),
            kind: if tag == "punsubscribe" {
                SubscriptionKind::Pattern
            } else {
                SubscriptionKind::Channel
            },
            remaining: match items[2] {
                RespValue::Integer(n) => n,
                _ => return None,
            },
        }),
        ("message", 3) => Some(PubSubEvent::Message {
            channel: items[1].to_string_lossy()?,
            payload: items[2].as_str()?.to_vec(),
        }),
        ("pmessage", 4) => Some(PubSubEvent::PatternMessage {
            pattern: items[1].to_string_lossy()?,
            channel: items[2].to_string_lossy()?,
            payload: items[3].as_str()?.to_vec(),
        }),
        _ => None,
    }
}

async fn read_loop(inner: Arc<Mutex<Inner>>, mut reader: OwnedReadHalf) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        // Drain every complete reply before reading more bytes.
        loop {
            let reply = match RespParser::parse(&mut buf) {
                Ok(Some(reply)) => reply,
                Ok(None) => break,
                Err(e) => {
                    error!("framing error, closing connection: {e}");
                    inner.lock().await.abort(ConnectionState::Disconnected);
                    return;
                }
            };
            let mut guard = inner.lock().await;
            if let Err(e) = dispatch_reply(&mut guard, reply) {
                error!("dispatch failed, closing connection: {e}");
                guard.abort(ConnectionState::Disconnected);
                return;
            }
            if guard.state == ConnectionState::Closed {
                return;
            }
        }

        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("server closed connection");
                inner.lock().await.abort(ConnectionState::Disconnected);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("read error: {e}");
                inner.lock().await.abort(ConnectionState::Disconnected);
                return;
            }
        }
    }
}

fn dispatch_reply(inner: &mut Inner, reply: RespValue) -> ScarletResult<()> {
    if let Some(event) = parse_pubsub_event(&reply) {
        // Subscribe-family acks always belong to the registry: the commands
        // that trigger them never enter the pending queue, and the very
        // first ack arrives while the state is still Ready. Messages go to
        // the registry in pub/sub mode, or when nothing is in flight (a
        // straggler after the last unsubscribe).
        let routed = match event {
            PubSubEvent::SubscribeAck { .. } | PubSubEvent::UnsubscribeAck { .. } => true,
            PubSubEvent::Message { .. } | PubSubEvent::PatternMessage { .. } => {
                inner.state.is_pubsub() || inner.pending.is_empty()
            }
        };
        if routed {
            apply_pubsub_event(inner, event);
            return Ok(());
        }
    }

    let req = inner.pending.pop_front().ok_or_else(|| {
        ScarletError::Framing("reply received with no request in flight".to_string())
    })?;
    let result = match reply {
        RespValue::Error(text) => Err(ScarletError::from_error_reply(&text)),
        other => Ok(other),
    };
    if inner.state == ConnectionState::InTransaction {
        // EXEC/DISCARD replies end the transaction; a refused MULTI never
        // started one.
        if req.exits_transaction || (req.enters_transaction && result.is_err()) {
            inner.state = ConnectionState::Ready;
        }
    }
    // send fails if the caller dropped its future; the reply is discarded.
    let _ = req.completion.send(result);
    Ok(())
}

fn apply_pubsub_event(inner: &mut Inner, event: PubSubEvent) {
    match event {
        PubSubEvent::SubscribeAck { name, kind } => {
            let n = inner.subs.handle_subscribe_ack(&name, kind);
            if matches!(
                inner.state,
                ConnectionState::Ready | ConnectionState::PubSub(_)
            ) {
                inner.state = ConnectionState::PubSub(n);
            }
        }
        PubSubEvent::UnsubscribeAck {
            name,
            kind,
            remaining,
        } => {
            let n = inner.subs.handle_unsubscribe_ack(&name, kind);
            if remaining == 0 && n != 0 {
                // Trust the server's count over ours.
                warn!("server reports no subscriptions left, clearing {n} local handles");
                inner.subs.close_all();
            }
            if inner.state.is_pubsub() {
                inner.state = if n == 0 || remaining == 0 {
                    ConnectionState::Ready
                } else {
                    ConnectionState::PubSub(n)
                };
            }
        }
        PubSubEvent::Message { channel, payload } => {
            inner.subs.route_message(&channel, payload);
        }
        PubSubEvent::PatternMessage {
            pattern,
            channel,
            payload,
        } => {
            inner.subs.route_pattern_message(&pattern, &channel, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subscribe_ack() {
        let reply = RespValue::array(vec![
            RespValue::bulk_string(b"subscribe".to_vec()),
            RespValue::bulk_string(b"news".to_vec()),
            RespValue::integer(1),
        ]);
        assert_eq!(
            parse_pubsub_event(&reply),
            Some(PubSubEvent::SubscribeAck {
                name: "news".to_string(),
                kind: SubscriptionKind::Channel,
            })
        );
    }

    #[test]
    fn test_parse_punsubscribe_ack() {
        let reply = RespValue::array(vec![
            RespValue::bulk_string(b"punsubscribe".to_vec()),
            RespValue::bulk_string(b"news.*".to_vec()),
            RespValue::integer(0),
        ]);
        assert_eq!(
            parse_pubsub_event(&reply),
            Some(PubSubEvent::UnsubscribeAck {
                name: "news.*".to_string(),
                kind: SubscriptionKind::Pattern,
                remaining: 0,
            })
        );
    }

    #[test]
    fn test_parse_pmessage() {
        let reply = RespValue::array(vec![
            RespValue::bulk_string(b"pmessage".to_vec()),
            RespValue::bulk_string(b"news.*".to_vec()),
            RespValue::bulk_string(b"news.tech".to_vec()),
            RespValue::bulk_string(b"hi".to_vec()),
        ]);
        assert_eq!(
            parse_pubsub_event(&reply),
            Some(PubSubEvent::PatternMessage {
                pattern: "news.*".to_string(),
                channel: "news.tech".to_string(),
                payload: b"hi".to_vec(),
            })
        );
    }

    #[test]
    fn test_ordinary_replies_are_not_events() {
        assert_eq!(parse_pubsub_event(&RespValue::ok()), None);
        assert_eq!(parse_pubsub_event(&RespValue::integer(3)), None);
        // Wrong arity
        let reply = RespValue::array(vec![RespValue::bulk_string(b"message".to_vec())]);
        assert_eq!(parse_pubsub_event(&reply), None);
        // An ordinary two-element array
        let reply = RespValue::array(vec![
            RespValue::bulk_string(b"a".to_vec()),
            RespValue::bulk_string(b"b".to_vec()),
        ]);
        assert_eq!(parse_pubsub_event(&reply), None);
    }
}
