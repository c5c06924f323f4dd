use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::client::Client;
use crate::error::{ScarletError, ScarletResult};
use crate::resp::RespValue;

/// Scoped handle for commands issued inside a MULTI/EXEC block.
///
/// Created by [`Client::transaction`]. Each [`queue`](Transaction::queue)
/// call sends its command immediately (the server answers `QUEUED`) and
/// returns a [`QueuedReply`] that resolves only when EXEC distributes the
/// result array, index for index, in submission order.
pub struct Transaction {
    client: Client,
    captured: Arc<Mutex<Vec<oneshot::Sender<ScarletResult<RespValue>>>>>,
    discarded: Arc<AtomicBool>,
}

/// The eventual result of one queued command.
pub struct QueuedReply {
    rx: oneshot::Receiver<ScarletResult<RespValue>>,
}

impl QueuedReply {
    /// Wait for the transaction to complete and yield this command's slot of
    /// the EXEC reply.
    pub async fn value(self) -> ScarletResult<RespValue> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ScarletError::TransactionAborted),
        }
    }
}

impl Transaction {
    /// Queue one command in the transaction.
    ///
    /// Fails if the server refuses to queue it (for example an unknown
    /// command name); Redis will then abort the whole block at EXEC.
    pub async fn queue(&self, cmd: &str, args: &[&[u8]]) -> ScarletResult<QueuedReply> {
        let status = self.client.execute_command(cmd, args).await?;
        match status {
            RespValue::SimpleString(s) if s == "QUEUED" => {}
            other => {
                return Err(ScarletError::UnexpectedReply(format!(
                    "expected QUEUED, got {other:?}"
                )));
            }
        }
        let (tx, rx) = oneshot::channel();
        self.captured.lock().await.push(tx);
        Ok(QueuedReply { rx })
    }

    /// Abandon the transaction: DISCARD is issued after the closure returns
    /// and every queued reply fails with `TransactionAborted`.
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::SeqCst);
    }
}

impl Client {
    /// Run `body` inside a MULTI/EXEC block.
    ///
    /// The closure queues commands through the [`Transaction`] handle; when
    /// it returns `Ok`, EXEC is issued and the i-th queued reply resolves
    /// with the i-th element of the EXEC array. If the closure errors or
    /// calls [`Transaction::discard`], DISCARD is issued and every queued
    /// reply fails with `TransactionAborted`.
    pub async fn transaction<F, Fut, T>(&self, body: F) -> ScarletResult<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: std::future::Future<Output = ScarletResult<T>>,
    {
        self.execute_command("MULTI", &[]).await?;

        let captured = Arc::new(Mutex::new(Vec::new()));
        let discarded = Arc::new(AtomicBool::new(false));
        let handle = Transaction {
            client: self.clone(),
            captured: captured.clone(),
            discarded: discarded.clone(),
        };

        let body_result = body(handle).await;

        let senders: Vec<_> = {
            let mut captured = captured.lock().await;
            captured.drain(..).collect()
        };

        if body_result.is_err() || discarded.load(Ordering::SeqCst) {
            debug!("discarding transaction with {} queued commands", senders.len());
            let _ = self.execute_command("DISCARD", &[]).await;
            fail_all(senders, || ScarletError::TransactionAborted);
            return body_result;
        }

        match self.execute_command("EXEC", &[]).await {
            Ok(RespValue::Array(Some(elems))) => {
                if elems.len() != senders.len() {
                    debug!(
                        "EXEC returned {} results for {} queued commands",
                        elems.len(),
                        senders.len()
                    );
                }
                let mut elems = elems.into_iter();
                for tx in senders {
                    let slot = match elems.next() {
                        Some(RespValue::Error(text)) => Err(ScarletError::from_error_reply(&text)),
                        Some(value) => Ok(value),
                        None => Err(ScarletError::TransactionAborted),
                    };
                    let _ = tx.send(slot);
                }
                body_result
            }
            // A nil EXEC reply means the server aborted the block.
            Ok(RespValue::Array(None)) => {
                fail_all(senders, || ScarletError::TransactionAborted);
                Err(ScarletError::TransactionAborted)
            }
            Ok(other) => {
                fail_all(senders, || ScarletError::TransactionAborted);
                Err(ScarletError::UnexpectedReply(format!(
                    "EXEC answered {other:?}"
                )))
            }
            Err(e) => {
                fail_all(senders, || ScarletError::TransactionAborted);
                Err(e)
            }
        }
    }
}

fn fail_all<F>(senders: Vec<oneshot::Sender<ScarletResult<RespValue>>>, err: F)
where
    F: Fn() -> ScarletError,
{
    for tx in senders {
        let _ = tx.send(Err(err()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_reply_fails_when_envelope_drops() {
        let (tx, rx) = oneshot::channel::<ScarletResult<RespValue>>();
        drop(tx);
        let queued = QueuedReply { rx };
        match queued.value().await {
            Err(ScarletError::TransactionAborted) => {}
            other => panic!("expected TransactionAborted, got {other:?}"),
        }
    }
}
