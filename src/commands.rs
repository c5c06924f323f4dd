//! Typed convenience wrappers. Each is a thin shim over
//! [`Client::execute_command`]; the engine itself treats every command as an
//! opaque argument array.

use crate::client::Client;
use crate::error::{ScarletError, ScarletResult};
use crate::resp::RespValue;

impl Client {
    /// Get the value of a key.
    pub async fn get(&self, key: impl AsRef<[u8]>) -> ScarletResult<Option<Vec<u8>>> {
        expect_bulk(self.execute_command("GET", &[key.as_ref()]).await?)
    }

    /// Set a key to a value.
    pub async fn set(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> ScarletResult<()> {
        expect_ok(
            self.execute_command("SET", &[key.as_ref(), value.as_ref()])
                .await?,
        )
    }

    /// Delete a key. Returns the number of keys removed.
    pub async fn del(&self, key: impl AsRef<[u8]>) -> ScarletResult<i64> {
        expect_int(self.execute_command("DEL", &[key.as_ref()]).await?)
    }

    /// Check whether a key exists.
    pub async fn exists(&self, key: impl AsRef<[u8]>) -> ScarletResult<bool> {
        expect_int(self.execute_command("EXISTS", &[key.as_ref()]).await?).map(|n| n > 0)
    }

    /// Increment the integer value of a key by one.
    pub async fn incr(&self, key: impl AsRef<[u8]>) -> ScarletResult<i64> {
        expect_int(self.execute_command("INCR", &[key.as_ref()]).await?)
    }

    /// Decrement the integer value of a key by one.
    pub async fn decr(&self, key: impl AsRef<[u8]>) -> ScarletResult<i64> {
        expect_int(self.execute_command("DECR", &[key.as_ref()]).await?)
    }

    /// Set a timeout on a key, in seconds. Returns true if the timeout was set.
    pub async fn expire(&self, key: impl AsRef<[u8]>, seconds: u64) -> ScarletResult<bool> {
        let secs = seconds.to_string();
        expect_int(
            self.execute_command("EXPIRE", &[key.as_ref(), secs.as_bytes()])
                .await?,
        )
        .map(|n| n == 1)
    }

    /// Remaining time to live of a key, in seconds.
    pub async fn ttl(&self, key: impl AsRef<[u8]>) -> ScarletResult<i64> {
        expect_int(self.execute_command("TTL", &[key.as_ref()]).await?)
    }

    /// Ping the server.
    pub async fn ping(&self) -> ScarletResult<()> {
        match self.execute_command("PING", &[]).await? {
            RespValue::SimpleString(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Echo a payload back from the server.
    pub async fn echo(&self, message: impl AsRef<[u8]>) -> ScarletResult<Vec<u8>> {
        match expect_bulk(self.execute_command("ECHO", &[message.as_ref()]).await?)? {
            Some(data) => Ok(data),
            None => Err(ScarletError::UnexpectedReply("ECHO answered nil".to_string())),
        }
    }

    /// Publish a message to a channel. Returns the number of receivers.
    pub async fn publish(
        &self,
        channel: impl AsRef<[u8]>,
        payload: impl AsRef<[u8]>,
    ) -> ScarletResult<i64> {
        expect_int(
            self.execute_command("PUBLISH", &[channel.as_ref(), payload.as_ref()])
                .await?,
        )
    }

    /// Delete every key in the current database.
    pub async fn flushdb(&self) -> ScarletResult<()> {
        expect_ok(self.execute_command("FLUSHDB", &[]).await?)
    }

    /// Number of keys in the current database.
    pub async fn dbsize(&self) -> ScarletResult<i64> {
        expect_int(self.execute_command("DBSIZE", &[]).await?)
    }
}

fn expect_ok(value: RespValue) -> ScarletResult<()> {
    match value {
        RespValue::SimpleString(_) => Ok(()),
        other => Err(unexpected(&other)),
    }
}

fn expect_int(value: RespValue) -> ScarletResult<i64> {
    match value {
        RespValue::Integer(n) => Ok(n),
        other => Err(unexpected(&other)),
    }
}

fn expect_bulk(value: RespValue) -> ScarletResult<Option<Vec<u8>>> {
    match value {
        RespValue::BulkString(data) => Ok(data),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(value: &RespValue) -> ScarletError {
    ScarletError::UnexpectedReply(format!("{value:?}"))
}
