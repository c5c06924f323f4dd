use bytes::{Buf, BytesMut};
use std::io;

/// A RESP2 value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// +OK\r\n
    SimpleString(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n  or  $-1\r\n (null)
    BulkString(Option<Vec<u8>>),
    /// *2\r\n...  or  *-1\r\n (null)
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    pub fn null_bulk_string() -> Self {
        RespValue::BulkString(None)
    }

    pub fn null_array() -> Self {
        RespValue::Array(None)
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        RespValue::Array(Some(items))
    }

    /// Serialize this value to RESP bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Write RESP bytes into the given buffer.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                buf.push(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(None) => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            RespValue::BulkString(Some(data)) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Array(None) => {
                buf.extend_from_slice(b"*-1\r\n");
            }
            RespValue::Array(Some(items)) => {
                buf.push(b'*');
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for item in items {
                    item.write_to(buf);
                }
            }
        }
    }

    /// Try to interpret this value as a byte string.
    pub fn as_str(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(data)) => Some(data),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Convert to a UTF-8 string, if possible.
    pub fn to_string_lossy(&self) -> Option<String> {
        self.as_str()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// Encode a command as a RESP array of bulk strings: `*N\r\n$len\r\narg\r\n...`.
///
/// Arguments are raw byte sequences; CR, LF, and NUL inside an argument are
/// fine because every entry is length-prefixed. Numeric arguments must be
/// stringified by the caller.
pub fn encode_command(name: &str, args: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    buf.push(b'*');
    buf.extend_from_slice((args.len() + 1).to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    write_bulk(&mut buf, name.as_bytes());
    for arg in args {
        write_bulk(&mut buf, arg);
    }
    buf
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(b'$');
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

/// Streaming RESP parser.
///
/// Handles partial reads — call `parse()` repeatedly as data arrives.
/// Returns `Ok(Some(value))` when a complete value is parsed,
/// `Ok(None)` when more data is needed. Incomplete input never consumes
/// bytes, so a reply fed in arbitrary fragments yields the same value as
/// a reply fed whole.
///
/// Any framing violation (unknown type byte, malformed or overflowing
/// length field, negative length other than -1, missing bulk trailer) is
/// an error; the connection that fed the bytes cannot be resynchronized
/// and must be torn down.
pub struct RespParser;

impl RespParser {
    /// Try to parse a complete RESP value from the buffer.
    /// On success, consumes the parsed bytes from `buf` and returns the value.
    /// Returns `Ok(None)` if the buffer doesn't contain a complete value yet.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        if buf.is_empty() {
            return Ok(None);
        }
        Self::parse_value(buf)
    }

    fn parse_value(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        if buf.is_empty() {
            return Ok(None);
        }

        match buf[0] {
            b'+' => Self::parse_simple_string(buf),
            b'-' => Self::parse_error(buf),
            b':' => Self::parse_integer(buf),
            b'$' => Self::parse_bulk_string(buf),
            b'*' => Self::parse_array(buf),
            other => Err(RespError::InvalidByte(other)),
        }
    }

    fn parse_simple_string(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        if let Some(end) = find_crlf_from(buf, 1) {
            let s = String::from_utf8_lossy(&buf[1..end]).to_string();
            buf.advance(end + 2);
            Ok(Some(RespValue::SimpleString(s)))
        } else {
            Ok(None)
        }
    }

    fn parse_error(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        if let Some(end) = find_crlf_from(buf, 1) {
            let s = String::from_utf8_lossy(&buf[1..end]).to_string();
            buf.advance(end + 2);
            Ok(Some(RespValue::Error(s)))
        } else {
            Ok(None)
        }
    }

    fn parse_integer(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        if let Some(end) = find_crlf_from(buf, 1) {
            let s = std::str::from_utf8(&buf[1..end])
                .map_err(|_| RespError::InvalidData("invalid integer encoding".into()))?;
            let n: i64 = s
                .parse()
                .map_err(|_| RespError::InvalidData(format!("invalid integer: {s}")))?;
            buf.advance(end + 2);
            Ok(Some(RespValue::Integer(n)))
        } else {
            Ok(None)
        }
    }

    fn parse_bulk_string(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        let crlf = match find_crlf_from(buf, 1) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let len_str = std::str::from_utf8(&buf[1..crlf])
            .map_err(|_| RespError::InvalidData("invalid bulk length".into()))?;
        let len: i64 = len_str
            .parse()
            .map_err(|_| RespError::InvalidData("invalid bulk length".into()))?;

        if len == -1 {
            buf.advance(crlf + 2);
            return Ok(Some(RespValue::BulkString(None)));
        }

        if len < -1 {
            return Err(RespError::InvalidData("invalid bulk length".into()));
        }

        if len > 512 * 1024 * 1024 {
            // 512MB max bulk string length
            return Err(RespError::InvalidData("invalid bulk length".into()));
        }
        let len = len as usize;
        let total_needed = crlf + 2 + len + 2; // header + data + trailing \r\n

        if buf.len() < total_needed {
            return Ok(None);
        }

        let data = buf[crlf + 2..crlf + 2 + len].to_vec();

        // Verify trailing \r\n
        if buf[crlf + 2 + len] != b'\r' || buf[crlf + 2 + len + 1] != b'\n' {
            return Err(RespError::InvalidData(
                "missing trailing CRLF after bulk string".into(),
            ));
        }

        buf.advance(total_needed);
        Ok(Some(RespValue::BulkString(Some(data))))
    }

    fn parse_array(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        let crlf = match find_crlf_from(buf, 1) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let len_str = std::str::from_utf8(&buf[1..crlf])
            .map_err(|_| RespError::InvalidData("invalid array length encoding".into()))?;
        let len: i64 = len_str
            .parse()
            .map_err(|_| RespError::InvalidData("invalid multibulk length".into()))?;

        if len == -1 {
            buf.advance(crlf + 2);
            return Ok(Some(RespValue::Array(None)));
        }

        if len < -1 {
            return Err(RespError::InvalidData("invalid multibulk length".into()));
        }

        if len > 1024 * 1024 {
            return Err(RespError::InvalidData("invalid multibulk length".into()));
        }

        let len = len as usize;

        // We need to try parsing all elements.
        // Save the current position so we can restore if we don't have enough data.
        let saved = buf.clone();
        buf.advance(crlf + 2);

        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            match Self::parse_value(buf) {
                Ok(Some(val)) => items.push(val),
                Ok(None) => {
                    // Not enough data — restore buffer
                    *buf = saved;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Some(RespValue::Array(Some(items))))
    }
}

/// Find \r\n starting from the given position.
fn find_crlf_from(buf: &[u8], start: usize) -> Option<usize> {
    if buf.len() < start + 2 {
        return None;
    }
    for i in start..buf.len() - 1 {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
    }
    None
}

#[derive(Debug, thiserror::Error)]
pub enum RespError {
    #[error("unexpected type byte '{}'", *.0 as char)]
    InvalidByte(u8),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
