//! RESP adapter for a remote secondary store.
//!
//! Speaks the Redis serialization protocol over blocking TCP with a small
//! pool of checked-out connections. Only the handful of commands the cache
//! needs are issued: `GET`, `SET` (with `EX`), `DEL`, `EXISTS`, `SCAN`,
//! plus `AUTH`/`PING` at connect time. Failures on the write side are
//! logged and swallowed; the cache never blocks on a broken overflow tier.

use crate::clock::{Clock, SystemClock};
use crate::config::SecondaryConfig;
use crate::error::{CacheError, CacheResult};
use crate::secondary::{spill_key, SecondaryStore, KEY_PREFIX};

use bytes::BytesMut;
use parking_lot::Mutex;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Connections opened eagerly when the config leaves `min_idle` at zero.
const DEFAULT_MIN_IDLE: usize = 5;

/// Idle connections retained when the config leaves `pool_size` at zero.
const DEFAULT_POOL_SIZE: usize = 20;

/// Read/write timeout applied to every pooled connection.
const IO_TIMEOUT: Duration = Duration::from_secs(3);

/// One parsed RESP reply.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

struct Conn {
    stream: BufReader<TcpStream>,
}

impl Conn {
    /// Send one command and read its reply.
    fn exchange(&mut self, args: &[&[u8]]) -> io::Result<Reply> {
        let mut buf = BytesMut::with_capacity(64);
        encode_command(&mut buf, args);
        self.stream.get_mut().write_all(&buf)?;
        read_reply(&mut self.stream)
    }
}

/// [`SecondaryStore`] backed by a RESP server such as Redis.
pub struct RespStore {
    addr: String,
    password: Option<String>,
    pool_size: usize,
    pool: Mutex<Vec<Conn>>,
}

static SHARED: OnceLock<Arc<RespStore>> = OnceLock::new();

impl RespStore {
    /// Connect to the store, eagerly opening the configured number of idle
    /// connections and verifying the server with a `PING`.
    pub fn connect(config: &SecondaryConfig) -> CacheResult<Self> {
        let min_idle = if config.min_idle == 0 {
            DEFAULT_MIN_IDLE
        } else {
            config.min_idle
        };
        let pool_size = if config.pool_size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            config.pool_size
        };

        let store = Self {
            addr: config.addr.clone(),
            password: config.password.clone(),
            pool_size,
            pool: Mutex::new(Vec::new()),
        };

        for _ in 0..min_idle.min(pool_size) {
            match store.open() {
                Ok(conn) => store.pool.lock().push(conn),
                Err(err) => {
                    tracing::warn!(addr = %store.addr, %err, "secondary store unreachable");
                    return Err(CacheError::SecondaryUnavailable);
                }
            }
        }
        tracing::debug!(addr = %store.addr, "connected to secondary store");
        Ok(store)
    }

    /// Process-wide shared instance: the first successful construction wins
    /// and every cache after that reuses its connection pool.
    pub fn shared(config: &SecondaryConfig) -> CacheResult<Arc<Self>> {
        if let Some(store) = SHARED.get() {
            return Ok(store.clone());
        }
        let store = Arc::new(Self::connect(config)?);
        Ok(SHARED.get_or_init(|| store).clone())
    }

    fn open(&self) -> io::Result<Conn> {
        let stream = TcpStream::connect(&self.addr)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut conn = Conn {
            stream: BufReader::new(stream),
        };
        if let Some(password) = &self.password {
            match conn.exchange(&[b"AUTH", password.as_bytes()])? {
                Reply::Simple(_) => {}
                other => return Err(protocol_error(&other)),
            }
        }
        match conn.exchange(&[b"PING"])? {
            Reply::Simple(_) => Ok(conn),
            other => Err(protocol_error(&other)),
        }
    }

    /// Issue one command on a pooled connection. A connection that errors
    /// is dropped rather than returned to the pool.
    fn command(&self, args: &[&[u8]]) -> io::Result<Reply> {
        let pooled = self.pool.lock().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => self.open()?,
        };
        match conn.exchange(args) {
            Ok(reply) => {
                let mut pool = self.pool.lock();
                if pool.len() < self.pool_size {
                    pool.push(conn);
                }
                Ok(reply)
            }
            Err(err) => Err(err),
        }
    }
}

impl SecondaryStore for RespStore {
    fn get(&self, fingerprint: u64) -> CacheResult<Vec<u8>> {
        let key = spill_key(fingerprint);
        match self.command(&[b"GET", key.as_bytes()]) {
            Ok(Reply::Bulk(Some(record))) => Ok(record),
            Ok(_) => Err(CacheError::KeyNotFound),
            Err(err) => {
                tracing::warn!(%err, "secondary get failed");
                Err(CacheError::SecondaryUnavailable)
            }
        }
    }

    fn set(&self, fingerprint: u64, record: &[u8], deadline: i64) {
        let key = spill_key(fingerprint);
        let result = if deadline == 0 {
            self.command(&[b"SET", key.as_bytes(), record])
        } else {
            let now = SystemClock.epoch();
            if deadline <= now {
                return;
            }
            let ttl = (deadline - now).to_string();
            self.command(&[b"SET", key.as_bytes(), record, b"EX", ttl.as_bytes()])
        };
        if let Err(err) = result {
            tracing::warn!(%err, "secondary set failed");
        }
    }

    fn del(&self, fingerprint: u64) {
        let key = spill_key(fingerprint);
        if let Err(err) = self.command(&[b"DEL", key.as_bytes()]) {
            tracing::warn!(%err, "secondary del failed");
        }
    }

    fn exists(&self, fingerprint: u64) -> bool {
        let key = spill_key(fingerprint);
        matches!(
            self.command(&[b"EXISTS", key.as_bytes()]),
            Ok(Reply::Integer(count)) if count != 0
        )
    }

    fn reset(&self) {
        let pattern = format!("{KEY_PREFIX}*");
        let mut cursor: Vec<u8> = b"0".to_vec();
        loop {
            let reply = match self.command(&[
                b"SCAN",
                &cursor,
                b"MATCH",
                pattern.as_bytes(),
                b"COUNT",
                b"10",
            ]) {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!(%err, "secondary reset aborted");
                    return;
                }
            };

            let Reply::Array(Some(mut items)) = reply else {
                return;
            };
            if items.len() != 2 {
                return;
            }
            let keys = items.pop();
            let next = items.pop();

            if let Some(Reply::Array(Some(keys))) = keys {
                for key in keys {
                    if let Reply::Bulk(Some(key)) = key {
                        let _ = self.command(&[b"DEL", &key]);
                    }
                }
            }
            match next {
                Some(Reply::Bulk(Some(next))) if next != b"0" => cursor = next,
                _ => return,
            }
        }
    }

    fn close(&self) {
        self.pool.lock().clear();
    }
}

/// Encode a command as a RESP array of bulk strings:
/// `*<argc>\r\n` then `$<len>\r\n<arg>\r\n` per argument.
fn encode_command(buf: &mut BytesMut, args: &[&[u8]]) {
    buf.extend_from_slice(b"*");
    push_decimal(buf, args.len() as u64);
    buf.extend_from_slice(b"\r\n");
    for arg in args {
        buf.extend_from_slice(b"$");
        push_decimal(buf, arg.len() as u64);
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
}

fn push_decimal(buf: &mut BytesMut, value: u64) {
    buf.extend_from_slice(value.to_string().as_bytes());
}

fn read_reply<R: BufRead>(reader: &mut R) -> io::Result<Reply> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    if line.len() < 3 || !line.ends_with(b"\r\n") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "truncated RESP line",
        ));
    }
    let rest = &line[1..line.len() - 2];

    match line[0] {
        b'+' => Ok(Reply::Simple(String::from_utf8_lossy(rest).into_owned())),
        b'-' => Ok(Reply::Error(String::from_utf8_lossy(rest).into_owned())),
        b':' => Ok(Reply::Integer(parse_int(rest)?)),
        b'$' => {
            let len = parse_int(rest)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            let mut data = vec![0; len as usize];
            reader.read_exact(&mut data)?;
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf)?;
            Ok(Reply::Bulk(Some(data)))
        }
        b'*' => {
            let len = parse_int(rest)?;
            if len < 0 {
                return Ok(Reply::Array(None));
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(read_reply(reader)?);
            }
            Ok(Reply::Array(Some(items)))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unknown RESP reply type",
        )),
    }
}

fn parse_int(digits: &[u8]) -> io::Result<i64> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad RESP integer"))
}

fn protocol_error(reply: &Reply) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("unexpected RESP reply: {reply:?}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(bytes: &[u8]) -> Reply {
        read_reply(&mut Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_encode_get_command() {
        let mut buf = BytesMut::new();
        encode_command(&mut buf, &[b"GET", b"ringcache::key::7"]);
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$17\r\nringcache::key::7\r\n");
    }

    #[test]
    fn test_encode_set_with_expiry() {
        let mut buf = BytesMut::new();
        encode_command(&mut buf, &[b"SET", b"k", b"v", b"EX", b"60"]);
        assert_eq!(
            &buf[..],
            b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nEX\r\n$2\r\n60\r\n"
        );
    }

    #[test]
    fn test_parse_simple_and_error() {
        assert_eq!(parse(b"+OK\r\n"), Reply::Simple("OK".into()));
        assert_eq!(
            parse(b"-ERR unknown command\r\n"),
            Reply::Error("ERR unknown command".into())
        );
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse(b":42\r\n"), Reply::Integer(42));
        assert_eq!(parse(b":-1\r\n"), Reply::Integer(-1));
    }

    #[test]
    fn test_parse_bulk() {
        assert_eq!(parse(b"$5\r\nhello\r\n"), Reply::Bulk(Some(b"hello".to_vec())));
        assert_eq!(parse(b"$0\r\n\r\n"), Reply::Bulk(Some(Vec::new())));
        assert_eq!(parse(b"$-1\r\n"), Reply::Bulk(None));
    }

    #[test]
    fn test_parse_scan_shaped_array() {
        let reply = parse(b"*2\r\n$1\r\n0\r\n*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(
            reply,
            Reply::Array(Some(vec![
                Reply::Bulk(Some(b"0".to_vec())),
                Reply::Array(Some(vec![
                    Reply::Bulk(Some(b"foo".to_vec())),
                    Reply::Bulk(Some(b"bar".to_vec())),
                ])),
            ]))
        );
    }

    #[test]
    fn test_parse_null_array() {
        assert_eq!(parse(b"*-1\r\n"), Reply::Array(None));
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        assert!(read_reply(&mut Cursor::new(b"+OK".as_slice())).is_err());
        assert!(read_reply(&mut Cursor::new(b"$5\r\nhel".as_slice())).is_err());
    }
}
