//! Memcached text-protocol backend.
//!
//! Speaks the classic ASCII protocol over a loopback `TcpStream`: `get`,
//! `set`, `add`, `delete`, and the server-side atomic `incr`. One connection
//! per bus; every operation is a synchronous round trip.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{BusError, Result};
use crate::store::KvBackend;

/// The single fixed loopback endpoint the deployment shares.
pub const DEFAULT_ADDR: &str = "127.0.0.1:11211";

/// A connected memcached client.
pub struct MemcachedClient {
    reader: BufReader<TcpStream>,
}

impl MemcachedClient {
    /// Connect to the cache server. Connection refused means the server is
    /// down, which is fatal to the caller.
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(BusError::CacheUnavailable)?;
        let _ = stream.set_nodelay(true);
        Ok(MemcachedClient {
            reader: BufReader::new(stream),
        })
    }

    fn send(&mut self, command: &str) -> Result<()> {
        let stream = self.reader.get_mut();
        stream
            .write_all(command.as_bytes())
            .and_then(|_| stream.write_all(b"\r\n"))
            .map_err(BusError::CacheUnavailable)
    }

    fn send_with_data(&mut self, command: &str, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream
            .write_all(command.as_bytes())
            .and_then(|_| stream.write_all(b"\r\n"))
            .and_then(|_| stream.write_all(data))
            .and_then(|_| stream.write_all(b"\r\n"))
            .map_err(BusError::CacheUnavailable)
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(BusError::CacheUnavailable)?;
        if n == 0 {
            return Err(BusError::CacheUnavailable(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "cache server closed the connection",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        // Payload plus the trailing \r\n.
        let mut buf = vec![0u8; len + 2];
        self.reader
            .read_exact(&mut buf)
            .map_err(BusError::CacheUnavailable)?;
        buf.truncate(len);
        Ok(buf)
    }

    fn expect_stored(&mut self, reply: String, verb: &str) -> Result<()> {
        match reply.as_str() {
            "STORED" => Ok(()),
            other => Err(BusError::Protocol(format!(
                "unexpected reply to {verb}: {other}"
            ))),
        }
    }
}

fn exptime(ttl: Option<Duration>) -> u64 {
    // 0 is the server default: no expiry beyond eviction pressure.
    ttl.map(|d| d.as_secs()).unwrap_or(0)
}

impl KvBackend for MemcachedClient {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.send(&format!("get {key}"))?;
        let header = self.read_line()?;
        if header == "END" {
            return Ok(None);
        }
        // VALUE <key> <flags> <bytes>
        let mut parts = header.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("VALUE"), Some(_), Some(_), Some(len)) => {
                let len: usize = len
                    .parse()
                    .map_err(|_| BusError::Protocol(format!("bad VALUE header: {header}")))?;
                let data = self.read_exact(len)?;
                let end = self.read_line()?;
                if end != "END" {
                    return Err(BusError::Protocol(format!(
                        "expected END after value, got: {end}"
                    )));
                }
                Ok(Some(data))
            }
            _ => Err(BusError::Protocol(format!(
                "unexpected reply to get: {header}"
            ))),
        }
    }

    fn set(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let command = format!("set {key} 0 {} {}", exptime(ttl), value.len());
        self.send_with_data(&command, value)?;
        let reply = self.read_line()?;
        self.expect_stored(reply, "set")
    }

    fn add(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool> {
        let command = format!("add {key} 0 {} {}", exptime(ttl), value.len());
        self.send_with_data(&command, value)?;
        match self.read_line()?.as_str() {
            "STORED" => Ok(true),
            "NOT_STORED" => Ok(false),
            other => Err(BusError::Protocol(format!(
                "unexpected reply to add: {other}"
            ))),
        }
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        self.send(&format!("delete {key}"))?;
        match self.read_line()?.as_str() {
            "DELETED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => Err(BusError::Protocol(format!(
                "unexpected reply to delete: {other}"
            ))),
        }
    }

    fn incr(&mut self, key: &str, delta: u64) -> Result<u64> {
        self.send(&format!("incr {key} {delta}"))?;
        let reply = self.read_line()?;
        if reply == "NOT_FOUND" {
            return Err(BusError::KeyNotFound(key.to_string()));
        }
        reply
            .parse()
            .map_err(|_| BusError::Protocol(format!("unexpected reply to incr: {reply}")))
    }
}
