//! # Memcache Provider
//!
//! A client for the memcached text protocol over a single reused TCP
//! connection. Expiry is enforced by the server. Any I/O or protocol failure
//! drops the connection; the next call reconnects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::CacheProvider;
use crate::clock::{self, Clock};
use crate::types::{CacheError, CacheRecord, CacheResult};

// memcached rejects keys longer than this
const MAX_KEY_LEN: usize = 250;

// Values above this are refused by a default memcached configuration
const MAX_VALUE_LEN: usize = 1024 * 1024;

// Longer exptimes are read by memcached as absolute Unix timestamps
const MAX_RELATIVE_EXPTIME: u64 = 30 * 24 * 60 * 60;

type Connection = BufStream<TcpStream>;

#[derive(Clone)]
pub struct MemcacheCache {
    addr: String,
    timeout: Duration,
    conn: Arc<Mutex<Option<Connection>>>,
    clock: Arc<dyn Clock>,
}

impl MemcacheCache {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{}:{port}", host.into()),
            timeout,
            conn: Arc::new(Mutex::new(None)),
            clock: clock::system(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Run one request/response exchange, bounded by the configured timeout
    async fn exchange(&self, command: Command) -> CacheResult<Reply> {
        let mut guard = self.conn.lock().await;

        let result = tokio::time::timeout(self.timeout, self.run_on(&mut guard, command))
            .await
            .unwrap_or(Err(CacheError::Timeout(self.timeout)));

        if result.is_err() {
            // The stream may be mid-response; never reuse it
            *guard = None;
        }

        result
    }

    async fn run_on(&self, slot: &mut Option<Connection>, command: Command) -> CacheResult<Reply> {
        if slot.is_none() {
            let stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|e| CacheError::Unreachable(format!("{}: {e}", self.addr)))?;
            stream.set_nodelay(true)?;
            debug!(addr = %self.addr, "Connected to memcached");
            *slot = Some(BufStream::new(stream));
        }

        match slot.as_mut() {
            Some(conn) => command.run(conn).await,
            None => Err(CacheError::Unreachable(self.addr.clone())),
        }
    }
}

enum Command {
    Get(String),
    Set { key: String, data: Vec<u8>, ttl: u64 },
    Delete(String),
}

enum Reply {
    Value(Option<Vec<u8>>),
    Done,
}

impl Command {
    async fn run(self, conn: &mut Connection) -> CacheResult<Reply> {
        match self {
            Command::Get(key) => do_get(conn, &key).await.map(Reply::Value),
            Command::Set { key, data, ttl } => {
                do_set(conn, &key, &data, ttl).await.map(|_| Reply::Done)
            }
            Command::Delete(key) => do_delete(conn, &key).await.map(|_| Reply::Done),
        }
    }
}

/// Map a cache key onto the memcached key alphabet
fn wire_key(key: &str) -> String {
    let valid = key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_graphic());
    if valid {
        return key.to_string();
    }

    use sha2::{Digest, Sha256};
    format!("h_{}", hex::encode(Sha256::digest(key.as_bytes())))
}

/// Exptime argument for a TTL of `ttl` seconds written at `now`
fn wire_exptime(ttl: u64, now: u64) -> u64 {
    if ttl > MAX_RELATIVE_EXPTIME {
        now.saturating_add(ttl)
    } else {
        ttl
    }
}

async fn read_line(conn: &mut Connection) -> CacheResult<String> {
    let mut line = String::new();
    let n = conn.read_line(&mut line).await?;
    if n == 0 {
        return Err(CacheError::Protocol("connection closed by server".into()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn server_error(line: &str) -> CacheError {
    CacheError::Protocol(format!("unexpected reply '{line}'"))
}

async fn do_get(conn: &mut Connection, key: &str) -> CacheResult<Option<Vec<u8>>> {
    conn.write_all(format!("get {key}\r\n").as_bytes()).await?;
    conn.flush().await?;

    let mut found = None;
    loop {
        let line = read_line(conn).await?;
        if line == "END" {
            return Ok(found);
        }

        // VALUE <key> <flags> <bytes>
        let mut parts = line.split_ascii_whitespace();
        if parts.next() != Some("VALUE") {
            return Err(server_error(&line));
        }
        let len: usize = parts
            .nth(2)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| server_error(&line))?;

        let mut data = vec![0u8; len + 2];
        conn.read_exact(&mut data).await?;
        if !data.ends_with(b"\r\n") {
            return Err(CacheError::Protocol("value block not terminated".into()));
        }
        data.truncate(len);
        found = Some(data);
    }
}

async fn do_set(conn: &mut Connection, key: &str, data: &[u8], ttl: u64) -> CacheResult<()> {
    conn.write_all(format!("set {key} 0 {ttl} {}\r\n", data.len()).as_bytes())
        .await?;
    conn.write_all(data).await?;
    conn.write_all(b"\r\n").await?;
    conn.flush().await?;

    let line = read_line(conn).await?;
    match line.as_str() {
        "STORED" => Ok(()),
        _ => Err(server_error(&line)),
    }
}

async fn do_delete(conn: &mut Connection, key: &str) -> CacheResult<()> {
    conn.write_all(format!("delete {key}\r\n").as_bytes()).await?;
    conn.flush().await?;

    let line = read_line(conn).await?;
    match line.as_str() {
        "DELETED" | "NOT_FOUND" => Ok(()),
        _ => Err(server_error(&line)),
    }
}

#[async_trait]
impl CacheProvider for MemcacheCache {
    fn name(&self) -> &'static str {
        "memcache"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let raw = match self.exchange(Command::Get(wire_key(key))).await? {
            Reply::Value(Some(raw)) => raw,
            Reply::Value(None) => return Ok(None),
            Reply::Done => return Err(CacheError::Protocol("get returned no value block".into())),
        };

        let record: CacheRecord = match serde_json::from_slice(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key, error = %e, "Ignoring undecodable memcached value");
                return Ok(None);
            }
        };

        if record.ttl > 0 && record.is_expired(self.clock.now()) {
            return Ok(None);
        }

        Ok(Some(record.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()> {
        let now = self.clock.now();
        let record = CacheRecord::new(value, now, ttl);
        let data = serde_json::to_vec(&record)?;
        if data.len() > MAX_VALUE_LEN {
            return Err(CacheError::Protocol(format!(
                "value of {} bytes exceeds the memcached item limit",
                data.len()
            )));
        }

        self.exchange(Command::Set {
            key: wire_key(key),
            data,
            ttl: wire_exptime(ttl.as_secs(), now),
        })
        .await
        .map(|_| ())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.exchange(Command::Delete(wire_key(key)))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::io::BufReader;
    use tokio::net::TcpListener;

    /// Minimal memcached speaking get/set/delete, without expiry.
    pub(crate) async fn spawn_fake_memcached() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let store: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::default();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let store = store.clone();
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut read = BufReader::new(read);
                    loop {
                        let mut line = String::new();
                        if read.read_line(&mut line).await.unwrap_or(0) == 0 {
                            break;
                        }
                        let parts: Vec<&str> = line.split_ascii_whitespace().collect();
                        let reply = match parts.as_slice() {
                            ["get", key] => match store.lock().await.get(*key) {
                                Some(data) => {
                                    let mut out =
                                        format!("VALUE {key} 0 {}\r\n", data.len()).into_bytes();
                                    out.extend_from_slice(data);
                                    out.extend_from_slice(b"\r\nEND\r\n");
                                    out
                                }
                                None => b"END\r\n".to_vec(),
                            },
                            ["set", key, _, _, len] => {
                                let len: usize = len.parse().unwrap();
                                let mut data = vec![0u8; len + 2];
                                read.read_exact(&mut data).await.unwrap();
                                data.truncate(len);
                                store.lock().await.insert(key.to_string(), data);
                                b"STORED\r\n".to_vec()
                            }
                            ["delete", key] => match store.lock().await.remove(*key) {
                                Some(_) => b"DELETED\r\n".to_vec(),
                                None => b"NOT_FOUND\r\n".to_vec(),
                            },
                            _ => b"ERROR\r\n".to_vec(),
                        };
                        if write.write_all(&reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        port
    }

    /// A local port with nothing listening on it.
    pub(crate) async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn round_trip_against_server() {
        let port = spawn_fake_memcached().await;
        let cache = MemcacheCache::new("127.0.0.1", port, Duration::from_secs(2));
        let value = json!({"title": "a b\r\nc", "formats": []});

        cache
            .set("v_dQw4w9WgXcQ", value.clone(), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(cache.get("v_dQw4w9WgXcQ").await.unwrap(), Some(value));
        assert!(cache.get("v_missing").await.unwrap().is_none());

        cache.remove("v_dQw4w9WgXcQ").await.unwrap();
        assert!(cache.get("v_dQw4w9WgXcQ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let port = closed_port().await;
        let cache = MemcacheCache::new("127.0.0.1", port, Duration::from_millis(500));

        assert!(cache.get("k").await.is_err());
        assert!(
            cache
                .set("k", json!(1), Duration::from_secs(1))
                .await
                .is_err()
        );
    }

    #[test]
    fn keys_with_spaces_are_hashed() {
        assert_eq!(wire_key("rss::c/x/videos::i10"), "rss::c/x/videos::i10");
        let hashed = wire_key("rss::c/a b::i10");
        assert!(hashed.starts_with("h_"));
        assert!(!hashed.contains(' '));
        assert!(wire_key(&"k".repeat(300)).len() <= MAX_KEY_LEN);
    }

    #[test]
    fn long_ttls_become_absolute_exptimes() {
        let now = 1_700_000_000;
        assert_eq!(wire_exptime(0, now), 0);
        assert_eq!(wire_exptime(600, now), 600);
        assert_eq!(wire_exptime(MAX_RELATIVE_EXPTIME, now), MAX_RELATIVE_EXPTIME);

        let ninety_days = 90 * 24 * 60 * 60;
        assert_eq!(wire_exptime(ninety_days, now), now + ninety_days);
    }
}
