//! Diagnostics probe: a multicast query every running transport answers.
//!
//! # Wire format
//!
//! Plain UTF-8 text, one datagram each way:
//!
//! ```text
//! request:  probe [key ...]
//! response: addr=<ip:port>\n<key>=<value>\n...
//! ```
//!
//! A request without keys asks for `member`, `uuid`, `cluster` and `view`.
//! Unknown keys are left out of the response.
//!
//! # Probing
//!
//! [`run_probe`] parses a free-text query, sends one request to the
//! diagnostics group and writes every response that arrives before the
//! timeout to the caller's writer.  Output goes only to that writer, so
//! concurrent probes do not interfere.

use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use groupchat_core::UpHandler;
use thiserror::Error;
use tracing::{debug, trace};

/// Multicast group diagnostics sockets join.
pub const DEFAULT_DIAGNOSTICS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 75, 75);

/// Port diagnostics sockets listen on.
pub const DEFAULT_DIAGNOSTICS_PORT: u16 = 7500;

/// How long [`run_probe`] waits for responses by default.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

const REQUEST_PREFIX: &str = "probe";
const DEFAULT_KEYS: [&str; 4] = ["member", "uuid", "cluster", "view"];

/// Errors raised while probing.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// An option flag was the last token.
    #[error("option {0} needs a value")]
    MissingValue(String),

    /// An option value did not parse.
    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },

    /// A socket or writer call failed.
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

fn io_err(operation: &'static str) -> impl FnOnce(io::Error) -> ProbeError {
    move |source| ProbeError::Io { operation, source }
}

/// A parsed probe query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeQuery {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub timeout: Duration,
    pub keys: Vec<String>,
}

impl Default for ProbeQuery {
    fn default() -> Self {
        Self {
            addr: DEFAULT_DIAGNOSTICS_GROUP,
            port: DEFAULT_DIAGNOSTICS_PORT,
            timeout: DEFAULT_PROBE_TIMEOUT,
            keys: Vec::new(),
        }
    }
}

impl ProbeQuery {
    /// Tokenizes `query` on whitespace.
    ///
    /// `-addr <ipv4>`, `-port <u16>` and `-timeout <ms>` set options; every
    /// other token is a key.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::MissingValue`] or [`ProbeError::InvalidValue`]
    /// for a malformed option.
    pub fn parse(query: &str) -> Result<Self, ProbeError> {
        let mut parsed = Self::default();
        let mut tokens = query.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "-addr" | "-port" | "-timeout" => {
                    let value = tokens
                        .next()
                        .ok_or_else(|| ProbeError::MissingValue(token.to_string()))?;
                    let invalid = || ProbeError::InvalidValue {
                        flag: token.to_string(),
                        value: value.to_string(),
                    };
                    match token {
                        "-addr" => parsed.addr = value.parse().map_err(|_| invalid())?,
                        "-port" => parsed.port = value.parse().map_err(|_| invalid())?,
                        _ => {
                            let ms: u64 = value.parse().map_err(|_| invalid())?;
                            parsed.timeout = Duration::from_millis(ms);
                        }
                    }
                }
                key => parsed.keys.push(key.to_string()),
            }
        }
        Ok(parsed)
    }

    /// The request datagram for this query.
    pub fn request(&self) -> Vec<u8> {
        let mut request = REQUEST_PREFIX.to_string();
        for key in &self.keys {
            request.push(' ');
            request.push_str(key);
        }
        request.into_bytes()
    }
}

/// Builds the response to one diagnostics datagram, or `None` if it is not a
/// probe request.
pub fn answer_request(
    request: &[u8],
    handler: &dyn UpHandler,
    local: Option<SocketAddr>,
) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(request).ok()?;
    let mut tokens = text.split_whitespace();
    if tokens.next() != Some(REQUEST_PREFIX) {
        trace!("ignoring non-probe diagnostics datagram");
        return None;
    }

    let mut keys: Vec<&str> = tokens.collect();
    if keys.is_empty() {
        keys.extend(DEFAULT_KEYS);
    }

    let mut response = String::new();
    if let Some(local) = local {
        response.push_str(&format!("addr={local}\n"));
    }
    for key in keys {
        if let Some(value) = handler.probe(key) {
            response.push_str(&format!("{key}={value}\n"));
        }
    }
    Some(response.into_bytes())
}

/// Sends `query` to the diagnostics group and writes each response to `out`.
///
/// Returns the number of responses received.
///
/// # Errors
///
/// Returns [`ProbeError`] if the query is malformed or a socket or write
/// call fails.
pub fn run_probe(query: &str, out: &mut dyn Write) -> Result<usize, ProbeError> {
    let query = ProbeQuery::parse(query)?;
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(io_err("bind probe socket"))?;
    socket
        .set_multicast_ttl_v4(8)
        .map_err(io_err("set multicast ttl"))?;

    let target = SocketAddr::from((query.addr, query.port));
    socket
        .send_to(&query.request(), target)
        .map_err(io_err("send probe request"))?;
    debug!("probe sent to {target}; waiting {:?}", query.timeout);

    let deadline = Instant::now() + query.timeout;
    let mut buf = vec![0u8; 65_535];
    let mut responses = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        socket
            .set_read_timeout(Some(remaining))
            .map_err(io_err("set read timeout"))?;
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                break
            }
            Err(e) => return Err(io_err("receive probe response")(e)),
        };
        responses += 1;
        writeln!(out, "#{responses} from {src} ({len} bytes):")
            .and_then(|()| writeln!(out, "{}", String::from_utf8_lossy(&buf[..len]).trim_end()))
            .and_then(|()| writeln!(out))
            .map_err(io_err("write probe output"))?;
    }
    Ok(responses)
}
