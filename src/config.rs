use std::env;
use std::time::Duration;

pub const DEFAULT_ECHO_URL: &str = "http://ipecho.net/plain";

/// Timeouts and buffer sizes shared by the query and RCON clients.
///
/// The defaults are what Call of Duty servers expect; overriding them is mostly
/// useful for tests and slow links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long a status query waits for its single response datagram.
    pub query_timeout: Duration,
    /// Send timeout and read-accumulation window for RCON commands.
    pub rcon_timeout: Duration,
    /// Size of the buffer a status response is read into.
    pub recv_buffer_size: usize,
    /// Size of each read while accumulating an RCON reply.
    pub rcon_read_chunk: usize,
    /// Endpoint returning the caller's public IP as plain text.
    pub echo_url: String,
    pub echo_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(2),
            rcon_timeout: Duration::from_secs(2),
            recv_buffer_size: 4096,
            rcon_read_chunk: 2048,
            echo_url: DEFAULT_ECHO_URL.to_string(),
            echo_timeout: Duration::from_secs(3),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            query_timeout: env_millis("COD_RCON_QUERY_TIMEOUT_MS").unwrap_or(defaults.query_timeout),
            rcon_timeout: env_millis("COD_RCON_RCON_TIMEOUT_MS").unwrap_or(defaults.rcon_timeout),
            recv_buffer_size: env::var("COD_RCON_RECV_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.recv_buffer_size),
            rcon_read_chunk: defaults.rcon_read_chunk,
            echo_url: env::var("COD_RCON_ECHO_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.echo_url),
            echo_timeout: env_millis("COD_RCON_ECHO_TIMEOUT_MS").unwrap_or(defaults.echo_timeout),
        }
    }

    pub fn with_timeouts(mut self, query_timeout: Duration, rcon_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self.rcon_timeout = rcon_timeout;
        self
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
