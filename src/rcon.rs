use std::{
    net::IpAddr,
    str::FromStr,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    config::ClientConfig,
    error::CoreError,
    packetutil::{bytes_to_string, connect_udp, send_oob_packet, strip_oob_prefix},
};

const PRINT_TAG: &[u8] = b"print\n";

/// Replies a server sends instead of running the command when the password is wrong.
pub const AUTH_REJECTION_MARKERS: [&str; 3] = ["Invalid password.", "Bad rcon", "Bad rconpassword."];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RconResult {
    /// Everything the server printed, without the `print` prefix.
    #[serde(rename = "response")]
    pub raw_response_text: String,
}

impl RconResult {
    /// The protocol has no status code for a bad password, only the text it prints.
    pub fn is_auth_rejected(&self) -> bool {
        let text = self.raw_response_text.to_lowercase();
        AUTH_REJECTION_MARKERS
            .iter()
            .any(|marker| text.contains(&marker.to_lowercase()))
    }
}

/// Sends `rcon <password> <command>` and collects whatever comes back.
///
/// A wrong password is not an error here: the server's rejection text is
/// returned like any other reply. Use [`RconResult::is_auth_rejected`] to tell.
#[derive(Debug, Clone, Default)]
pub struct RconClient {
    config: ClientConfig,
}

impl RconClient {
    pub fn new(config: ClientConfig) -> Self {
        RconClient { config }
    }

    pub async fn execute(
        &self,
        ip: &str,
        port: u16,
        password: &str,
        command: &str,
    ) -> Result<RconResult, CoreError> {
        let ip = ip.trim();
        if ip.is_empty() {
            return Err(CoreError::InvalidInput("IP/Hostname not provided".into()));
        }
        let ip = IpAddr::from_str(ip)
            .map_err(|_| CoreError::InvalidInput(format!("not an IP address: {ip:?}")))?;
        if port == 0 {
            return Err(CoreError::InvalidInput("port must be between 1 and 65535".into()));
        }

        let command = sanitize_command(command);
        debug!("sending rcon command '{}' to {}:{}", command, ip, port);

        let socket = tokio::time::timeout(self.config.rcon_timeout, connect_udp(ip, port))
            .await
            .map_err(|_| {
                CoreError::Network(format!("Server offline or not responding: {ip}:{port}"))
            })??;

        let payload = format!("rcon {password} {command}");
        send_oob_packet(&socket, payload.as_bytes(), self.config.rcon_timeout).await?;

        let mut response: Vec<u8> = vec![];
        let mut buf = vec![0u8; self.config.rcon_read_chunk];
        let mut datagrams = 0usize;
        let mut read_error = None;
        let deadline = Instant::now() + self.config.rcon_timeout;

        // a long reply is split over several datagrams, so keep reading until the window closes
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO {
                break;
            }

            match tokio::time::timeout(remaining, socket.recv(&mut buf)).await {
                Ok(Ok(0)) => {
                    datagrams += 1;
                    break;
                }
                Ok(Ok(len)) => {
                    datagrams += 1;
                    let chunk = &buf[..len];
                    response.extend_from_slice(strip_oob_prefix(chunk, PRINT_TAG).unwrap_or(chunk));
                }
                Ok(Err(err)) => {
                    read_error = Some(err);
                    break;
                }
                Err(_) => break,
            }
        }

        if datagrams == 0 {
            let context = format!("No response from server {ip}:{port}");
            let err = match read_error {
                Some(err) => CoreError::from_io(&context, err),
                None => CoreError::Timeout(format!(
                    "{context} within {}ms",
                    self.config.rcon_timeout.as_millis()
                )),
            };
            warn!("{}", err);
            return Err(err);
        }
        if let Some(err) = read_error {
            debug!("read stopped early after {} datagrams: {}", datagrams, err);
        }

        let result = RconResult {
            raw_response_text: bytes_to_string(&response),
        };
        info!(
            "rcon reply from {}:{}: {} bytes in {} datagrams",
            ip,
            port,
            response.len(),
            datagrams
        );
        if result.is_auth_rejected() {
            warn!("{}:{} rejected the rcon password", ip, port);
        }

        Ok(result)
    }
}

/// Trim the command and drop control characters other than tab.
///
/// A newline would split the command on the server side and a NUL would cut it
/// short; nothing else is touched.
pub fn sanitize_command(command: &str) -> String {
    command
        .chars()
        .filter(|c| *c == '\t' || !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}
