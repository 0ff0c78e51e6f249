//! `getstatus` queries and parsing of the `statusResponse` they get back.
//!
//! A response looks like this once the out-of-band marker is gone:
//!
//! ```text
//! statusResponse
//! \sv_hostname\^1My ^7Server\mapname\mp_carentan\sv_maxclients\20
//! 15 30 "Soldier1"
//! 25 45 "Soldier2"
//! ```
//!
//! Parsing is lenient on purpose: lines that are neither server variables nor
//! players are skipped, so servers that send extra or future fields still work.

use std::{net::IpAddr, str::FromStr};

use log::{debug, warn};
use phf::phf_map;
use serde::Serialize;

use crate::{
    config::ClientConfig,
    error::CoreError,
    packetutil::{bytes_to_string, connect_udp, send_oob_packet, OOB_MARKER},
};

const STATUS_REQUEST: &[u8] = b"getstatus";
const STATUS_RESPONSE_TAG: &str = "statusResponse";

#[derive(Debug, Clone, Copy)]
enum StatusField {
    MapName,
    GameType,
    MaxClients,
    HostName,
    GameName,
}

static STATUS_FIELDS: phf::Map<&'static str, StatusField> = phf_map! {
    "mapname" => StatusField::MapName,
    "g_gametype" => StatusField::GameType,
    "sv_maxclients" => StatusField::MaxClients,
    "sv_hostname" => StatusField::HostName,
    "gamename" => StatusField::GameName,
};

/// Server variables from one status response.
///
/// Missing variables are left empty (or zero for `max_clients`); picking a
/// display fallback is up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub mapname: String,
    #[serde(rename = "g_gametype")]
    pub gametype: String,
    /// Raw, color codes included.
    #[serde(rename = "sv_hostname")]
    pub hostname_raw: String,
    #[serde(rename = "gamename")]
    pub game_name: String,
    #[serde(rename = "sv_maxclients")]
    pub max_clients: u32,
    /// `"<players>/<max_clients>"`.
    #[serde(rename = "player_count")]
    pub player_count_summary: String,
}

impl ServerInfo {
    /// Number of players the summary was computed from.
    pub fn player_count(&self) -> usize {
        self.player_count_summary
            .split('/')
            .next()
            .and_then(|count| count.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerEntry {
    /// Position in the response, starting at 0.
    pub id: usize,
    pub score: i32,
    pub ping: i32,
    /// Raw, color codes included.
    #[serde(rename = "name")]
    pub name_raw: String,
}

/// Sends `getstatus` and waits for a single datagram.
#[derive(Debug, Clone, Default)]
pub struct StatusQueryClient {
    config: ClientConfig,
}

impl StatusQueryClient {
    pub fn new(config: ClientConfig) -> Self {
        StatusQueryClient { config }
    }

    pub async fn query(
        &self,
        ip: &str,
        port: u16,
    ) -> Result<(ServerInfo, Vec<PlayerEntry>), CoreError> {
        let ip = IpAddr::from_str(ip.trim())
            .map_err(|_| CoreError::InvalidInput(format!("not an IP address: {ip:?}")))?;
        if port == 0 {
            return Err(CoreError::InvalidInput("port must be between 1 and 65535".into()));
        }

        let socket = connect_udp(ip, port).await?;
        debug!("querying status of {}:{}", ip, port);
        send_oob_packet(&socket, STATUS_REQUEST, self.config.query_timeout).await?;

        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let received = tokio::time::timeout(self.config.query_timeout, socket.recv(&mut buf)).await;
        let len = match received {
            Ok(Ok(len)) => len,
            Ok(Err(err)) => {
                let err = CoreError::from_io(&format!("No response from server {ip}:{port}"), err);
                warn!("{}", err);
                return Err(err);
            }
            Err(_) => {
                warn!("no status response from {}:{} within timeout", ip, port);
                return Err(CoreError::Timeout(format!(
                    "No response from server {ip}:{port} within {}ms",
                    self.config.query_timeout.as_millis()
                )));
            }
        };
        debug!("received {} byte status response from {}:{}", len, ip, port);

        parse_status_response(&buf[..len])
    }
}

/// Parse a raw status datagram, marker included.
///
/// Only a datagram that is not an out-of-band packet at all is rejected;
/// anything inside it that does not look like a variable or a player is skipped.
pub fn parse_status_response(
    datagram: &[u8],
) -> Result<(ServerInfo, Vec<PlayerEntry>), CoreError> {
    let body = datagram.strip_prefix(&OOB_MARKER[..]).ok_or_else(|| {
        CoreError::Protocol(format!(
            "expected a {} byte out-of-band marker, got {} byte datagram",
            OOB_MARKER.len(),
            datagram.len()
        ))
    })?;

    let text = bytes_to_string(body).replace(STATUS_RESPONSE_TAG, "");

    let mut info = ServerInfo::default();
    let mut players: Vec<PlayerEntry> = vec![];

    for line in text.trim().split('\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('\\') {
            apply_server_vars(&mut info, line);
        } else if let Some((score, ping, name)) = parse_player_line(line) {
            players.push(PlayerEntry {
                id: players.len(),
                score,
                ping,
                name_raw: name.to_string(),
            });
        } else {
            debug!("skipping unrecognized status line: {:?}", line);
        }
    }

    info.player_count_summary = format!("{}/{}", players.len(), info.max_clients);
    debug!(
        "parsed status: map={} gametype={} players={}",
        info.mapname, info.gametype, info.player_count_summary
    );

    Ok((info, players))
}

fn apply_server_vars(info: &mut ServerInfo, line: &str) {
    let parts: Vec<&str> = line.trim_matches('\\').split('\\').collect();

    for pair in parts.chunks_exact(2) {
        let (key, value) = (pair[0], pair[1]);
        match STATUS_FIELDS.get(key) {
            Some(StatusField::MapName) => info.mapname = value.to_string(),
            Some(StatusField::GameType) => info.gametype = value.to_string(),
            Some(StatusField::MaxClients) => info.max_clients = leading_uint(value),
            Some(StatusField::HostName) => info.hostname_raw = value.to_string(),
            Some(StatusField::GameName) => info.game_name = value.to_string(),
            None => {}
        }
    }
}

/// `<score> <ping> <name>`: two unsigned integers, whitespace after each, then a non-empty name.
fn parse_player_line(line: &str) -> Option<(i32, i32, &str)> {
    let (score, rest) = take_digits(line)?;
    let rest = skip_whitespace(rest)?;
    let (ping, rest) = take_digits(rest)?;
    let name = skip_whitespace(rest)?;
    if name.is_empty() {
        return None;
    }

    Some((saturating_int(score), saturating_int(ping), strip_quotes(name)))
}

/// Digits only, so the one way parsing fails is overflow.
fn saturating_int(digits: &str) -> i32 {
    digits.parse().unwrap_or(i32::MAX)
}

fn take_digits(s: &str) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some(s.split_at(end))
}

/// Requires at least one whitespace character.
fn skip_whitespace(s: &str) -> Option<&str> {
    let trimmed = s.trim_start();
    if trimmed.len() == s.len() {
        return None;
    }
    Some(trimmed)
}

fn strip_quotes(name: &str) -> &str {
    name.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(name)
}

/// Leading decimal digits as a number, 0 when there are none.
fn leading_uint(value: &str) -> u32 {
    let value = value.trim();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().unwrap_or(0)
}

/// Remove `^0`..`^9` color markers, for callers that want plain text.
///
/// ```
/// assert_eq!(cod_rcon::strip_color_codes("^1Grimm^7Red"), "GrimmRed");
/// ```
pub fn strip_color_codes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '^' {
            if let Some(next) = chars.peek() {
                if next.is_ascii_digit() {
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}
