use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;

use crate::error::CoreError;

/// Prefix shared by every connectionless (out-of-band) packet.
pub const OOB_MARKER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

pub fn build_oob_packet(payload: &[u8]) -> Vec<u8> {
    let mut packet: Vec<u8> = Vec::with_capacity(OOB_MARKER.len() + payload.len());
    packet.extend_from_slice(&OOB_MARKER);
    packet.extend_from_slice(payload);
    packet
}

/// Remove the marker and the given tag (e.g. `print\n`) if the packet starts with both.
pub fn strip_oob_prefix<'a>(packet: &'a [u8], tag: &[u8]) -> Option<&'a [u8]> {
    packet.strip_prefix(&OOB_MARKER[..])?.strip_prefix(tag)
}

/// Game servers speak single-byte text; every byte maps to the char with the same code point.
pub fn bytes_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|x| char::from(*x)).collect()
}

/// Bind an ephemeral socket of the right family and connect it to the peer.
pub async fn connect_udp(ip: std::net::IpAddr, port: u16) -> Result<UdpSocket, CoreError> {
    let bind_addr = if ip.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|err| CoreError::Network(format!("Failed to create socket: {err}")))?;
    socket.connect((ip, port)).await.map_err(|err| {
        CoreError::Network(format!("Server offline or not responding: {err}"))
    })?;

    Ok(socket)
}

pub async fn send_oob_packet(
    socket: &UdpSocket,
    payload: &[u8],
    send_timeout: Duration,
) -> Result<(), CoreError> {
    let packet = build_oob_packet(payload);

    match tokio::time::timeout(send_timeout, socket.send(&packet)).await {
        Ok(Ok(sent)) => {
            debug!("sent {} byte out-of-band packet", sent);
            Ok(())
        }
        Ok(Err(err)) => Err(CoreError::Network(format!(
            "Failed to send packet to server: {err}"
        ))),
        Err(_) => Err(CoreError::Timeout(format!(
            "sending packet did not complete within {}ms",
            send_timeout.as_millis()
        ))),
    }
}
