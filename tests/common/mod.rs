//! In-process stand-ins for a game server.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use cod_rcon::ClientConfig;
use tokio::{net::UdpSocket, task::JoinHandle};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Short windows so the suite does not sit through the production two seconds.
pub fn fast_config() -> ClientConfig {
    ClientConfig::default().with_timeouts(Duration::from_millis(300), Duration::from_millis(300))
}

pub fn oob(body: &[u8]) -> Vec<u8> {
    let mut packet = vec![0xFF, 0xFF, 0xFF, 0xFF];
    packet.extend_from_slice(body);
    packet
}

/// Answers each datagram it receives with whatever the handler returns.
pub struct FakeServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(vec![]));
        let seen = requests.clone();

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let request = buf[..len].to_vec();
                let replies = handler(&request);
                seen.lock().unwrap().push(request);
                for reply in replies {
                    let _ = socket.send_to(&reply, peer).await;
                }
            }
        });

        FakeServer {
            addr,
            requests,
            task,
        }
    }

    /// Replies to every datagram with the same canned packets.
    pub async fn canned(replies: Vec<Vec<u8>>) -> Self {
        FakeServer::start(move |_| replies.clone()).await
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bound but never answers.
pub async fn silent_server() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

/// A port nothing is listening on.
pub fn closed_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}
