//! Resolve the host a caller typed in into an address we can send datagrams to.
//!
//! Literal IPs are returned untouched. Names go through one DNS lookup, and a
//! name that lands on `127.0.0.1` is swapped for this machine's public address
//! when an echo service can tell us what that is.

use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr},
    str::FromStr,
};

use async_trait::async_trait;
use log::{debug, info, warn};
use trust_dns_resolver::{
    config::{LookupIpStrategy, ResolverConfig, ResolverOpts},
    system_conf::read_system_conf,
    TokioAsyncResolver,
};

use crate::{config::ClientConfig, error::CoreError};

/// Outcome of a successful resolve. Only valid for the call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub ip: IpAddr,
}

impl Display for ResolvedAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ip)
    }
}

/// Name to IPv4 lookup.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    async fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, CoreError>;
}

/// Best-effort discovery of this machine's public IP.
#[async_trait]
pub trait PublicIpLookup: Send + Sync {
    /// `None` on any failure; callers fall back to what they had.
    async fn public_ip(&self) -> Option<IpAddr>;
}

/// DNS through the system resolver configuration, hosts file included.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDns;

#[async_trait]
impl DnsLookup for SystemDns {
    async fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, CoreError> {
        let (config, mut opts) = match read_system_conf() {
            Ok(conf) => conf,
            Err(err) => {
                // cloudflare is the usual fallback when the platform config is unreadable
                debug!("system resolver config unavailable ({}), using cloudflare", err);
                (ResolverConfig::cloudflare(), ResolverOpts::default())
            }
        };
        opts.ip_strategy = LookupIpStrategy::Ipv4Only;
        opts.attempts = 1;

        let resolver = TokioAsyncResolver::tokio(config, opts)
            .map_err(|err| CoreError::ResolutionFailed(format!("{host}: {err}")))?;

        let lookup = resolver
            .lookup_ip(host)
            .await
            .map_err(|err| CoreError::ResolutionFailed(format!("{host}: {err}")))?;

        lookup
            .iter()
            .find_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| CoreError::ResolutionFailed(format!("{host}: no IPv4 address found")))
    }
}

/// Asks a plain-text "what is my IP" endpoint.
#[derive(Debug, Clone)]
pub struct HttpEcho {
    url: String,
    timeout: std::time::Duration,
}

impl HttpEcho {
    pub fn new(config: &ClientConfig) -> Self {
        HttpEcho {
            url: config.echo_url.clone(),
            timeout: config.echo_timeout,
        }
    }
}

impl Default for HttpEcho {
    fn default() -> Self {
        HttpEcho::new(&ClientConfig::default())
    }
}

#[async_trait]
impl PublicIpLookup for HttpEcho {
    async fn public_ip(&self) -> Option<IpAddr> {
        let client = match reqwest::Client::builder().timeout(self.timeout).build() {
            Ok(client) => client,
            Err(err) => {
                warn!("could not build HTTP client for IP echo: {}", err);
                return None;
            }
        };

        let body = match client.get(&self.url).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    debug!("IP echo body unreadable: {}", err);
                    return None;
                }
            },
            Err(err) => {
                debug!("IP echo request to {} failed: {}", self.url, err);
                return None;
            }
        };

        let ip = IpAddr::from_str(body.trim()).ok();
        if ip.is_none() {
            debug!("IP echo returned something that is not an address: {:?}", body);
        }
        ip
    }
}

/// Never substitutes loopback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEcho;

#[async_trait]
impl PublicIpLookup for NoEcho {
    async fn public_ip(&self) -> Option<IpAddr> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct HostResolver<D = SystemDns, P = HttpEcho> {
    dns: D,
    echo: P,
}

impl HostResolver {
    pub fn new(config: &ClientConfig) -> Self {
        HostResolver {
            dns: SystemDns,
            echo: HttpEcho::new(config),
        }
    }
}

impl Default for HostResolver {
    fn default() -> Self {
        HostResolver::new(&ClientConfig::default())
    }
}

impl<D: DnsLookup, P: PublicIpLookup> HostResolver<D, P> {
    pub fn with_lookups(dns: D, echo: P) -> Self {
        HostResolver { dns, echo }
    }

    /// Resolve a host name or IP literal.
    ///
    /// One DNS attempt, and at most one echo request when the name maps to loopback.
    /// A failing echo never fails the resolve.
    pub async fn resolve(&self, host_or_ip: &str) -> Result<ResolvedAddress, CoreError> {
        let host = host_or_ip.trim();
        if host.is_empty() {
            return Err(CoreError::InvalidInput("Hostname is empty".into()));
        }

        if let Ok(ip) = IpAddr::from_str(host) {
            debug!("{} is a valid IP address", host);
            return Ok(ResolvedAddress { ip });
        }

        let resolved = self.dns.lookup_ipv4(host).await.map_err(|err| {
            warn!("failed to resolve hostname '{}': {}", host, err);
            err
        })?;
        info!("resolved hostname '{}' to IP '{}'", host, resolved);

        if resolved == Ipv4Addr::LOCALHOST {
            if let Some(external) = self.echo.public_ip().await {
                info!("resolved localhost to external IP '{}'", external);
                return Ok(ResolvedAddress { ip: external });
            }
        }

        Ok(ResolvedAddress {
            ip: IpAddr::V4(resolved),
        })
    }
}

/// Resolve with the system DNS and the default IP echo endpoint.
pub async fn resolve_hostname(host: &str) -> Result<IpAddr, CoreError> {
    let resolved = HostResolver::default().resolve(host).await?;
    Ok(resolved.ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeDns {
        answer: Option<Ipv4Addr>,
        calls: AtomicUsize,
    }

    impl FakeDns {
        fn answering(answer: Option<Ipv4Addr>) -> Self {
            FakeDns {
                answer,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DnsLookup for FakeDns {
        async fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .ok_or_else(|| CoreError::ResolutionFailed(format!("{host}: NXDOMAIN")))
        }
    }

    struct FakeEcho {
        answer: Option<IpAddr>,
        calls: AtomicUsize,
    }

    impl FakeEcho {
        fn answering(answer: Option<IpAddr>) -> Self {
            FakeEcho {
                answer,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PublicIpLookup for FakeEcho {
        async fn public_ip(&self) -> Option<IpAddr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[tokio::test]
    async fn literal_ip_skips_dns() {
        let resolver = HostResolver::with_lookups(
            FakeDns::answering(Some(Ipv4Addr::new(9, 9, 9, 9))),
            FakeEcho::answering(None),
        );

        let resolved = resolver.resolve("1.2.3.4").await.unwrap();
        assert_eq!(resolved.to_string(), "1.2.3.4");

        let resolved = resolver.resolve("::1").await.unwrap();
        assert_eq!(resolved.ip, "::1".parse::<IpAddr>().unwrap());

        assert_eq!(resolver.dns.calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn literal_loopback_is_not_substituted() {
        let resolver = HostResolver::with_lookups(
            FakeDns::answering(None),
            FakeEcho::answering(Some("203.0.113.7".parse().unwrap())),
        );

        let resolved = resolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(resolved.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(resolver.echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_host_is_invalid_input() {
        let resolver =
            HostResolver::with_lookups(FakeDns::answering(None), FakeEcho::answering(None));

        let err = resolver.resolve("").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = resolver.resolve("   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(resolver.dns.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_lookup_is_resolution_failed() {
        let resolver =
            HostResolver::with_lookups(FakeDns::answering(None), FakeEcho::answering(None));

        let err = resolver.resolve("nonexistent.invalid.tld").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionFailed);
        assert_eq!(resolver.dns.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loopback_name_uses_public_ip_when_available() {
        let resolver = HostResolver::with_lookups(
            FakeDns::answering(Some(Ipv4Addr::LOCALHOST)),
            FakeEcho::answering(Some("203.0.113.7".parse().unwrap())),
        );

        let resolved = resolver.resolve("localhost").await.unwrap();
        assert_eq!(resolved.to_string(), "203.0.113.7");
        assert_eq!(resolver.echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loopback_name_survives_echo_failure() {
        let resolver = HostResolver::with_lookups(
            FakeDns::answering(Some(Ipv4Addr::LOCALHOST)),
            FakeEcho::answering(None),
        );

        let resolved = resolver.resolve("localhost").await.unwrap();
        assert_eq!(resolved.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn other_names_never_ask_the_echo() {
        let resolver = HostResolver::with_lookups(
            FakeDns::answering(Some(Ipv4Addr::new(198, 51, 100, 4))),
            FakeEcho::answering(Some("203.0.113.7".parse().unwrap())),
        );

        let resolved = resolver.resolve("cod.example.com").await.unwrap();
        assert_eq!(resolved.to_string(), "198.51.100.4");
        assert_eq!(resolver.echo.calls.load(Ordering::SeqCst), 0);
    }

    /// Serves one HTTP connection, answering with `body` or, given `None`, never answering.
    async fn echo_server(body: Option<&'static str>) -> HttpEcho {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request).await;
            match body {
                Some(body) => {
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    stream.write_all(response.as_bytes()).await.unwrap();
                    stream.shutdown().await.unwrap();
                }
                None => tokio::time::sleep(Duration::from_secs(30)).await,
            }
        });

        HttpEcho::new(&ClientConfig {
            echo_url: format!("http://{addr}/"),
            echo_timeout: Duration::from_millis(300),
            ..ClientConfig::default()
        })
    }

    #[tokio::test]
    async fn http_echo_reads_a_plain_address() {
        let echo = echo_server(Some("203.0.113.7\n")).await;
        assert_eq!(echo.public_ip().await, Some("203.0.113.7".parse().unwrap()));
    }

    #[tokio::test]
    async fn http_echo_ignores_a_non_address_body() {
        let echo = echo_server(Some("<html>")).await;
        assert_eq!(echo.public_ip().await, None);

        let resolver = HostResolver::with_lookups(
            FakeDns::answering(Some(Ipv4Addr::LOCALHOST)),
            echo_server(Some("<html>")).await,
        );
        let resolved = resolver.resolve("localhost").await.unwrap();
        assert_eq!(resolved.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn http_echo_gives_up_after_its_timeout() {
        let echo = echo_server(None).await;

        let started = std::time::Instant::now();
        assert_eq!(echo.public_ip().await, None);
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn real_dns_fails_for_unknown_tld() {
        let resolver = HostResolver::with_lookups(SystemDns, NoEcho);

        let err = resolver.resolve("nonexistent.invalid.tld").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionFailed);
    }
}
