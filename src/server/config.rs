//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::{DEFAULT_PORT, RECV_BUFFER_SIZE};

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Close a connection that sends nothing for this long (None = never)
    pub idle_timeout: Option<Duration>,

    /// Reaper sweep interval
    pub reap_interval: Duration,

    /// Bytes requested per socket read
    pub read_buffer_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Periodically log connections and subscribers
    pub verbose: bool,

    /// Status report interval (verbose mode)
    pub stats_interval: Duration,

    /// How long `stop` waits for background tasks to finish
    pub shutdown_timeout: Duration,

    /// Pause after a failed accept before trying again
    pub accept_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            max_connections: 0, // Unlimited
            idle_timeout: Some(Duration::from_secs(300)),
            reap_interval: Duration::from_millis(100),
            read_buffer_size: RECV_BUFFER_SIZE,
            tcp_nodelay: true,
            verbose: false,
            stats_interval: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(5),
            accept_backoff: Duration::from_millis(100),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the port, keeping the bind IP
    pub fn port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Never time out idle connections
    pub fn disable_idle_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    /// Set reaper sweep interval
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Set read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Enable or disable the status reporter
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set status report interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Set shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the pause after a failed accept
    pub fn accept_backoff(mut self, backoff: Duration) -> Self {
        self.accept_backoff = backoff;
        self
    }
}

/// Address of the interface that routes to the outside world
///
/// Connecting a UDP socket sends no packets; it only makes the OS pick a
/// source address. Falls back to `0.0.0.0` when there is no route.
pub fn primary_interface_addr() -> IpAddr {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| s.connect("8.8.8.8:80").map(|()| s))
        .and_then(|s| s.local_addr())
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 3513);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.read_buffer_size, RECV_BUFFER_SIZE);
        assert!(config.tcp_nodelay);
        assert!(!config.verbose);
        assert_eq!(config.stats_interval, Duration::from_millis(500));
        assert_eq!(config.accept_backoff, Duration::from_millis(100));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn test_builder_port_keeps_ip() {
        let addr: SocketAddr = "10.1.2.3:3513".parse().unwrap();
        let config = ServerConfig::with_addr(addr).port(4000);

        assert_eq!(config.bind_addr, "10.1.2.3:4000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_builder_idle_timeout() {
        let config = ServerConfig::default().idle_timeout(Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));

        let config = config.disable_idle_timeout();
        assert_eq!(config.idle_timeout, None);
    }

    #[test]
    fn test_builder_read_buffer_size_nonzero() {
        let config = ServerConfig::default().read_buffer_size(0);

        assert_eq!(config.read_buffer_size, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:3513".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .reap_interval(Duration::from_millis(20))
            .verbose(true)
            .stats_interval(Duration::from_secs(1))
            .shutdown_timeout(Duration::from_secs(2))
            .accept_backoff(Duration::from_millis(10));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.reap_interval, Duration::from_millis(20));
        assert!(config.verbose);
        assert_eq!(config.stats_interval, Duration::from_secs(1));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.accept_backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_primary_interface_addr_is_ipv4() {
        // No route in a sandbox still yields the unspecified fallback
        assert!(primary_interface_addr().is_ipv4());
    }
}
