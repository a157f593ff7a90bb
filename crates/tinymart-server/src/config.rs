//! Server configuration.

use std::time::Duration;

use clap::Parser;
use tinymart_proto::DEFAULT_CORRELATION_VARIABLE;

use crate::error::ServerError;

/// Default address for the HTTP and WebSocket listener.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";

/// Default capacity of each subscription's event channel.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

/// Default capacity of each connection's outbound frame queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Default wait for forwarding tasks when a connection tears down.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

/// Per-connection session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of each subscription's event channel.
    pub subscriber_buffer: usize,
    /// Capacity of the outbound frame queue.
    pub outbound_buffer: usize,
    /// `start` variable carrying the correlation key.
    pub correlation_variable: String,
    /// Bounded wait for forwarding tasks at teardown.
    pub shutdown_grace: Duration,
    /// Interval between `ka` messages. None disables keep-alive.
    pub keepalive: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            correlation_variable: DEFAULT_CORRELATION_VARIABLE.to_string(),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
            keepalive: None,
        }
    }
}

/// tinymart server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080").
    pub listen_address: String,

    /// Origins allowed to open a WebSocket. Empty allows every origin.
    pub allowed_origins: Vec<String>,

    /// Session settings applied to every connection.
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Create a configuration listening on `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            listen_address: address.into(),
            allowed_origins: Vec::new(),
            session: SessionConfig::default(),
        }
    }

    /// Allow WebSocket upgrades from `origin`.
    pub fn with_allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Set the per-subscription channel capacity.
    pub fn with_subscriber_buffer(mut self, capacity: usize) -> Self {
        self.session.subscriber_buffer = capacity;
        self
    }

    /// Set the per-connection outbound queue capacity.
    pub fn with_outbound_buffer(mut self, capacity: usize) -> Self {
        self.session.outbound_buffer = capacity;
        self
    }

    /// Set the `start` variable that carries the correlation key.
    pub fn with_correlation_variable(mut self, name: impl Into<String>) -> Self {
        self.session.correlation_variable = name.into();
        self
    }

    /// Set the teardown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.session.shutdown_grace = grace;
        self
    }

    /// Enable keep-alive messages.
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.session.keepalive = Some(interval);
        self
    }

    /// Whether `origin` may open a WebSocket.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|origin| self.allowed_origins.iter().any(|o| o == origin))
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.session.subscriber_buffer == 0 {
            return Err(ServerError::Config(
                "subscriber buffer must be at least 1".to_string(),
            ));
        }
        if self.session.outbound_buffer == 0 {
            return Err(ServerError::Config(
                "outbound buffer must be at least 1".to_string(),
            ));
        }
        if self.session.correlation_variable.is_empty() {
            return Err(ServerError::Config(
                "correlation variable must not be empty".to_string(),
            ));
        }
        if self.session.keepalive == Some(Duration::ZERO) {
            return Err(ServerError::Config(
                "keep-alive interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LISTEN_ADDRESS)
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "tinymart-server")]
#[command(version, about = "tinymart delivery subscription server", long_about = None)]
pub struct Args {
    /// Address to bind to.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen: String,

    /// Origin allowed to open a WebSocket (repeatable). None allows all.
    #[arg(long = "allow-origin")]
    pub allow_origin: Vec<String>,

    /// Per-subscription event channel capacity.
    #[arg(long, default_value_t = DEFAULT_SUBSCRIBER_BUFFER)]
    pub subscriber_buffer: usize,

    /// Per-connection outbound frame queue capacity.
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_BUFFER)]
    pub outbound_buffer: usize,

    /// `start` variable carrying the correlation key.
    #[arg(long, default_value = DEFAULT_CORRELATION_VARIABLE)]
    pub correlation_variable: String,

    /// Teardown grace period in milliseconds.
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,

    /// Keep-alive interval in seconds. Set to 0 to disable.
    #[arg(long, default_value_t = 0)]
    pub keepalive_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> ServerConfig {
        let keepalive = if self.keepalive_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.keepalive_secs))
        };

        ServerConfig {
            listen_address: self.listen,
            allowed_origins: self.allow_origin,
            session: SessionConfig {
                subscriber_buffer: self.subscriber_buffer,
                outbound_buffer: self.outbound_buffer,
                correlation_variable: self.correlation_variable,
                shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
                keepalive,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_address, DEFAULT_LISTEN_ADDRESS);
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.session.subscriber_buffer, DEFAULT_SUBSCRIBER_BUFFER);
        assert_eq!(config.session.correlation_variable, "purchaseId");
        assert!(config.session.keepalive.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::new("127.0.0.1:9090")
            .with_allowed_origin("http://localhost:3000")
            .with_subscriber_buffer(4)
            .with_outbound_buffer(8)
            .with_correlation_variable("orderId")
            .with_shutdown_grace(Duration::from_millis(250))
            .with_keepalive(Duration::from_secs(10));

        assert_eq!(config.listen_address, "127.0.0.1:9090");
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.session.subscriber_buffer, 4);
        assert_eq!(config.session.outbound_buffer, 8);
        assert_eq!(config.session.correlation_variable, "orderId");
        assert_eq!(config.session.shutdown_grace, Duration::from_millis(250));
        assert_eq!(config.session.keepalive, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_validate_rejects_zero_buffers() {
        assert!(ServerConfig::default()
            .with_subscriber_buffer(0)
            .validate()
            .is_err());
        assert!(ServerConfig::default()
            .with_outbound_buffer(0)
            .validate()
            .is_err());
        assert!(ServerConfig::default()
            .with_correlation_variable("")
            .validate()
            .is_err());
    }

    #[test]
    fn test_origin_policy() {
        let open = ServerConfig::default();
        assert!(open.origin_allowed(None));
        assert!(open.origin_allowed(Some("http://evil.example")));

        let closed = ServerConfig::default().with_allowed_origin("http://shop.example");
        assert!(closed.origin_allowed(Some("http://shop.example")));
        assert!(!closed.origin_allowed(Some("http://evil.example")));
        assert!(!closed.origin_allowed(None));
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "tinymart-server",
            "--listen",
            "127.0.0.1:0",
            "--allow-origin",
            "http://a.example",
            "--allow-origin",
            "http://b.example",
            "--keepalive-secs",
            "15",
        ]);
        let config = args.into_config();

        assert_eq!(config.listen_address, "127.0.0.1:0");
        assert_eq!(config.allowed_origins.len(), 2);
        assert_eq!(config.session.keepalive, Some(Duration::from_secs(15)));
        assert_eq!(
            config.session.shutdown_grace,
            Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS)
        );
    }
}
