use serde::{Deserialize, Serialize};

use crate::protocol::{
    DEFAULT_MAX_CONNECTIONS, DEFAULT_RELEVANCY_DISTANCE, DEFAULT_SERVER_PORT, DEFAULT_TICK_RATE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMode {
    /// No sockets; the world still ticks locally.
    Standalone,
    Server,
    Client,
}

/// Runtime configuration handed to [`NetworkManager`](crate::NetworkManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mode: NetworkMode,
    /// Server to connect to (client mode). Hostnames are resolved at init.
    pub server_address: String,
    pub server_port: u16,
    pub max_connections: u32,
    /// Replication bursts per second. Values <= 0 fall back to the default.
    pub tick_rate: f32,
    pub enable_relevancy: bool,
    pub relevancy_distance: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: NetworkMode::Standalone,
            server_address: "127.0.0.1".to_string(),
            server_port: DEFAULT_SERVER_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            tick_rate: DEFAULT_TICK_RATE,
            enable_relevancy: false,
            relevancy_distance: DEFAULT_RELEVANCY_DISTANCE,
        }
    }
}

impl NetworkConfig {
    /// The replication rate with the positivity clamp applied.
    pub fn replication_rate(&self) -> f32 {
        if self.tick_rate > 0.0 {
            self.tick_rate
        } else {
            DEFAULT_TICK_RATE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.mode, NetworkMode::Standalone);
        assert_eq!(config.server_port, 7777);
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.tick_rate, 30.0);
        assert!(!config.enable_relevancy);
    }

    #[test]
    fn test_tick_rate_clamp() {
        let config = NetworkConfig {
            tick_rate: 0.0,
            ..Default::default()
        };
        assert_eq!(config.replication_rate(), DEFAULT_TICK_RATE);

        let config = NetworkConfig {
            tick_rate: -5.0,
            ..Default::default()
        };
        assert_eq!(config.replication_rate(), DEFAULT_TICK_RATE);
    }
}
