use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0"; // all interfaces
pub const DEFAULT_PORT: u16 = 8765;
pub const FRAME_INTERVAL_MS: u64 = 100; // 10 frames per second

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frame_interval: Duration,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn frame_rate_hz(&self) -> f64 {
        1.0 / self.frame_interval.as_secs_f64()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            frame_interval: Duration::from_millis(FRAME_INTERVAL_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_all_interfaces_at_ten_hz() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8765");
        assert!((config.frame_rate_hz() - 10.0).abs() < 1e-9);
    }
}
