use crate::errors::{Error, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_INFLUX_URL: &str = "http://influxdb:8086";
const DEFAULT_INFLUX_ORG: &str = "myorg";
const DEFAULT_INFLUX_BUCKET: &str = "sensor_data";
const DEFAULT_PORT: u16 = 8080;

/// Connection settings for the InfluxDB v2 API.
#[derive(Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl std::fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("token", &"***")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Upper bound on each kind of store call.
#[derive(Debug, Clone, Copy)]
pub struct StoreTimeouts {
    pub write: Duration,
    pub list: Duration,
    pub get: Duration,
    pub health: Duration,
    pub startup: Duration,
}

impl Default for StoreTimeouts {
    fn default() -> Self {
        Self {
            write: Duration::from_secs(5),
            list: Duration::from_secs(10),
            get: Duration::from_secs(5),
            health: Duration::from_secs(3),
            startup: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub influx: InfluxConfig,
    pub port: u16,
    pub timeouts: StoreTimeouts,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = read("INFLUXDB_TOKEN").ok_or_else(|| {
            Error::Config("INFLUXDB_TOKEN environment variable is required".to_string())
        })?;

        let port = match read("PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| Error::Config(format!("PORT '{}' is not a valid port", port)))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            influx: InfluxConfig {
                url: read("INFLUXDB_URL").unwrap_or_else(|| DEFAULT_INFLUX_URL.to_string()),
                token,
                org: read("INFLUXDB_ORG").unwrap_or_else(|| DEFAULT_INFLUX_ORG.to_string()),
                bucket: read("INFLUXDB_BUCKET")
                    .unwrap_or_else(|| DEFAULT_INFLUX_BUCKET.to_string()),
            },
            port,
            timeouts: StoreTimeouts::default(),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("INFLUXDB_TOKEN", "t0k")])).unwrap();
        assert_eq!(config.influx.url, "http://influxdb:8086");
        assert_eq!(config.influx.org, "myorg");
        assert_eq!(config.influx.bucket, "sensor_data");
        assert_eq!(config.influx.token, "t0k");
        assert_eq!(config.port, 8080);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_blank_token_is_fatal() {
        assert!(Config::from_lookup(lookup(&[("INFLUXDB_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("INFLUXDB_TOKEN", "t"),
            ("INFLUXDB_URL", "http://localhost:9999"),
            ("INFLUXDB_ORG", "acme"),
            ("INFLUXDB_BUCKET", "weather"),
            ("PORT", "3000"),
        ]))
        .unwrap();
        assert_eq!(config.influx.url, "http://localhost:9999");
        assert_eq!(config.influx.org, "acme");
        assert_eq!(config.influx.bucket, "weather");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_invalid_port() {
        let result = Config::from_lookup(lookup(&[("INFLUXDB_TOKEN", "t"), ("PORT", "http")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let config = Config::from_lookup(lookup(&[("INFLUXDB_TOKEN", "hunter2")])).unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
