//! Runtime configuration, read from environment variables with defaults for the
//! Washington DC deployment.

use std::time::Duration;

use serde::Serialize;

use crate::errors::ConfigError;

pub const DEFAULT_FEED_URL: &str = "https://opensky-network.org/api/states/all";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PORT: u16 = 3000;

/// Rectangular latitude/longitude window queried from the feed, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    lamin: f64,
    lamax: f64,
    lomin: f64,
    lomax: f64,
}

/// Southern Virginia to northern Maryland, western to eastern suburbs.
pub const WASHINGTON_DC: BoundingBox = BoundingBox {
    lamin: 38.5,
    lamax: 39.5,
    lomin: -77.5,
    lomax: -76.5,
};

impl BoundingBox {
    pub fn new(lamin: f64, lamax: f64, lomin: f64, lomax: f64) -> Result<Self, ConfigError> {
        if !(lamin < lamax) {
            return Err(ConfigError::Bounds(format!("lamin {lamin} must be below lamax {lamax}")));
        }
        if !(lomin < lomax) {
            return Err(ConfigError::Bounds(format!("lomin {lomin} must be below lomax {lomax}")));
        }
        if lamin < -90.0 || lamax > 90.0 || lomin < -180.0 || lomax > 180.0 {
            return Err(ConfigError::Bounds(format!(
                "[{lamin},{lamax}]x[{lomin},{lomax}] exceeds world coordinates"
            )));
        }
        Ok(BoundingBox { lamin, lamax, lomin, lomax })
    }

    pub fn lamin(&self) -> f64 {
        self.lamin
    }

    pub fn lamax(&self) -> f64 {
        self.lamax
    }

    pub fn lomin(&self) -> f64 {
        self.lomin
    }

    pub fn lomax(&self) -> f64 {
        self.lomax
    }

    /// Query parameters in the order the feed documents them.
    pub fn query(&self) -> [(&'static str, f64); 4] {
        [
            ("lamin", self.lamin),
            ("lamax", self.lamax),
            ("lomin", self.lomin),
            ("lomax", self.lomax),
        ]
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = ConfigError;

    /// Parses `lamin,lamax,lomin,lomax`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Bounds(format!("{s}: {e}")))?;

        match parts.as_slice() {
            [lamin, lamax, lomin, lomax] => BoundingBox::new(*lamin, *lamax, *lomin, *lomax),
            _ => Err(ConfigError::Bounds(format!("{s}: expected 4 comma separated values"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Upstream states endpoint
    pub feed_url: String,

    pub bounds: BoundingBox,

    /// Delay between fetch cycles
    pub poll_interval: Duration,

    /// Upper bound for a single feed request
    pub request_timeout: Duration,

    /// Port of the host HTTP server
    pub port: u16,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            feed_url: DEFAULT_FEED_URL.to_string(),
            bounds: WASHINGTON_DC,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            port: DEFAULT_PORT,
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the config from an arbitrary variable lookup; unset variables keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = TrackerConfig::default();

        if let Some(url) = lookup("FEED_URL") {
            config.feed_url = url;
        }
        if let Some(bounds) = lookup("TRACKER_BOUNDS") {
            config.bounds = bounds.parse()?;
        }
        if let Some(secs) = lookup("POLL_INTERVAL_SECS") {
            config.poll_interval = parse_secs("POLL_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = parse_secs("REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port.parse().map_err(|_| ConfigError::Env { var: "PORT", value: port.clone() })?;
        }

        Ok(config)
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Env { var, value: value.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_bounds_validation() {
        assert!(BoundingBox::new(38.5, 39.5, -77.5, -76.5).is_ok());
        assert!(BoundingBox::new(39.5, 38.5, -77.5, -76.5).is_err());
        assert!(BoundingBox::new(38.5, 39.5, -76.5, -76.5).is_err());
        assert!(BoundingBox::new(38.5, 95.0, -77.5, -76.5).is_err());
        assert!(BoundingBox::new(f64::NAN, 39.5, -77.5, -76.5).is_err());
    }

    #[test]
    fn test_bounds_from_str() {
        let bounds: BoundingBox = "47.0, 47.8, 8.0,8.9".parse().unwrap();
        assert_eq!(bounds.lamin(), 47.0);
        assert_eq!(bounds.lomax(), 8.9);
        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("a,b,c,d".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = TrackerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bounds, WASHINGTON_DC);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_config_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PORT", "8080"),
            ("POLL_INTERVAL_SECS", "30"),
            ("TRACKER_BOUNDS", "46.9,47.9,7.9,8.9"),
        ]);
        let config = TrackerConfig::from_lookup(|v| vars.get(v).map(|s| s.to_string())).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.bounds.lamin(), 46.9);

        let bad = TrackerConfig::from_lookup(|v| (v == "POLL_INTERVAL_SECS").then(|| "0".to_string()));
        assert_eq!(
            bad.unwrap_err(),
            ConfigError::Env { var: "POLL_INTERVAL_SECS", value: "0".to_string() }
        );
    }
}
