use std::path::PathBuf;
use std::time::Duration;

/// Process settings, read once from `HAVEN_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends since the last compaction that trigger a rewrite.
    pub compact_threshold: u64,
    pub cache_sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            cache_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values fall back to
    /// the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| -> Option<u64> {
            let raw = lookup(name)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("ignoring invalid {name}={raw:?}");
                    None
                }
            }
        };

        Self {
            bind: lookup("HAVEN_BIND").unwrap_or(defaults.bind),
            port: parsed("HAVEN_PORT")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(defaults.port),
            data_dir: lookup("HAVEN_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            metrics_port: parsed("HAVEN_METRICS_PORT").and_then(|p| u16::try_from(p).ok()),
            compact_threshold: parsed("HAVEN_COMPACT_THRESHOLD")
                .filter(|&t| t > 0)
                .unwrap_or(defaults.compact_threshold),
            cache_sweep_interval: parsed("HAVEN_CACHE_SWEEP_SECS")
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_sweep_interval),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("haven.wal")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]), Config::default());
        assert_eq!(Config::default().addr(), "0.0.0.0:8080");
    }

    #[test]
    fn reads_all_variables() {
        let cfg = config(&[
            ("HAVEN_BIND", "127.0.0.1"),
            ("HAVEN_PORT", "9000"),
            ("HAVEN_DATA_DIR", "/var/lib/haven"),
            ("HAVEN_METRICS_PORT", "9100"),
            ("HAVEN_COMPACT_THRESHOLD", "50"),
            ("HAVEN_CACHE_SWEEP_SECS", "5"),
        ]);
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/haven/haven.wal"));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.cache_sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = config(&[
            ("HAVEN_PORT", "99999"),
            ("HAVEN_METRICS_PORT", "off"),
            ("HAVEN_COMPACT_THRESHOLD", "0"),
        ]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.compact_threshold, 1000);
    }
}
