use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::monitoring::validation::validate_checks;
use crate::monitoring::CheckDefinition;

const DEFAULT_TOPIC: &str = "vigil.health.status";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config path unavailable: pass --config, set VIGIL_CONFIG or make $HOME resolvable")]
    PathUnavailable,
    #[error("can't read config file '{}': {}", .path.display(), .source)]
    Read { path: PathBuf, source: std::io::Error },
    #[error("can't parse config file '{}': {}", .path.display(), .source)]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid configuration:\n{}", .issues.join("\n"))]
    Invalid { issues: Vec<String> },
}

/// Raw on-disk configuration
///
/// Every section is optional at parse time so that validation can report
/// the full list of missing and invalid values in one pass, scoped to
/// what the running subcommand actually needs.
#[derive(Debug, Deserialize)]
pub struct Config {
    probe: Option<RawProbe>,
    checks: Option<Vec<RawCheck>>,
    bus: Option<RawBus>,
    database: Option<RawDatabase>,
}

#[derive(Debug, Deserialize)]
struct RawProbe {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawCheck {
    url: Option<String>,
    period_secs: Option<f64>,
    #[serde(default)]
    patterns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawBus {
    endpoint: Option<String>,
    topic: Option<String>,
    curve: Option<RawCurve>,
}

#[derive(Debug, Deserialize)]
struct RawCurve {
    server_public_key_file: Option<PathBuf>,
    public_key_file: Option<PathBuf>,
    secret_key_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    path: Option<PathBuf>,
}

/// Everything the `watch` subcommand needs, fully validated
#[derive(Debug)]
pub struct WatchConfig {
    pub probe_timeout: Duration,
    pub checks: Vec<CheckDefinition>,
    pub bus: BusConfig,
}

/// Everything the `collect` subcommand needs, fully validated
#[derive(Debug)]
pub struct CollectConfig {
    pub bus: BusConfig,
    pub database: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub endpoint: String,
    pub topic: String,
    pub curve: Option<CurveConfig>,
}

/// Decoded CURVE key material for mutual authentication with the broker
#[derive(Debug, Clone)]
pub struct CurveConfig {
    pub server_public_key: Vec<u8>,
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &Path) -> PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::PathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

impl Config {
    /// Read and parse the configuration file
    ///
    /// The path is the one given, or `$VIGIL_CONFIG`, or the default
    /// config location. Nothing is validated yet; call `for_watch` or
    /// `for_collect` for the sections the subcommand needs.
    pub fn from_config(optional_path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        let config_path: PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else if let Ok(path) = env::var("VIGIL_CONFIG") {
            normalize_toml_path(Path::new(&path))
        } else {
            default_config_path()?
        };

        let raw_string = fs::read_to_string(&config_path)
            .map_err(|source| ConfigError::Read { path: config_path.clone(), source })?;
        toml::from_str(raw_string.as_str())
            .map_err(|source| ConfigError::Parse { path: config_path, source })
    }

    pub fn for_watch(&self) -> Result<WatchConfig, ConfigError> {
        let mut issues = Vec::new();

        let probe_timeout = self.build_probe_timeout(&mut issues);
        let checks = self.build_checks(&mut issues);
        let bus = self.build_bus(&mut issues);

        match (checks, bus) {
            (Some(checks), Some(bus)) if issues.is_empty() => {
                Ok(WatchConfig { probe_timeout, checks, bus })
            }
            _ => Err(ConfigError::Invalid { issues }),
        }
    }

    pub fn for_collect(&self) -> Result<CollectConfig, ConfigError> {
        let mut issues = Vec::new();

        let bus = self.build_bus(&mut issues);
        let database = self.build_database(&mut issues);

        match (bus, database) {
            (Some(bus), Some(database)) if issues.is_empty() => {
                Ok(CollectConfig { bus, database })
            }
            _ => Err(ConfigError::Invalid { issues }),
        }
    }

    fn build_probe_timeout(&self, issues: &mut Vec<String>) -> Duration {
        let secs = self
            .probe
            .as_ref()
            .and_then(|probe| probe.timeout_secs)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);
        if secs == 0 {
            issues.push("[probe]: timeout_secs must be positive".to_string());
        }
        Duration::from_secs(secs)
    }

    fn build_checks(&self, issues: &mut Vec<String>) -> Option<Vec<CheckDefinition>> {
        let raw_checks = match &self.checks {
            Some(raw_checks) if !raw_checks.is_empty() => raw_checks,
            _ => {
                issues.push("[[checks]]: at least one health check must be configured".to_string());
                return None;
            }
        };

        let mut checks = Vec::with_capacity(raw_checks.len());
        for (index, raw) in raw_checks.iter().enumerate() {
            if raw.url.is_none() {
                issues.push(format!("checks[{index}]: missing 'url'"));
            }

            let period = match raw.period_secs {
                None => {
                    issues.push(format!("checks[{index}]: missing 'period_secs'"));
                    None
                }
                Some(secs) if !secs.is_finite() || secs <= 0.0 => {
                    issues.push(format!(
                        "checks[{index}]: period_secs must be positive, got {secs}"
                    ));
                    None
                }
                Some(secs) => Some(Duration::from_secs_f64(secs)),
            };

            let mut patterns = Vec::with_capacity(raw.patterns.len());
            let mut patterns_ok = true;
            for pattern in &raw.patterns {
                match Regex::new(pattern) {
                    Ok(regex) => patterns.push(regex),
                    Err(err) => {
                        issues.push(format!("checks[{index}]: invalid pattern '{pattern}': {err}"));
                        patterns_ok = false;
                    }
                }
            }

            if let (Some(url), Some(period), true) = (raw.url.clone(), period, patterns_ok) {
                checks.push(CheckDefinition { url, period, patterns });
            }
        }

        // Semantic validation only makes sense once every entry built
        if checks.len() == raw_checks.len() {
            if let Err(err) = validate_checks(&checks) {
                issues.extend(err.issues);
                return None;
            }
            Some(checks)
        } else {
            None
        }
    }

    fn build_bus(&self, issues: &mut Vec<String>) -> Option<BusConfig> {
        let Some(raw) = &self.bus else {
            issues.push("[bus]: missing section".to_string());
            return None;
        };

        if raw.endpoint.is_none() {
            issues.push("[bus]: missing 'endpoint' (address of the status broker)".to_string());
        }
        let topic = raw.topic.clone().unwrap_or_else(|| DEFAULT_TOPIC.to_string());

        let curve = match &raw.curve {
            None => None,
            Some(raw_curve) => {
                let server_public_key =
                    load_curve_key(&raw_curve.server_public_key_file, "server_public_key_file", issues);
                let public_key = load_curve_key(&raw_curve.public_key_file, "public_key_file", issues);
                let secret_key = load_curve_key(&raw_curve.secret_key_file, "secret_key_file", issues);
                match (server_public_key, public_key, secret_key) {
                    (Some(server_public_key), Some(public_key), Some(secret_key)) => {
                        Some(CurveConfig { server_public_key, public_key, secret_key })
                    }
                    _ => return None,
                }
            }
        };

        raw.endpoint.clone().map(|endpoint| BusConfig { endpoint, topic, curve })
    }

    fn build_database(&self, issues: &mut Vec<String>) -> Option<PathBuf> {
        let Some(raw) = &self.database else {
            issues.push("[database]: missing section".to_string());
            return None;
        };

        match &raw.path {
            Some(path) => Some(path.clone()),
            None => {
                issues.push("[database]: missing 'path'".to_string());
                None
            }
        }
    }
}

/// Read one Z85-encoded CURVE key (40 characters, decoding to 32 bytes)
fn load_curve_key(
    path: &Option<PathBuf>,
    field: &str,
    issues: &mut Vec<String>,
) -> Option<Vec<u8>> {
    let Some(path) = path else {
        issues.push(format!("[bus.curve]: missing '{field}'"));
        return None;
    };

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            issues.push(format!(
                "[bus.curve]: can't read '{field}' file '{}': {err}",
                path.display()
            ));
            return None;
        }
    };

    match zmq::z85_decode(raw.trim()) {
        Ok(key) if key.len() == 32 => Some(key),
        Ok(_) => {
            issues.push(format!(
                "[bus.curve]: key in '{}' must be 40 Z85 characters",
                path.display()
            ));
            None
        }
        Err(err) => {
            issues.push(format!(
                "[bus.curve]: invalid Z85 key in '{}': {err:?}",
                path.display()
            ));
            None
        }
    }
}
