//! Loader for workspace configuration with YAML + environment overlays.
//!
//! A `holdfast.yaml` file describes the WebDriver endpoint, browser kind,
//! retry budget, and (optionally) a driver binary to launch. Values may embed
//! `${VAR}` placeholders that are expanded from the environment after all
//! sources are merged; `HOLDFAST_`-prefixed environment variables override
//! file values.
use config::{Config, Environment, File};
use holdfast_common::{BrowserKind, HoldfastError};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

/// Top-level configuration for a Holdfast automation run.
#[derive(Debug, Deserialize)]
pub struct HoldfastConfig {
    pub version: Option<String>,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub driver: DriverSettings,
}

/// Settings consumed by the session layer.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Browser family to drive.
    pub browser: BrowserKind,
    /// Run without a visible window.
    pub headless: bool,
    /// WebDriver endpoint to attach to when no driver binary is launched.
    pub webdriver_url: String,
    /// Retry budget applied to element interactions.
    pub retry: RetrySettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            browser: BrowserKind::default(),
            headless: true,
            webdriver_url: default_webdriver_url(),
            retry: RetrySettings::default(),
        }
    }
}

/// Polling budget for element interactions: total timeout and the fixed
/// delay slept between attempts.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    pub timeout_ms: u64,
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            delay_ms: 1_000,
        }
    }
}

/// Settings for launching and cleaning up driver executables.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Path to a driver binary to spawn. When unset, Holdfast attaches to
    /// `session.webdriver_url` instead.
    pub binary: Option<String>,
    /// Port the spawned driver listens on.
    pub port: u16,
    /// Kill leftover driver processes before launching a fresh one.
    pub kill_stale: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            binary: None,
            port: 9515,
            kill_stale: true,
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                // Depth cap keeps cyclic definitions from looping forever.
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring (YAML + env overrides).
pub struct HoldfastConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for HoldfastConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl HoldfastConfigLoader {
    /// Start an empty loader; file/inline sources are layered in the order
    /// they are added, and `load` puts the `HOLDFAST_` env overlay on top.
    ///
    /// ```
    /// use holdfast_config::HoldfastConfigLoader;
    ///
    /// let config = HoldfastConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.session.webdriver_url, "http://localhost:9515");
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self.builder.add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Merge an inline YAML snippet (tests, CLI overrides).
    ///
    /// ```
    /// use holdfast_common::BrowserKind;
    /// use holdfast_config::HoldfastConfigLoader;
    ///
    /// let cfg = HoldfastConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// session:
    ///   browser: "firefox"
    ///   headless: false
    ///   retry:
    ///     timeout_ms: 5000
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.session.browser, BrowserKind::Firefox);
    /// assert!(!cfg.session.headless);
    /// assert_eq!(cfg.session.retry.timeout_ms, 5000);
    /// assert_eq!(cfg.session.retry.delay_ms, 1000);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources.
    ///
    /// Sources are merged, `${VAR}` placeholders expanded recursively, then
    /// the result is materialised into [`HoldfastConfig`].
    ///
    /// ```
    /// use holdfast_config::HoldfastConfigLoader;
    ///
    /// std::env::set_var("DRIVER_HOME", "/opt/drivers");
    ///
    /// let config = HoldfastConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// driver:
    ///   binary: "${DRIVER_HOME}/chromedriver"
    ///   port: 4444
    /// "#,
    ///     )
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.driver.binary.as_deref(), Some("/opt/drivers/chromedriver"));
    /// assert_eq!(config.driver.port, 4444);
    ///
    /// std::env::remove_var("DRIVER_HOME");
    /// ```
    pub fn load(self) -> holdfast_common::Result<HoldfastConfig> {
        // The env overlay goes in last: the `config` crate gives later
        // sources precedence, and `HOLDFAST_` variables must beat the file.
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("HOLDFAST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| HoldfastError::Config(e.to_string()))?;

        let mut v: Value = cfg
            .try_deserialize()
            .map_err(|e| HoldfastError::Config(e.to_string()))?;
        expand_env_in_value(&mut v);

        serde_json::from_value(v).map_err(|e| HoldfastError::Config(e.to_string()))
    }
}
