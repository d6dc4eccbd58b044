//! Configuration loading for duskbar.
//!
//! The bar reads a single TOML file. Every section is optional; missing keys
//! fall back to the values in [`DEFAULT_CONFIG_TOML`], which mirrors
//! `Config::default()`.
//!
//! Lookup order:
//! 1. An explicit path (from `--config`), which must exist
//! 2. `$XDG_CONFIG_HOME/duskbar/config.toml`
//! 3. `~/.config/duskbar/config.toml`
//! 4. Built-in defaults

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// The default configuration, shipped as documentation for users.
pub const DEFAULT_CONFIG_TOML: &str = r#"# duskbar configuration

[popups]
names = ["audio-popup", "brightness-popup", "wifi-popup", "bluetooth-popup"]
backdrop = "popup-backdrop"

[wifi]
fallback_interface = "wlp5s0"
max_networks = 8
min_password_len = 8
poll_interval_ms = 5000
connect_check_interval_ms = 2000
connect_max_attempts = 5
indicator_interval_ms = 2000
settings_command = "plasma-open-settings kcm_networkmanagement"

[bluetooth]
indicator_interval_ms = 2000
settings_command = "plasma-open-settings kcm_bluetooth"

[night_light]
latitude = 30.27
longitude = -97.74
auto = true
check_interval_secs = 60
# Present while the night light is on. The brightness script checks the same
# path to pick its shader, so change both together.
marker_file = "/tmp/duskbar-nightlight-active"

[brightness]
# Called with one integer percentage. It must read night_light.marker_file
# (default /tmp/duskbar-nightlight-active) to decide between the dim and the
# warm+dim shader.
script = "~/.config/hypr/scripts/set-brightness.sh"
initial = 100
min = 5

[caffeine]
marker_file = "/tmp/duskbar-caffeine-active"

[workspaces]
fallback = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]

[workspaces.monitors]
"DP-3" = [1, 2, 3, 10]
"DP-1" = [4, 5, 6]
"HDMI-A-1" = [7, 8, 9]
"#;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub popups: PopupsConfig,
    pub wifi: WifiConfig,
    pub bluetooth: BluetoothConfig,
    pub night_light: NightLightConfig,
    pub brightness: BrightnessConfig,
    pub caffeine: CaffeineConfig,
    pub workspaces: WorkspacesConfig,
}

/// Named popups managed by the popup controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopupsConfig {
    /// Popup surfaces, in the order they are registered.
    pub names: Vec<String>,
    /// Name of the full-screen surface that catches outside clicks.
    pub backdrop: String,
}

impl Default for PopupsConfig {
    fn default() -> Self {
        Self {
            names: ["audio-popup", "brightness-popup", "wifi-popup", "bluetooth-popup"]
                .into_iter()
                .map(String::from)
                .collect(),
            backdrop: "popup-backdrop".to_string(),
        }
    }
}

/// WiFi popup behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WifiConfig {
    /// Interface used for disconnect when `nmcli device status` has no wifi row.
    pub fallback_interface: String,
    /// Maximum number of networks shown per scan.
    pub max_networks: usize,
    pub min_password_len: usize,
    /// Rescan period while the popup is open.
    pub poll_interval_ms: u64,
    /// Delay between active-connection checks after a password submit.
    pub connect_check_interval_ms: u64,
    pub connect_max_attempts: u32,
    /// Tray indicator refresh period.
    pub indicator_interval_ms: u64,
    pub settings_command: String,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            fallback_interface: "wlp5s0".to_string(),
            max_networks: 8,
            min_password_len: 8,
            poll_interval_ms: 5000,
            connect_check_interval_ms: 2000,
            connect_max_attempts: 5,
            indicator_interval_ms: 2000,
            settings_command: "plasma-open-settings kcm_networkmanagement".to_string(),
        }
    }
}

/// Bluetooth popup and tray indicator behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BluetoothConfig {
    pub indicator_interval_ms: u64,
    pub settings_command: String,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            indicator_interval_ms: 2000,
            settings_command: "plasma-open-settings kcm_bluetooth".to_string(),
        }
    }
}

/// Night-light location and persistence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NightLightConfig {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east (west is negative).
    pub longitude: f64,
    /// Whether the schedule drives the night light at startup.
    pub auto: bool,
    pub check_interval_secs: u64,
    /// Existence of this file means "night light on". The brightness script
    /// tests the same path, so a custom location needs a matching script.
    pub marker_file: PathBuf,
}

impl Default for NightLightConfig {
    fn default() -> Self {
        Self {
            latitude: 30.27,
            longitude: -97.74,
            auto: true,
            check_interval_secs: 60,
            marker_file: PathBuf::from("/tmp/duskbar-nightlight-active"),
        }
    }
}

/// Software brightness (shader based, 100 = no dimming).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrightnessConfig {
    /// Script invoked with a single integer percentage argument. It reads
    /// [`NightLightConfig::marker_file`] to combine dimming with the warm
    /// shader.
    pub script: String,
    pub initial: u32,
    pub min: u32,
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            script: "~/.config/hypr/scripts/set-brightness.sh".to_string(),
            initial: 100,
            min: 5,
        }
    }
}

impl BrightnessConfig {
    /// Script path with a leading `~` expanded.
    pub fn script_path(&self) -> PathBuf {
        expand_home(&self.script)
    }
}

/// Idle inhibit ("caffeine") persistence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaffeineConfig {
    pub marker_file: PathBuf,
}

impl Default for CaffeineConfig {
    fn default() -> Self {
        Self {
            marker_file: PathBuf::from("/tmp/duskbar-caffeine-active"),
        }
    }
}

/// Which workspaces each monitor shows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspacesConfig {
    /// Connector name → workspace ids.
    pub monitors: BTreeMap<String, Vec<u32>>,
    /// Workspaces for monitors missing from `monitors`.
    pub fallback: Vec<u32>,
}

impl Default for WorkspacesConfig {
    fn default() -> Self {
        let monitors = [
            ("DP-3", vec![1, 2, 3, 10]),
            ("DP-1", vec![4, 5, 6]),
            ("HDMI-A-1", vec![7, 8, 9]),
        ]
        .into_iter()
        .map(|(name, ids)| (name.to_string(), ids))
        .collect();

        Self {
            monitors,
            fallback: (1..=10).collect(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            popups: PopupsConfig::default(),
            wifi: WifiConfig::default(),
            bluetooth: BluetoothConfig::default(),
            night_light: NightLightConfig::default(),
            brightness: BrightnessConfig::default(),
            caffeine: CaffeineConfig::default(),
            workspaces: WorkspacesConfig::default(),
        }
    }
}

/// A loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: Config,
    /// `None` when built-in defaults were used.
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load the configuration following the lookup order in the module docs.
    pub fn load(explicit: Option<&Path>) -> Result<ConfigLoadResult> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::ConfigNotFound(path.to_path_buf()));
            }
            return Self::load_file(path);
        }

        for candidate in default_search_paths() {
            if candidate.exists() {
                return Self::load_file(&candidate);
            }
            debug!("Config: no file at {:?}", candidate);
        }

        info!("Config: no config file found, using built-in defaults");
        Ok(ConfigLoadResult {
            config: Config::default(),
            source: None,
        })
    }

    fn load_file(path: &Path) -> Result<ConfigLoadResult> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!("Config: loaded {:?}", path);
        Ok(ConfigLoadResult {
            config,
            source: Some(path.to_path_buf()),
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints, collecting every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.popups.names.is_empty() {
            problems.push("popups.names must list at least one popup".to_string());
        }
        let mut seen = HashSet::new();
        for name in &self.popups.names {
            if !seen.insert(name.as_str()) {
                problems.push(format!("popups.names contains '{}' twice", name));
            }
        }
        if self.popups.names.contains(&self.popups.backdrop) {
            problems.push(format!(
                "popups.backdrop '{}' cannot also be a popup",
                self.popups.backdrop
            ));
        }

        if self.wifi.max_networks == 0 {
            problems.push("wifi.max_networks must be greater than 0".to_string());
        }
        if self.wifi.min_password_len == 0 {
            problems.push("wifi.min_password_len must be greater than 0".to_string());
        }
        if self.wifi.connect_max_attempts == 0 {
            problems.push("wifi.connect_max_attempts must be greater than 0".to_string());
        }
        for (key, value) in [
            ("wifi.poll_interval_ms", self.wifi.poll_interval_ms),
            (
                "wifi.connect_check_interval_ms",
                self.wifi.connect_check_interval_ms,
            ),
            ("wifi.indicator_interval_ms", self.wifi.indicator_interval_ms),
            (
                "bluetooth.indicator_interval_ms",
                self.bluetooth.indicator_interval_ms,
            ),
            (
                "night_light.check_interval_secs",
                self.night_light.check_interval_secs,
            ),
        ] {
            if value == 0 {
                problems.push(format!("{} must be greater than 0", key));
            }
        }

        if !(-90.0..=90.0).contains(&self.night_light.latitude) {
            problems.push(format!(
                "night_light.latitude {} is outside [-90, 90]",
                self.night_light.latitude
            ));
        }
        if !(-180.0..=180.0).contains(&self.night_light.longitude) {
            problems.push(format!(
                "night_light.longitude {} is outside [-180, 180]",
                self.night_light.longitude
            ));
        }

        let b = &self.brightness;
        if b.min == 0 || b.min > 100 {
            problems.push(format!("brightness.min {} is outside [1, 100]", b.min));
        }
        if b.initial < b.min || b.initial > 100 {
            problems.push(format!(
                "brightness.initial {} is outside [{}, 100]",
                b.initial, b.min
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigValidation(problems))
        }
    }
}

/// Candidate config locations derived from the environment.
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        paths.push(PathBuf::from(xdg).join("duskbar").join("config.toml"));
    }
    if let Ok(home) = std::env::var("HOME") {
        let path = PathBuf::from(home)
            .join(".config")
            .join("duskbar")
            .join("config.toml");
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    if path == "~"
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home);
    }
    PathBuf::from(path)
}
