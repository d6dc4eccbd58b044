//! WiFi through NetworkManager's `nmcli`.
//!
//! - [`nmcli`]: command strings and parsers for nmcli's terse output.
//! - [`WifiManager`]: the popup state machine (scan, connect, password prompt).
//! - [`WifiIndicator`]: the tray summary, polled independently of the popup.

pub mod indicator;
pub mod nmcli;
pub mod wifi;

pub use indicator::{WifiIndicator, WifiStatus};
pub use wifi::WifiManager;

/// A network from the most recent scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiNetwork {
    pub ssid: String,
    /// Signal strength percentage (0-100).
    pub signal: u8,
    /// nmcli security string (`WPA2`, `WPA1 WPA2`, ...). Empty for open networks.
    pub security: String,
    /// Whether this is the currently connected network.
    pub active: bool,
    /// Whether a connection profile exists for this SSID.
    pub saved: bool,
}

impl WifiNetwork {
    pub fn is_secured(&self) -> bool {
        !self.security.is_empty()
    }
}

/// Why a password connection attempt did not go through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("Connection failed. Check password.")]
    AttemptsExhausted { attempts: u32 },
}

/// Shown while a password connection is being confirmed.
pub const AUTH_HINT: &str = "System auth may be required...";

/// Line under the password entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptMessage {
    Info(String),
    Error(String),
}

/// Password dialog for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPrompt {
    pub ssid: String,
    pub message: Option<PromptMessage>,
    /// False while a submitted password is being confirmed.
    pub submit_enabled: bool,
}

impl PasswordPrompt {
    fn new(ssid: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            message: None,
            submit_enabled: true,
        }
    }

    pub fn title(&self) -> String {
        format!("Connect to \"{}\"", self.ssid)
    }
}

/// What the popup body should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiView {
    Disabled,
    Scanning,
    Empty,
    Networks,
    Password,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiSnapshot {
    pub enabled: bool,
    /// Name of the active wireless connection, if any.
    pub active_connection: Option<String>,
    /// Ranked scan results. Empty while the radio is off.
    pub networks: Vec<WifiNetwork>,
    pub scanning: bool,
    pub polling: bool,
    pub prompt: Option<PasswordPrompt>,
}

impl WifiSnapshot {
    pub(crate) fn unknown() -> Self {
        Self {
            enabled: false,
            active_connection: None,
            networks: Vec::new(),
            scanning: false,
            polling: false,
            prompt: None,
        }
    }

    pub fn view(&self) -> WifiView {
        if self.prompt.is_some() {
            WifiView::Password
        } else if !self.enabled {
            WifiView::Disabled
        } else if !self.networks.is_empty() {
            WifiView::Networks
        } else if self.scanning {
            WifiView::Scanning
        } else {
            WifiView::Empty
        }
    }

    pub fn status_label(&self) -> String {
        match &self.active_connection {
            Some(name) => format!("Connected: {}", name),
            None => "Not connected".to_string(),
        }
    }

    pub fn network(&self, ssid: &str) -> Option<&WifiNetwork> {
        self.networks.iter().find(|n| n.ssid == ssid)
    }
}
