//! duskbar: the connectivity and popup orchestration core of a Hyprland
//! status bar.
//!
//! - [`services`]: state managers (popups, WiFi, Bluetooth, night light,
//!   brightness, caffeine, workspaces) plus the command, timer and IPC plumbing
//! - [`shell`]: builds and wires the managers
//! - [`cli`]: command-line arguments

pub mod cli;
pub mod services;
pub mod shell;
