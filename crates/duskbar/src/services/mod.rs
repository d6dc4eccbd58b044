//! Long-lived services for the duskbar shell.
//!
//! Each manager owns a snapshot, talks to the system only through
//! [`command::CommandRunner`] and [`scheduler::Scheduler`], and publishes
//! changes through [`callbacks::Callbacks`].
//!
//! ## Services
//!
//! - **popup**: named popup visibility with a shared backdrop
//! - **network**: WiFi popup state machine and tray indicator (nmcli)
//! - **bluetooth**: Bluetooth popup and tray indicator (bluetoothctl)
//! - **night_light**: sun-scheduled night light
//! - **brightness**: software brightness script
//! - **caffeine**: idle inhibitor
//! - **workspace**: Hyprland workspaces per monitor, following the event socket
//! - **ipc**: CLI → bar datagram socket
//! - **state**: process-wide flags and their marker files

pub mod bluetooth;
pub mod brightness;
pub mod caffeine;
pub mod callbacks;
pub mod clock;
pub mod command;
#[cfg(test)]
pub mod command_mock;
pub mod ipc;
pub mod network;
pub mod night_light;
pub mod popup;
pub mod scheduler;
#[cfg(test)]
pub mod scheduler_mock;
pub mod state;
pub mod workspace;
