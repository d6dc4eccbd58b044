//! Bluetooth through `bluetoothctl`.
//!
//! [`BluetoothManager`] backs the popup (power toggle, paired devices,
//! per-device connect). [`BluetoothIndicator`] is the tray summary and polls
//! on its own whether or not the popup is open.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use duskbar_core::config::BluetoothConfig;
use tracing::{debug, info, warn};

use super::callbacks::{CallbackId, Callbacks};
use super::command::{CommandRunner, shell_quote};
use super::popup::PopupController;
use super::scheduler::{ControlFlow, PollHandle, Scheduler};

pub const SHOW: &str = "bluetoothctl show";
pub const PAIRED_DEVICES: &str = "bluetoothctl devices Paired";
pub const CONNECTED_DEVICES: &str = "bluetoothctl devices Connected";
pub const POWER_ON: &str = "bluetoothctl power on";
pub const POWER_OFF: &str = "bluetoothctl power off";

const DEVICE_REFRESH_MS: u64 = 1000;
const POWER_REFRESH_MS: u64 = 500;

pub fn info_command(mac: &str) -> String {
    format!("bluetoothctl info {}", shell_quote(mac))
}

fn connect_command(mac: &str) -> String {
    format!("bluetoothctl connect {}", shell_quote(mac))
}

fn disconnect_command(mac: &str) -> String {
    format!("bluetoothctl disconnect {}", shell_quote(mac))
}

/// `bluetoothctl show` reports `Powered: yes` for an active controller.
pub fn parse_powered(text: &str) -> bool {
    text.contains("Powered: yes")
}

/// `bluetoothctl info <mac>` reports `Connected: yes` for a live link.
pub fn parse_connected(text: &str) -> bool {
    text.contains("Connected: yes")
}

/// Parse `Device <MAC> <Name>` lines into (mac, name) pairs.
///
/// Lines without a name are skipped; anything not starting with `Device `
/// (controller chatter, prompts) is ignored.
pub fn parse_devices(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| line.trim_end().strip_prefix("Device "))
        .filter_map(|rest| {
            let (mac, name) = rest.split_once(' ')?;
            Some((mac.to_string(), name.to_string()))
        })
        .collect()
}

/// Nerd-font glyph guessed from the device name.
pub fn device_icon(name: &str) -> &'static str {
    let name = name.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| name.contains(w));

    if has(&["headphone", "earbuds", "buds", "airpod"]) {
        "󰋋"
    } else if has(&["keyboard"]) {
        "󰍽"
    } else if has(&["mouse"]) {
        "󰦏"
    } else if has(&["controller", "gamepad"]) {
        "󰊴"
    } else if has(&["speaker"]) {
        "󰓃"
    } else {
        "󰂱"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluetoothDevice {
    pub mac: String,
    pub name: String,
    pub connected: bool,
}

impl BluetoothDevice {
    pub fn icon(&self) -> &'static str {
        device_icon(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BluetoothView {
    Off,
    Empty,
    Devices,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BluetoothSnapshot {
    pub powered: bool,
    /// Paired devices, replaced wholesale on every refresh.
    pub devices: Vec<BluetoothDevice>,
}

impl BluetoothSnapshot {
    pub fn view(&self) -> BluetoothView {
        if !self.powered {
            BluetoothView::Off
        } else if self.devices.is_empty() {
            BluetoothView::Empty
        } else {
            BluetoothView::Devices
        }
    }
}

fn query_powered(runner: &dyn CommandRunner) -> bool {
    runner
        .run_sync(SHOW)
        .text_if_success()
        .is_some_and(|text| parse_powered(&text))
}

pub struct BluetoothManager {
    runner: Rc<dyn CommandRunner>,
    scheduler: Rc<dyn Scheduler>,
    popups: Rc<PopupController>,
    config: BluetoothConfig,
    snapshot: RefCell<BluetoothSnapshot>,
    callbacks: Callbacks<BluetoothSnapshot>,
}

impl BluetoothManager {
    pub fn new(
        runner: Rc<dyn CommandRunner>,
        scheduler: Rc<dyn Scheduler>,
        popups: Rc<PopupController>,
        config: BluetoothConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            runner,
            scheduler,
            popups,
            config,
            snapshot: RefCell::new(BluetoothSnapshot::default()),
            callbacks: Callbacks::new(),
        })
    }

    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&BluetoothSnapshot) + 'static,
    {
        let id = self.callbacks.register(callback);
        let snapshot = self.snapshot.borrow().clone();
        self.callbacks.notify_single(id, &snapshot);
        id
    }

    pub fn disconnect(&self, id: CallbackId) {
        self.callbacks.unregister(id);
    }

    pub fn snapshot(&self) -> BluetoothSnapshot {
        self.snapshot.borrow().clone()
    }

    fn query_devices(&self) -> Vec<BluetoothDevice> {
        let Some(text) = self.runner.run_sync(PAIRED_DEVICES).text_if_success() else {
            return Vec::new();
        };
        parse_devices(&text)
            .into_iter()
            .map(|(mac, name)| {
                let connected = self
                    .runner
                    .run_sync(&info_command(&mac))
                    .text_if_success()
                    .is_some_and(|info| parse_connected(&info));
                BluetoothDevice {
                    mac,
                    name,
                    connected,
                }
            })
            .collect()
    }

    pub fn refresh(&self) {
        let powered = query_powered(self.runner.as_ref());
        let devices = self.query_devices();
        debug!(
            "BluetoothManager: refresh powered={} devices={}",
            powered,
            devices.len()
        );

        let snapshot = BluetoothSnapshot { powered, devices };
        self.snapshot.replace(snapshot.clone());
        self.callbacks.notify(&snapshot);
    }

    fn refresh_after(self: &Rc<Self>, delay_ms: u64) {
        let weak = Rc::downgrade(self);
        self.scheduler.after(
            Duration::from_millis(delay_ms),
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.refresh();
                }
            }),
        );
    }

    /// Connect a disconnected device or disconnect a connected one.
    pub fn toggle_device(self: &Rc<Self>, mac: &str) {
        let Some(device) = self
            .snapshot
            .borrow()
            .devices
            .iter()
            .find(|d| d.mac == mac)
            .cloned()
        else {
            warn!("BluetoothManager: unknown device {}", mac);
            return;
        };

        if device.connected {
            info!("BluetoothManager: disconnecting {} ({})", device.name, mac);
            self.runner.run_async(&disconnect_command(mac));
        } else {
            info!("BluetoothManager: connecting {} ({})", device.name, mac);
            self.runner.run_async(&connect_command(mac));
        }
        self.refresh_after(DEVICE_REFRESH_MS);
    }

    pub fn toggle_power(self: &Rc<Self>) {
        let powered = self.snapshot.borrow().powered;
        info!("BluetoothManager: power {}", if powered { "off" } else { "on" });
        self.runner
            .run_async(if powered { POWER_OFF } else { POWER_ON });
        self.refresh_after(POWER_REFRESH_MS);
    }

    pub fn on_visibility_change(&self, visible: bool) {
        if visible {
            self.refresh();
        }
    }

    pub fn open_settings(&self) {
        self.runner.run_async(&self.config.settings_command);
        self.popups.close_all();
    }
}

// Tray indicator

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BluetoothStatus {
    pub powered: bool,
    pub connected: bool,
}

impl BluetoothStatus {
    pub fn icon(&self) -> &'static str {
        if !self.powered {
            "󰂲"
        } else if self.connected {
            "󰂱"
        } else {
            "󰂯"
        }
    }

    pub fn tooltip(&self) -> &'static str {
        if !self.powered {
            "Bluetooth Off"
        } else if self.connected {
            "Bluetooth Connected"
        } else {
            "Bluetooth On"
        }
    }
}

pub struct BluetoothIndicator {
    runner: Rc<dyn CommandRunner>,
    scheduler: Rc<dyn Scheduler>,
    interval: Duration,
    status: Cell<BluetoothStatus>,
    callbacks: Callbacks<BluetoothStatus>,
    poll: Cell<Option<PollHandle>>,
}

impl BluetoothIndicator {
    pub fn new(
        runner: Rc<dyn CommandRunner>,
        scheduler: Rc<dyn Scheduler>,
        interval: Duration,
    ) -> Rc<Self> {
        Rc::new(Self {
            runner,
            scheduler,
            interval,
            status: Cell::new(BluetoothStatus::default()),
            callbacks: Callbacks::new(),
            poll: Cell::new(None),
        })
    }

    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&BluetoothStatus) + 'static,
    {
        let id = self.callbacks.register(callback);
        self.callbacks.notify_single(id, &self.status.get());
        id
    }

    pub fn status(&self) -> BluetoothStatus {
        self.status.get()
    }

    pub fn poll_now(&self) {
        let powered = query_powered(self.runner.as_ref());
        let connected = powered
            && self
                .runner
                .run_sync(CONNECTED_DEVICES)
                .text_if_success()
                .is_some_and(|text| text.contains("Device"));

        let status = BluetoothStatus { powered, connected };
        if self.status.replace(status) != status {
            debug!("BluetoothIndicator: {:?}", status);
            self.callbacks.notify(&status);
        }
    }

    pub fn start(self: &Rc<Self>) {
        if self
            .poll
            .get()
            .is_some_and(|handle| self.scheduler.is_active(handle))
        {
            return;
        }
        self.poll_now();

        let weak = Rc::downgrade(self);
        let handle = self.scheduler.every(
            self.interval,
            Box::new(move || match weak.upgrade() {
                Some(this) => {
                    this.poll_now();
                    ControlFlow::Continue
                }
                None => ControlFlow::Break,
            }),
        );
        self.poll.set(Some(handle));
    }

    pub fn stop(&self) {
        if let Some(handle) = self.poll.take() {
            self.scheduler.cancel(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::command_mock::RecordingRunner;
    use crate::services::scheduler_mock::VirtualScheduler;
    use duskbar_core::config::PopupsConfig;

    const HEADPHONES: &str = "AA:BB:CC:DD:EE:01";
    const KEYBOARD: &str = "AA:BB:CC:DD:EE:02";

    fn manager() -> (Rc<RecordingRunner>, Rc<VirtualScheduler>, Rc<BluetoothManager>) {
        let runner = Rc::new(RecordingRunner::new());
        runner.respond(SHOW, "Controller 00:11:22:33:44:55\n\tPowered: yes\n");
        runner.respond(
            PAIRED_DEVICES,
            &format!(
                "Device {} Sony WH-1000XM4 Headphones\nDevice {} MX Keys Keyboard\n",
                HEADPHONES, KEYBOARD
            ),
        );
        runner.respond(&info_command(HEADPHONES), "\tPaired: yes\n\tConnected: yes\n");
        runner.respond(&info_command(KEYBOARD), "\tPaired: yes\n\tConnected: no\n");

        let sched = Rc::new(VirtualScheduler::new());
        let popups = PopupController::new(&PopupsConfig::default());
        let manager = BluetoothManager::new(
            runner.clone(),
            sched.clone(),
            popups,
            BluetoothConfig::default(),
        );
        manager.refresh();
        runner.clear_log();
        (runner, sched, manager)
    }

    #[test]
    fn test_parse_devices() {
        let text = "Device 11:22:33:44:55:66 My Mouse\n\
                    [bluetooth]# \n\
                    Device 11:22:33:44:55:77\n\
                    Device 11:22:33:44:55:88 Speaker Two\n";
        assert_eq!(
            parse_devices(text),
            vec![
                ("11:22:33:44:55:66".to_string(), "My Mouse".to_string()),
                ("11:22:33:44:55:88".to_string(), "Speaker Two".to_string()),
            ]
        );
    }

    #[test]
    fn test_device_icon() {
        assert_eq!(device_icon("Galaxy Buds2"), "󰋋");
        assert_eq!(device_icon("MX Keys Keyboard"), "󰍽");
        assert_eq!(device_icon("Xbox Wireless Controller"), "󰊴");
        assert_eq!(device_icon("JBL Speaker"), "󰓃");
        assert_eq!(device_icon("Pixel 8"), "󰂱");
    }

    #[test]
    fn test_refresh_reads_connection_state_per_device() {
        let (_runner, _sched, manager) = manager();
        let snap = manager.snapshot();
        assert!(snap.powered);
        assert_eq!(snap.view(), BluetoothView::Devices);
        assert_eq!(snap.devices.len(), 2);
        assert!(snap.devices[0].connected);
        assert!(!snap.devices[1].connected);
        assert_eq!(snap.devices[1].name, "MX Keys Keyboard");
    }

    #[test]
    fn test_views() {
        let (runner, _sched, manager) = manager();
        runner.respond(PAIRED_DEVICES, "");
        manager.refresh();
        assert_eq!(manager.snapshot().view(), BluetoothView::Empty);

        runner.respond(SHOW, "\tPowered: no\n");
        manager.refresh();
        assert_eq!(manager.snapshot().view(), BluetoothView::Off);

        runner.fail(SHOW);
        manager.refresh();
        assert!(!manager.snapshot().powered);
    }

    #[test]
    fn test_toggle_device_and_delayed_refresh() {
        let (runner, sched, manager) = manager();
        manager.toggle_device(HEADPHONES);
        manager.toggle_device(KEYBOARD);
        assert_eq!(
            runner.async_commands(),
            vec![
                format!("bluetoothctl disconnect '{}'", HEADPHONES),
                format!("bluetoothctl connect '{}'", KEYBOARD),
            ]
        );

        runner.respond(&info_command(KEYBOARD), "\tConnected: yes\n");
        sched.advance_ms(999);
        assert_eq!(runner.count(PAIRED_DEVICES), 0);
        sched.advance_ms(1);
        assert_eq!(runner.count(PAIRED_DEVICES), 2);
        assert!(manager.snapshot().devices[1].connected);
    }

    #[test]
    fn test_unknown_device_is_ignored() {
        let (runner, sched, manager) = manager();
        manager.toggle_device("00:00:00:00:00:00");
        assert!(runner.invocations().is_empty());
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_toggle_power() {
        let (runner, sched, manager) = manager();
        manager.toggle_power();
        assert_eq!(runner.async_commands(), vec![POWER_OFF]);

        runner.respond(SHOW, "\tPowered: no\n");
        sched.advance_ms(500);
        assert!(!manager.snapshot().powered);

        runner.clear_log();
        manager.toggle_power();
        assert_eq!(runner.async_commands(), vec![POWER_ON]);
    }

    #[test]
    fn test_visibility_refreshes_only_when_shown() {
        let (runner, _sched, manager) = manager();
        manager.on_visibility_change(false);
        assert!(runner.invocations().is_empty());
        manager.on_visibility_change(true);
        assert_eq!(runner.count(SHOW), 1);
    }

    #[test]
    fn test_indicator_polls_independently() {
        let runner = Rc::new(RecordingRunner::new());
        let sched = Rc::new(VirtualScheduler::new());
        runner.respond(SHOW, "\tPowered: yes\n");
        runner.respond(CONNECTED_DEVICES, "");

        let indicator = BluetoothIndicator::new(runner.clone(), sched.clone(), Duration::from_secs(2));
        indicator.start();
        assert_eq!(indicator.status().tooltip(), "Bluetooth On");

        runner.respond(CONNECTED_DEVICES, &format!("Device {} Headphones\n", HEADPHONES));
        sched.advance(Duration::from_secs(2));
        assert_eq!(indicator.status().icon(), "󰂱");
        assert_eq!(indicator.status().tooltip(), "Bluetooth Connected");

        runner.respond(SHOW, "\tPowered: no\n");
        sched.advance(Duration::from_secs(2));
        assert_eq!(indicator.status(), BluetoothStatus::default());
        assert_eq!(indicator.status().tooltip(), "Bluetooth Off");

        indicator.stop();
        let before = runner.count(SHOW);
        sched.advance(Duration::from_secs(10));
        assert_eq!(runner.count(SHOW), before);
    }
}
