//! Composition root: builds every manager from the config and wires them
//! together.
//!
//! Managers never reference each other directly. The shell subscribes to
//! popup events and forwards visibility to the WiFi and Bluetooth managers,
//! and routes IPC messages to whichever manager owns the action.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use duskbar_core::Config;
use tracing::{debug, info, warn};

use crate::services::bluetooth::{BluetoothIndicator, BluetoothManager};
use crate::services::brightness::BrightnessController;
use crate::services::caffeine::Caffeine;
use crate::services::clock::Clock;
use crate::services::command::CommandRunner;
use crate::services::ipc::IpcMessage;
use crate::services::network::{WifiIndicator, WifiManager};
use crate::services::night_light::NightLight;
use crate::services::popup::PopupController;
use crate::services::scheduler::Scheduler;
use crate::services::state::ShellState;
use crate::services::workspace::{HyprEventWatcher, WorkspaceService, event_socket_path};

pub const WIFI_POPUP: &str = "wifi-popup";
pub const BLUETOOTH_POPUP: &str = "bluetooth-popup";

pub struct Shell {
    pub state: Rc<ShellState>,
    pub popups: Rc<PopupController>,
    pub wifi: Rc<WifiManager>,
    pub wifi_indicator: Rc<WifiIndicator>,
    pub bluetooth: Rc<BluetoothManager>,
    pub bluetooth_indicator: Rc<BluetoothIndicator>,
    pub night_light: Rc<NightLight>,
    pub brightness: Rc<BrightnessController>,
    pub caffeine: Rc<Caffeine>,
    pub workspaces: Rc<WorkspaceService>,
    events: RefCell<Option<HyprEventWatcher>>,
}

impl Shell {
    pub fn new(
        config: &Config,
        runner: Rc<dyn CommandRunner>,
        scheduler: Rc<dyn Scheduler>,
        clock: Rc<dyn Clock>,
    ) -> Rc<Self> {
        let state = ShellState::from_config(config);
        let popups = PopupController::new(&config.popups);

        let wifi = WifiManager::new(
            runner.clone(),
            scheduler.clone(),
            popups.clone(),
            config.wifi.clone(),
        );
        let wifi_indicator = WifiIndicator::new(
            runner.clone(),
            scheduler.clone(),
            Duration::from_millis(config.wifi.indicator_interval_ms),
        );
        let bluetooth = BluetoothManager::new(
            runner.clone(),
            scheduler.clone(),
            popups.clone(),
            config.bluetooth.clone(),
        );
        let bluetooth_indicator = BluetoothIndicator::new(
            runner.clone(),
            scheduler.clone(),
            Duration::from_millis(config.bluetooth.indicator_interval_ms),
        );
        let brightness = BrightnessController::new(runner.clone(), state.clone(), &config.brightness);
        let night_light = NightLight::new(
            runner.clone(),
            scheduler,
            clock,
            state.clone(),
            &config.night_light,
            brightness.script().to_path_buf(),
        );
        let caffeine = Caffeine::new(
            runner.clone(),
            state.clone(),
            config.caffeine.marker_file.clone(),
        );
        let workspaces = WorkspaceService::new(runner, config.workspaces.clone());

        for name in [WIFI_POPUP, BLUETOOTH_POPUP] {
            if !popups.is_registered(name) {
                debug!("Shell: '{}' is not a configured popup", name);
            }
        }

        let shell = Rc::new(Self {
            state,
            popups,
            wifi,
            wifi_indicator,
            bluetooth,
            bluetooth_indicator,
            night_light,
            brightness,
            caffeine,
            workspaces,
            events: RefCell::new(None),
        });
        shell.wire();
        shell
    }

    fn wire(&self) {
        let wifi = Rc::downgrade(&self.wifi);
        let bluetooth = Rc::downgrade(&self.bluetooth);
        self.popups.connect(move |event| match event.name.as_str() {
            WIFI_POPUP => {
                if let Some(wifi) = wifi.upgrade() {
                    wifi.on_visibility_change(event.visible);
                }
            }
            BLUETOOTH_POPUP => {
                if let Some(bluetooth) = bluetooth.upgrade() {
                    bluetooth.on_visibility_change(event.visible);
                }
            }
            _ => {}
        });

        self.wifi.connect(|snapshot| {
            debug!(
                "Shell: wifi {} ({} networks)",
                snapshot.status_label(),
                snapshot.networks.len()
            );
        });
        self.wifi_indicator
            .connect(|status| debug!("Shell: wifi tray {}", status.tooltip()));
        self.bluetooth_indicator
            .connect(|status| debug!("Shell: bluetooth tray {}", status.tooltip()));
        self.night_light
            .connect(|snapshot| debug!("Shell: night light {:?}", snapshot));
        self.caffeine
            .connect(|active| debug!("Shell: caffeine {}", active));

        let workspaces = Rc::downgrade(&self.workspaces);
        self.workspaces.connect(move |_| {
            let Some(workspaces) = workspaces.upgrade() else {
                return;
            };
            for monitor in workspaces.monitors() {
                let view = workspaces.view_for(&monitor);
                debug!(
                    "Shell: {} shows {} workspaces, {} windows",
                    monitor,
                    view.workspaces.len(),
                    view.clients.len()
                );
            }
        });
    }

    /// Start the periodic services.
    pub fn start(&self) {
        self.wifi_indicator.start();
        self.bluetooth_indicator.start();
        self.night_light.start();
        self.workspaces.refresh();
        self.follow_compositor();
        info!(
            "Shell: started (brightness {}, caffeine {}, night light {})",
            self.state.brightness(),
            self.state.caffeine(),
            self.night_light.description()
        );
    }

    fn follow_compositor(&self) {
        let Some(path) = event_socket_path() else {
            info!("Shell: no compositor event socket, workspaces refresh on dispatch only");
            return;
        };
        match self.workspaces.watch(&path) {
            Ok(watcher) => {
                self.events.replace(Some(watcher));
            }
            Err(e) => warn!("Shell: cannot follow compositor events at {:?}: {}", path, e),
        }
    }

    pub fn stop(&self) {
        self.wifi_indicator.stop();
        self.bluetooth_indicator.stop();
        self.night_light.stop();
        self.wifi.shutdown();
        self.events.replace(None);
        self.popups.close_all();
    }

    pub fn dispatch(&self, message: IpcMessage) {
        debug!("Shell: dispatch {:?}", message);
        match message {
            IpcMessage::TogglePopup { name } => self.popups.toggle(&name),
            IpcMessage::ClosePopups => self.popups.close_all(),
            IpcMessage::ToggleCaffeine => self.caffeine.toggle(),
            IpcMessage::ToggleNightLight => self.night_light.toggle_manual(),
            IpcMessage::NightLightAuto { enabled } => self.night_light.set_auto(enabled),
            IpcMessage::Brightness { percent } => {
                self.brightness.set_level(percent);
            }
            IpcMessage::SwitchWorkspace { id } => self.workspaces.switch_to(id),
            IpcMessage::FocusWindow { address } => self.workspaces.focus_window(&address),
        }
    }
}
