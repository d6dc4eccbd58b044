//! WiFi popup state machine.
//!
//! Queries run synchronously (`nmcli -t ...`), mutations run asynchronously and
//! are confirmed by a delayed query. While the popup is open the manager
//! rescans every few seconds; a password connection is confirmed with a
//! bounded [`PollUntil`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use duskbar_core::config::WifiConfig;
use tracing::{debug, info, warn};

use super::nmcli;
use super::{
    AUTH_HINT, ConnectError, PasswordPrompt, PromptMessage, WifiNetwork, WifiSnapshot,
};
use crate::services::callbacks::{CallbackId, Callbacks};
use crate::services::command::CommandRunner;
use crate::services::popup::PopupController;
use crate::services::scheduler::{ControlFlow, PollHandle, PollOutcome, PollUntil, Scheduler};

const OPEN_CONNECT_REFRESH_MS: u64 = 2000;
const SAVED_CONNECT_CHECK_MS: u64 = 2000;
const DISCONNECT_REFRESH_MS: u64 = 1000;
const FORGET_REFRESH_MS: u64 = 500;
const POWER_REFRESH_MS: u64 = 500;
const POWER_ON_POLL_DELAY_MS: u64 = 1000;
const INITIAL_SCAN_REFRESH_MS: u64 = 1500;
const RESCAN_REFRESH_MS: u64 = 1000;

/// An in-flight password connection.
struct ConnectSession {
    target_ssid: String,
    attempt: u32,
    max_attempts: u32,
    handle: Option<PollHandle>,
}

pub struct WifiManager {
    runner: Rc<dyn CommandRunner>,
    scheduler: Rc<dyn Scheduler>,
    popups: Rc<PopupController>,
    config: WifiConfig,
    snapshot: RefCell<WifiSnapshot>,
    callbacks: Callbacks<WifiSnapshot>,
    poll: Cell<Option<PollHandle>>,
    /// Delayed `start_polling` after the radio is switched on.
    pending_start: Cell<Option<PollHandle>>,
    /// Delayed refreshes and saved-profile checks.
    one_shots: RefCell<Vec<PollHandle>>,
    session: RefCell<Option<ConnectSession>>,
}

impl WifiManager {
    pub fn new(
        runner: Rc<dyn CommandRunner>,
        scheduler: Rc<dyn Scheduler>,
        popups: Rc<PopupController>,
        config: WifiConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            runner,
            scheduler,
            popups,
            config,
            snapshot: RefCell::new(WifiSnapshot::unknown()),
            callbacks: Callbacks::new(),
            poll: Cell::new(None),
            pending_start: Cell::new(None),
            one_shots: RefCell::new(Vec::new()),
            session: RefCell::new(None),
        })
    }

    /// Register a listener; it immediately receives the current snapshot.
    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&WifiSnapshot) + 'static,
    {
        let id = self.callbacks.register(callback);
        let snapshot = self.snapshot.borrow().clone();
        self.callbacks.notify_single(id, &snapshot);
        id
    }

    pub fn disconnect(&self, id: CallbackId) {
        self.callbacks.unregister(id);
    }

    pub fn snapshot(&self) -> WifiSnapshot {
        self.snapshot.borrow().clone()
    }

    fn notify_snapshot(&self, f: impl FnOnce(&mut WifiSnapshot)) {
        let mut snapshot = self.snapshot.borrow_mut();
        f(&mut snapshot);
        let clone = snapshot.clone();
        drop(snapshot);
        self.callbacks.notify(&clone);
    }

    fn notify_snapshot_if(&self, f: impl FnOnce(&mut WifiSnapshot) -> bool) {
        let mut snapshot = self.snapshot.borrow_mut();
        if f(&mut snapshot) {
            let clone = snapshot.clone();
            drop(snapshot);
            self.callbacks.notify(&clone);
        }
    }

    // Queries

    fn query_enabled(&self) -> bool {
        self.runner
            .run_sync(nmcli::RADIO_STATUS)
            .text_if_success()
            .is_some_and(|text| nmcli::parse_radio(&text))
    }

    fn query_active_connection(&self) -> Option<String> {
        self.runner
            .run_sync(nmcli::ACTIVE_CONNECTIONS)
            .text_if_success()
            .and_then(|text| nmcli::parse_active_connection(&text))
    }

    fn query_networks(&self) -> Vec<WifiNetwork> {
        let Some(scan) = self.runner.run_sync(nmcli::SCAN_LIST).text_if_success() else {
            return Vec::new();
        };
        let saved = self
            .runner
            .run_sync(nmcli::SAVED_CONNECTIONS)
            .text_if_success()
            .map(|text| nmcli::parse_saved(&text))
            .unwrap_or_default();
        nmcli::parse_scan(&scan, &saved, self.config.max_networks)
    }

    fn wifi_device(&self) -> String {
        match self
            .runner
            .run_sync(nmcli::DEVICE_STATUS)
            .text_if_success()
            .and_then(|text| nmcli::parse_wifi_device(&text))
        {
            Some(device) => device,
            None => {
                warn!(
                    "WifiManager: no wifi device in `{}`, falling back to {}",
                    nmcli::DEVICE_STATUS,
                    self.config.fallback_interface
                );
                self.config.fallback_interface.clone()
            }
        }
    }

    /// Re-read radio state, the active connection and the scan list.
    ///
    /// The scanning flag is cleared once results arrive or the radio is off.
    /// An empty list while scanning keeps the flag so the popup shows the
    /// spinner rather than "No networks found".
    pub fn refresh(&self) {
        let enabled = self.query_enabled();
        let active_connection = self.query_active_connection();
        let networks = if enabled {
            self.query_networks()
        } else {
            Vec::new()
        };
        debug!(
            "WifiManager: refresh enabled={} active={:?} networks={}",
            enabled,
            active_connection,
            networks.len()
        );

        self.notify_snapshot(|s| {
            s.enabled = enabled;
            s.active_connection = active_connection;
            s.networks = networks;
            if !enabled || !s.networks.is_empty() {
                s.scanning = false;
            }
        });
    }

    fn refresh_after(self: &Rc<Self>, delay_ms: u64) {
        let weak = Rc::downgrade(self);
        let handle = self.scheduler.after(
            Duration::from_millis(delay_ms),
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.refresh();
                }
            }),
        );
        self.track_one_shot(handle);
    }

    fn track_one_shot(&self, handle: PollHandle) {
        let mut one_shots = self.one_shots.borrow_mut();
        one_shots.retain(|h| self.scheduler.is_active(*h));
        one_shots.push(handle);
    }

    // Actions

    /// Click on a network row.
    ///
    /// - active: disconnect the WiFi device
    /// - saved: bring the profile up, fall back to the password prompt
    /// - secured: ask for a password
    /// - open: connect directly
    pub fn activate(self: &Rc<Self>, ssid: &str) {
        let Some(network) = self.snapshot.borrow().network(ssid).cloned() else {
            warn!("WifiManager: activate for unknown network '{}'", ssid);
            return;
        };

        if network.active {
            let device = self.wifi_device();
            info!("WifiManager: disconnecting {} from '{}'", device, ssid);
            self.runner.run_async(&nmcli::disconnect_device(&device));
            self.refresh_after(DISCONNECT_REFRESH_MS);
        } else if network.saved {
            info!("WifiManager: bringing up saved profile '{}'", ssid);
            self.runner.run_async(&nmcli::connect_saved(ssid));
            self.check_saved_connection(ssid);
        } else if network.is_secured() {
            self.open_prompt(ssid);
        } else {
            info!("WifiManager: connecting to open network '{}'", ssid);
            self.runner.run_async(&nmcli::connect_open(ssid));
            self.refresh_after(OPEN_CONNECT_REFRESH_MS);
        }
    }

    fn check_saved_connection(self: &Rc<Self>, ssid: &str) {
        let weak = Rc::downgrade(self);
        let ssid = ssid.to_string();
        let handle = self.scheduler.after(
            Duration::from_millis(SAVED_CONNECT_CHECK_MS),
            Box::new(move || {
                let Some(this) = weak.upgrade() else {
                    return;
                };
                if this.query_active_connection().as_deref() == Some(ssid.as_str()) {
                    this.refresh();
                } else {
                    debug!("WifiManager: '{}' did not come up, asking for password", ssid);
                    this.open_prompt(&ssid);
                }
            }),
        );
        self.track_one_shot(handle);
    }

    fn open_prompt(&self, ssid: &str) {
        self.cancel_session();
        self.notify_snapshot(|s| s.prompt = Some(PasswordPrompt::new(ssid)));
    }

    fn cancel_session(&self) {
        let session = self.session.borrow_mut().take();
        if let Some(session) = session
            && let Some(handle) = session.handle
        {
            debug!(
                "WifiManager: dropping connection to '{}' after {}/{} checks",
                session.target_ssid, session.attempt, session.max_attempts
            );
            self.scheduler.cancel(handle);
        }
    }

    /// Submit the password typed into the prompt.
    ///
    /// Too-short passwords are rejected inline without running anything.
    /// Otherwise the connect command starts and the active connection is
    /// checked until it matches or the attempts run out; the outcome shows
    /// up in the prompt of later snapshots.
    pub fn submit_password(self: &Rc<Self>, password: &str) -> Result<(), ConnectError> {
        let Some(prompt) = self.snapshot.borrow().prompt.clone() else {
            debug!("WifiManager: password submitted without a prompt");
            return Ok(());
        };
        if !prompt.submit_enabled {
            debug!("WifiManager: connection to '{}' already in progress", prompt.ssid);
            return Ok(());
        }

        let min = self.config.min_password_len;
        if password.chars().count() < min {
            let err = ConnectError::PasswordTooShort { min };
            let message = err.to_string();
            self.notify_snapshot(|s| {
                if let Some(p) = s.prompt.as_mut() {
                    p.message = Some(PromptMessage::Error(message));
                }
            });
            return Err(err);
        }

        let ssid = prompt.ssid;
        info!("WifiManager: connecting to '{}' with password", ssid);
        self.runner
            .run_async(&nmcli::connect_with_password(&ssid, password));
        self.notify_snapshot(|s| {
            if let Some(p) = s.prompt.as_mut() {
                p.message = Some(PromptMessage::Info(AUTH_HINT.to_string()));
                p.submit_enabled = false;
            }
        });

        let poll = PollUntil::new(
            Duration::from_millis(self.config.connect_check_interval_ms),
            self.config.connect_max_attempts,
        );
        self.session.replace(Some(ConnectSession {
            target_ssid: ssid.clone(),
            attempt: 0,
            max_attempts: poll.max_attempts,
            handle: None,
        }));

        let check_weak = Rc::downgrade(self);
        let done_weak = Rc::downgrade(self);
        let handle = poll.start(
            self.scheduler.as_ref(),
            move || {
                let Some(this) = check_weak.upgrade() else {
                    return false;
                };
                if let Some(session) = this.session.borrow_mut().as_mut() {
                    session.attempt += 1;
                }
                this.query_active_connection().as_deref() == Some(ssid.as_str())
            },
            move |outcome| {
                if let Some(this) = done_weak.upgrade() {
                    this.finish_session(outcome);
                }
            },
        );
        if let Some(session) = self.session.borrow_mut().as_mut() {
            session.handle = Some(handle);
        }
        Ok(())
    }

    fn finish_session(&self, outcome: PollOutcome) {
        let session = self.session.borrow_mut().take();
        let target = session.map(|s| s.target_ssid).unwrap_or_default();

        match outcome {
            PollOutcome::Succeeded { attempts } => {
                info!("WifiManager: connected to '{}' after {} checks", target, attempts);
                self.notify_snapshot(|s| s.prompt = None);
                self.refresh();
            }
            PollOutcome::Exhausted { attempts } => {
                let err = ConnectError::AttemptsExhausted { attempts };
                warn!("WifiManager: '{}': {}", target, err);
                let message = err.to_string();
                self.notify_snapshot(|s| {
                    if let Some(p) = s.prompt.as_mut() {
                        p.message = Some(PromptMessage::Error(message));
                        p.submit_enabled = true;
                    }
                });
            }
        }
    }

    /// Back button or Escape inside the prompt: return to the list.
    pub fn cancel_prompt(&self) {
        self.cancel_session();
        self.notify_snapshot_if(|s| s.prompt.take().is_some());
    }

    /// Delete the saved profile for `ssid`. Unsaved networks are ignored.
    pub fn forget(self: &Rc<Self>, ssid: &str) {
        let saved = self
            .snapshot
            .borrow()
            .network(ssid)
            .is_some_and(|n| n.saved);
        if !saved {
            debug!("WifiManager: '{}' has no saved profile to forget", ssid);
            return;
        }

        info!("WifiManager: forgetting '{}'", ssid);
        self.runner.run_async(&nmcli::forget(ssid));
        self.refresh_after(FORGET_REFRESH_MS);
    }

    pub fn toggle_power(self: &Rc<Self>) {
        let enabled = self.snapshot.borrow().enabled;
        if enabled {
            info!("WifiManager: turning radio off");
            self.runner.run_async(nmcli::RADIO_OFF);
            self.stop_polling();
        } else {
            info!("WifiManager: turning radio on");
            self.runner.run_async(nmcli::RADIO_ON);
            if let Some(handle) = self.pending_start.take() {
                self.scheduler.cancel(handle);
            }
            let weak = Rc::downgrade(self);
            let handle = self.scheduler.after(
                Duration::from_millis(POWER_ON_POLL_DELAY_MS),
                Box::new(move || {
                    if let Some(this) = weak.upgrade() {
                        this.pending_start.set(None);
                        this.start_polling();
                    }
                }),
            );
            self.pending_start.set(Some(handle));
        }
        self.refresh_after(POWER_REFRESH_MS);
    }

    pub fn on_visibility_change(self: &Rc<Self>, visible: bool) {
        if visible {
            self.refresh();
            self.start_polling();
        } else {
            self.stop_polling();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll
            .get()
            .is_some_and(|handle| self.scheduler.is_active(handle))
    }

    /// Rescan periodically while the popup is open. No-op if already polling
    /// or the radio is off.
    pub fn start_polling(self: &Rc<Self>) {
        if self.is_polling() {
            return;
        }
        if !self.query_enabled() {
            debug!("WifiManager: radio off, not polling");
            return;
        }

        self.notify_snapshot(|s| {
            s.scanning = true;
            s.polling = true;
        });
        self.runner.run_async(nmcli::RESCAN);
        self.refresh_after(INITIAL_SCAN_REFRESH_MS);

        let weak = Rc::downgrade(self);
        let handle = self.scheduler.every(
            Duration::from_millis(self.config.poll_interval_ms),
            Box::new(move || {
                let Some(this) = weak.upgrade() else {
                    return ControlFlow::Break;
                };
                if !this.query_enabled() {
                    debug!("WifiManager: radio went off, stopping poll");
                    this.poll.set(None);
                    this.clear_polling_flags();
                    return ControlFlow::Break;
                }
                this.runner.run_async(nmcli::RESCAN);
                this.refresh_after(RESCAN_REFRESH_MS);
                ControlFlow::Continue
            }),
        );
        self.poll.set(Some(handle));
    }

    /// Cancel the rescan loop, including one still waiting to start.
    pub fn stop_polling(&self) {
        if let Some(handle) = self.pending_start.take() {
            self.scheduler.cancel(handle);
        }
        if let Some(handle) = self.poll.take() {
            self.scheduler.cancel(handle);
        }
        self.clear_polling_flags();
    }

    /// Bar shutdown: drop the password session and every timer this manager
    /// still has scheduled.
    pub fn shutdown(&self) {
        self.cancel_session();
        self.stop_polling();
        let one_shots = self.one_shots.take();
        for handle in one_shots {
            self.scheduler.cancel(handle);
        }
        debug!("WifiManager: shut down");
    }

    fn clear_polling_flags(&self) {
        self.notify_snapshot_if(|s| {
            let changed = s.scanning || s.polling;
            s.scanning = false;
            s.polling = false;
            changed
        });
    }

    pub fn open_settings(&self) {
        self.runner.run_async(&self.config.settings_command);
        self.popups.close_all();
    }
}
