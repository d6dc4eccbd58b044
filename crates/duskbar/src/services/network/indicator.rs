//! Tray summary of the WiFi connection, polled on its own timer.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use super::nmcli;
use crate::services::callbacks::{CallbackId, Callbacks};
use crate::services::command::CommandRunner;
use crate::services::scheduler::{ControlFlow, PollHandle, Scheduler};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WifiStatus {
    pub enabled: bool,
    pub connected: bool,
    /// Signal of the active network, 0 when not connected.
    pub signal: u8,
}

/// Nerd-font glyph for a signal percentage.
pub fn signal_icon(strength: u8) -> &'static str {
    match strength {
        80.. => "󰤨",
        60.. => "󰤥",
        40.. => "󰤢",
        20.. => "󰤟",
        _ => "󰤯",
    }
}

impl WifiStatus {
    pub fn icon(&self) -> &'static str {
        if !self.enabled {
            "󰤭"
        } else if !self.connected {
            "󰤯"
        } else {
            signal_icon(self.signal)
        }
    }

    pub fn tooltip(&self) -> String {
        if !self.enabled {
            "WiFi Disabled".to_string()
        } else if !self.connected {
            "WiFi Not Connected".to_string()
        } else {
            format!("WiFi {}%", self.signal)
        }
    }
}

pub struct WifiIndicator {
    runner: Rc<dyn CommandRunner>,
    scheduler: Rc<dyn Scheduler>,
    interval: Duration,
    status: Cell<WifiStatus>,
    callbacks: Callbacks<WifiStatus>,
    poll: Cell<Option<PollHandle>>,
}

impl WifiIndicator {
    pub fn new(
        runner: Rc<dyn CommandRunner>,
        scheduler: Rc<dyn Scheduler>,
        interval: Duration,
    ) -> Rc<Self> {
        Rc::new(Self {
            runner,
            scheduler,
            interval,
            status: Cell::new(WifiStatus::default()),
            callbacks: Callbacks::new(),
            poll: Cell::new(None),
        })
    }

    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&WifiStatus) + 'static,
    {
        let id = self.callbacks.register(callback);
        self.callbacks.notify_single(id, &self.status.get());
        id
    }

    pub fn status(&self) -> WifiStatus {
        self.status.get()
    }

    fn query(&self) -> WifiStatus {
        let enabled = self
            .runner
            .run_sync(nmcli::RADIO_STATUS)
            .text_if_success()
            .is_some_and(|text| nmcli::parse_radio(&text));
        if !enabled {
            return WifiStatus::default();
        }

        let connected = self
            .runner
            .run_sync(nmcli::ACTIVE_CONNECTIONS)
            .text_if_success()
            .and_then(|text| nmcli::parse_active_connection(&text))
            .is_some();
        let signal = if connected {
            self.runner
                .run_sync(nmcli::ACTIVE_SIGNAL)
                .text_if_success()
                .and_then(|text| nmcli::parse_active_signal(&text))
                .unwrap_or(0)
        } else {
            0
        };

        WifiStatus {
            enabled,
            connected,
            signal,
        }
    }

    /// Query now and notify if anything changed.
    pub fn poll_now(&self) {
        let status = self.query();
        if self.status.replace(status) != status {
            debug!("WifiIndicator: {:?}", status);
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
