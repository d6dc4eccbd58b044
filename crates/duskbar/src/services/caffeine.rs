//! Caffeine - keeps the session from going idle.
//!
//! Turning it on starts a detached `systemd-inhibit ... sleep infinity` tagged
//! with a fixed `--who`, turning it off kills anything carrying that tag. The
//! marker file records the state so a restarted bar shows the right icon
//! while the inhibitor from the previous run is still alive.

use std::path::PathBuf;
use std::rc::Rc;

use tracing::{info, warn};

use super::callbacks::{CallbackId, Callbacks};
use super::command::CommandRunner;
use super::state::{MarkerFile, ShellState};

const INHIBIT_TAG: &str = "duskbar-caffeine";

pub fn inhibit_command() -> String {
    format!(
        "systemd-inhibit --what=idle --who={} --why='Caffeine mode' sleep infinity &",
        INHIBIT_TAG
    )
}

pub fn release_command() -> String {
    format!("pkill -f 'systemd-inhibit.*{}'", INHIBIT_TAG)
}

pub struct Caffeine {
    runner: Rc<dyn CommandRunner>,
    state: Rc<ShellState>,
    marker: MarkerFile,
    callbacks: Callbacks<bool>,
}

impl Caffeine {
    pub fn new(runner: Rc<dyn CommandRunner>, state: Rc<ShellState>, marker_file: PathBuf) -> Rc<Self> {
        Rc::new(Self {
            runner,
            state,
            marker: MarkerFile::new(marker_file),
            callbacks: Callbacks::new(),
        })
    }

    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&bool) + 'static,
    {
        let id = self.callbacks.register(callback);
        self.callbacks.notify_single(id, &self.active());
        id
    }

    pub fn active(&self) -> bool {
        self.state.caffeine()
    }

    pub fn icon(&self) -> &'static str {
        if self.active() { "󰅶" } else { "󰛊" }
    }

    pub fn tooltip(&self) -> &'static str {
        if self.active() {
            "Caffeine ON"
        } else {
            "Caffeine OFF"
        }
    }

    pub fn toggle(&self) {
        let active = !self.active();
        info!("Caffeine: {}", if active { "on" } else { "off" });

        self.state.set_caffeine(active);
        if active {
            self.runner.run_async(&inhibit_command());
        } else {
            self.runner.run_async(&release_command());
        }
        if let Err(e) = self.marker.set(active) {
            warn!("Caffeine: failed to update marker {:?}: {}", self.marker.path(), e);
        }
        self.callbacks.notify(&active);
    }
}
