//! Software brightness (a screen shader, 100 = no dimming).
//!
//! The level is applied by running the configured script with the percentage
//! as its only argument. The night light re-runs the same script when it
//! flips, so both go through [`brightness_command`].

use std::path::{Path, PathBuf};
use std::rc::Rc;

use duskbar_core::config::BrightnessConfig;
use tracing::debug;

use super::callbacks::{CallbackId, Callbacks};
use super::command::{CommandRunner, shell_quote};
use super::state::ShellState;

pub const MAX_LEVEL: u32 = 100;

pub fn brightness_command(script: &Path, level: u32) -> String {
    format!("{} {}", shell_quote(&script.to_string_lossy()), level)
}

pub struct BrightnessController {
    runner: Rc<dyn CommandRunner>,
    state: Rc<ShellState>,
    script: PathBuf,
    min: u32,
    callbacks: Callbacks<u32>,
}

impl BrightnessController {
    pub fn new(
        runner: Rc<dyn CommandRunner>,
        state: Rc<ShellState>,
        config: &BrightnessConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            runner,
            state,
            script: config.script_path(),
            min: config.min.min(MAX_LEVEL),
            callbacks: Callbacks::new(),
        })
    }

    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&u32) + 'static,
    {
        let id = self.callbacks.register(callback);
        self.callbacks.notify_single(id, &self.level());
        id
    }

    pub fn level(&self) -> u32 {
        self.state.brightness()
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Clamp to `[min, 100]`, store and apply. Returns the applied level.
    pub fn set_level(&self, level: u32) -> u32 {
        let level = level.clamp(self.min, MAX_LEVEL);
        debug!("BrightnessController: level {}", level);
        self.state.set_brightness(level);
        self.runner
            .run_async(&brightness_command(&self.script, level));
        self.callbacks.notify(&level);
        level
    }
}
