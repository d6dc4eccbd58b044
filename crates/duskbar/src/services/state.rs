//! Process-wide shell state and the marker files that persist it.
//!
//! Brightness, caffeine and night-light are shared between managers (the
//! night-light re-applies the current brightness), so they live in one
//! [`ShellState`] instead of module globals. Each value is written only by the
//! manager that owns it.
//!
//! Marker files are how the on/off flags survive a bar restart: the file
//! existing means "on". They live in `/tmp` by default, so a reboot resets
//! them.

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use duskbar_core::Config;
use tracing::debug;

/// A flag stored as the existence of a file.
#[derive(Debug, Clone)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }

    /// Create or remove the file. Removing a missing file is not an error.
    pub fn set(&self, present: bool) -> io::Result<()> {
        if present {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map(|_| ())
        } else {
            match fs::remove_file(&self.path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightLightState {
    pub enabled: bool,
    /// Follow sunset/sunrise instead of the manual toggle.
    pub auto_mode: bool,
}

#[derive(Debug)]
pub struct ShellState {
    brightness: Cell<u32>,
    caffeine: Cell<bool>,
    night_light: Cell<NightLightState>,
}

impl ShellState {
    pub fn new(brightness: u32, caffeine: bool, night_light: NightLightState) -> Rc<Self> {
        Rc::new(Self {
            brightness: Cell::new(brightness),
            caffeine: Cell::new(caffeine),
            night_light: Cell::new(night_light),
        })
    }

    /// Initial state: brightness from config, flags from their marker files.
    pub fn from_config(config: &Config) -> Rc<Self> {
        let caffeine = MarkerFile::new(&config.caffeine.marker_file).is_present();
        let night_light = NightLightState {
            enabled: MarkerFile::new(&config.night_light.marker_file).is_present(),
            auto_mode: config.night_light.auto,
        };
        let brightness = config
            .brightness
            .initial
            .max(config.brightness.min)
            .min(super::brightness::MAX_LEVEL);
        debug!(
            "ShellState: brightness={} caffeine={} night_light={:?}",
            brightness, caffeine, night_light
        );
        Self::new(brightness, caffeine, night_light)
    }

    pub fn brightness(&self) -> u32 {
        self.brightness.get()
    }

    pub fn caffeine(&self) -> bool {
        self.caffeine.get()
    }

    pub fn night_light(&self) -> NightLightState {
        self.night_light.get()
    }

    pub(super) fn set_brightness(&self, level: u32) {
        self.brightness.set(level);
    }

    pub(super) fn set_caffeine(&self, active: bool) {
        self.caffeine.set(active);
    }

    pub(super) fn set_night_light(&self, state: NightLightState) {
        self.night_light.set(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let marker = MarkerFile::new(dir.path().join("nested/flag"));
        assert!(!marker.is_present());

        marker.set(true).unwrap();
        assert!(marker.is_present());
        marker.set(true).unwrap();

        marker.set(false).unwrap();
        assert!(!marker.is_present());
        marker.set(false).unwrap();
    }

    #[test]
    fn test_from_config_reads_markers() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.caffeine.marker_file = dir.path().join("caffeine");
        config.night_light.marker_file = dir.path().join("night");
        config.night_light.auto = false;
        config.brightness.initial = 2;

        fs::write(&config.caffeine.marker_file, "").unwrap();

        let state = ShellState::from_config(&config);
        assert!(state.caffeine());
        assert_eq!(
            state.night_light(),
            NightLightState {
                enabled: false,
                auto_mode: false
            }
        );
        assert_eq!(state.brightness(), 5);
    }
}
