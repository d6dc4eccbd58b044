//! Night light: automatic on at sunset, off at sunrise.
//!
//! Sunrise and sunset come from a simple solar-geometry model (declination
//! plus hour angle, no equation of time), good to a few minutes. They are
//! computed at most once per calendar day.
//!
//! In auto mode a periodic check compares "is it night?" with the applied
//! state and applies only on a change. A manual toggle leaves auto mode.
//! Applying means updating [`ShellState`], the marker file and re-running the
//! brightness script, which picks the shader based on the marker.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use duskbar_core::config::NightLightConfig;
use tracing::{debug, info, warn};

use super::brightness::brightness_command;
use super::callbacks::{CallbackId, Callbacks};
use super::clock::Clock;
use super::command::CommandRunner;
use super::scheduler::{ControlFlow, PollHandle, Scheduler};
use super::state::{MarkerFile, NightLightState, ShellState};

/// Sun center 50 arcminutes below the horizon (refraction plus solar radius).
const ZENITH_DEG: f64 = 90.833;

/// Used when the local time is unavailable.
const FALLBACK_SUN_TIMES: SunTimes = SunTimes {
    sunrise: 6.0,
    sunset: 18.0,
};

/// Sunrise and sunset as local decimal hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunTimes {
    pub sunrise: f64,
    pub sunset: f64,
}

impl SunTimes {
    /// Night is from sunset until sunrise.
    pub fn is_night(&self, hour: f64) -> bool {
        hour >= self.sunset || hour < self.sunrise
    }
}

/// Sunrise and sunset for a day of the year at a location.
///
/// Latitudes with no sunrise or sunset clamp the hour angle, giving a 24 h or
/// 0 h day instead of NaN.
pub fn sun_times(latitude: f64, longitude: f64, day_of_year: u32, utc_offset_hours: f64) -> SunTimes {
    let lat = latitude.to_radians();
    let declination =
        (-23.45 * (360.0 / 365.0 * (day_of_year as f64 + 10.0)).to_radians().cos()).to_radians();

    let cos_hour_angle = (ZENITH_DEG.to_radians().cos() - lat.sin() * declination.sin())
        / (lat.cos() * declination.cos());
    let hour_angle = cos_hour_angle.clamp(-1.0, 1.0).acos().to_degrees();

    let solar_noon = 12.0 - longitude / 15.0;
    SunTimes {
        sunrise: solar_noon - hour_angle / 15.0 + utc_offset_hours,
        sunset: solar_noon + hour_angle / 15.0 + utc_offset_hours,
    }
}

/// `h:mm AM/PM` for a decimal hour (`17.5` → `5:30 PM`).
pub fn format_sun_time(decimal_hour: f64) -> String {
    let total_minutes = (decimal_hour * 60.0).round().rem_euclid(24.0 * 60.0) as u32;
    let hour = total_minutes / 60;
    let minute = total_minutes % 60;
    let ampm = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour {
        0 => 12,
        h if h > 12 => h - 12,
        h => h,
    };
    format!("{}:{:02} {}", display_hour, minute, ampm)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NightLightSnapshot {
    pub enabled: bool,
    pub auto_mode: bool,
    pub schedule: SunTimes,
}

impl NightLightSnapshot {
    pub fn description(&self) -> String {
        if self.auto_mode {
            format!(
                "Auto: {} - {}",
                format_sun_time(self.schedule.sunset),
                format_sun_time(self.schedule.sunrise)
            )
        } else {
            "Manual mode".to_string()
        }
    }
}

pub struct NightLight {
    runner: Rc<dyn CommandRunner>,
    scheduler: Rc<dyn Scheduler>,
    clock: Rc<dyn Clock>,
    state: Rc<ShellState>,
    latitude: f64,
    longitude: f64,
    check_interval: Duration,
    marker: MarkerFile,
    brightness_script: PathBuf,
    /// (day of year, schedule for that day)
    cache: Cell<Option<(u32, SunTimes)>>,
    computations: Cell<u32>,
    callbacks: Callbacks<NightLightSnapshot>,
    poll: Cell<Option<PollHandle>>,
}

impl NightLight {
    pub fn new(
        runner: Rc<dyn CommandRunner>,
        scheduler: Rc<dyn Scheduler>,
        clock: Rc<dyn Clock>,
        state: Rc<ShellState>,
        config: &NightLightConfig,
        brightness_script: PathBuf,
    ) -> Rc<Self> {
        Rc::new(Self {
            runner,
            scheduler,
            clock,
            state,
            latitude: config.latitude,
            longitude: config.longitude,
            check_interval: Duration::from_secs(config.check_interval_secs),
            marker: MarkerFile::new(&config.marker_file),
            brightness_script,
            cache: Cell::new(None),
            computations: Cell::new(0),
            callbacks: Callbacks::new(),
            poll: Cell::new(None),
        })
    }

    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&NightLightSnapshot) + 'static,
    {
        let id = self.callbacks.register(callback);
        self.callbacks.notify_single(id, &self.snapshot());
        id
    }

    pub fn snapshot(&self) -> NightLightSnapshot {
        let state = self.state.night_light();
        NightLightSnapshot {
            enabled: state.enabled,
            auto_mode: state.auto_mode,
            schedule: self.schedule(),
        }
    }

    pub fn description(&self) -> String {
        self.snapshot().description()
    }

    /// How many times the solar model has run.
    pub fn computations(&self) -> u32 {
        self.computations.get()
    }

    /// Today's schedule, computed on the first call of each day.
    pub fn schedule(&self) -> SunTimes {
        let Some(now) = self.clock.now() else {
            return FALLBACK_SUN_TIMES;
        };
        if let Some((day, times)) = self.cache.get()
            && day == now.day_of_year
        {
            return times;
        }

        let times = sun_times(
            self.latitude,
            self.longitude,
            now.day_of_year,
            now.utc_offset_hours,
        );
        self.computations.set(self.computations.get() + 1);
        debug!(
            "NightLight: day {} sunrise {} sunset {}",
            now.day_of_year,
            format_sun_time(times.sunrise),
            format_sun_time(times.sunset)
        );
        self.cache.set(Some((now.day_of_year, times)));
        times
    }

    pub fn is_night(&self) -> bool {
        let Some(now) = self.clock.now() else {
            return false;
        };
        self.schedule().is_night(now.decimal_hour())
    }

    /// Check now, then every check interval.
    pub fn start(self: &Rc<Self>) {
        if self
            .poll
            .get()
            .is_some_and(|handle| self.scheduler.is_active(handle))
        {
            return;
        }
        self.check();

        let weak = Rc::downgrade(self);
        let handle = self.scheduler.every(
            self.check_interval,
            Box::new(move || match weak.upgrade() {
                Some(this) => {
                    this.check();
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

    /// In auto mode, apply if the applied state disagrees with the clock.
    pub fn check(&self) {
        let state = self.state.night_light();
        if !state.auto_mode {
            return;
        }
        let night = self.is_night();
        if night != state.enabled {
            info!("NightLight: auto {}", if night { "enabled" } else { "disabled" });
            self.apply(night);
        }
    }

    fn apply(&self, enabled: bool) {
        let auto_mode = self.state.night_light().auto_mode;
        self.state
            .set_night_light(NightLightState { enabled, auto_mode });

        if let Err(e) = self.marker.set(enabled) {
            warn!(
                "NightLight: failed to update marker {:?}: {}",
                self.marker.path(),
                e
            );
        }
        self.runner.run_async(&brightness_command(
            &self.brightness_script,
            self.state.brightness(),
        ));
        self.callbacks.notify(&self.snapshot());
    }

    /// The on/off button: leaves auto mode and flips the light.
    pub fn toggle_manual(&self) {
        let state = self.state.night_light();
        self.state.set_night_light(NightLightState {
            enabled: state.enabled,
            auto_mode: false,
        });
        self.apply(!state.enabled);
    }

    /// Turning auto on applies the clock's answer right away; turning it off
    /// keeps whatever is applied.
    pub fn set_auto(&self, auto_mode: bool) {
        let state = self.state.night_light();
        self.state.set_night_light(NightLightState {
            enabled: state.enabled,
            auto_mode,
        });
        if auto_mode {
            self.apply(self.is_night());
        } else {
            self.callbacks.notify(&self.snapshot());
        }
    }
}
