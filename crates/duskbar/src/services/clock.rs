//! Local wall-clock time, behind a trait so schedules can be tested.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTime {
    /// 1-based day of the year.
    pub day_of_year: u32,
    pub hour: u32,
    pub minute: u32,
    /// Offset of local time from UTC in hours (e.g. -6.0 for CST).
    pub utc_offset_hours: f64,
}

impl LocalTime {
    /// Hour of day with minutes as a fraction (`18:30` → `18.5`).
    pub fn decimal_hour(&self) -> f64 {
        self.hour as f64 + self.minute as f64 / 60.0
    }
}

pub trait Clock {
    /// `None` when the local time cannot be determined.
    fn now(&self) -> Option<LocalTime>;
}

/// Local time from GLib (honours `TZ`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Option<LocalTime> {
        let now = glib::DateTime::now_local().ok()?;
        Some(LocalTime {
            day_of_year: u32::try_from(now.day_of_year()).ok()?,
            hour: u32::try_from(now.hour()).ok()?,
            minute: u32::try_from(now.minute()).ok()?,
            // TimeSpan is in microseconds.
            utc_offset_hours: now.utc_offset().0 as f64 / 3_600_000_000.0,
        })
    }
}

#[cfg(test)]
pub use fixed::FixedClock;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_hour() {
        let t = LocalTime {
            day_of_year: 1,
            hour: 18,
            minute: 30,
            utc_offset_hours: 0.0,
        };
        assert!((t.decimal_hour() - 18.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_system_clock_is_sane() {
        let now = SystemClock.now().unwrap();
        assert!((1..=366).contains(&now.day_of_year));
        assert!(now.hour < 24 && now.minute < 60);
        assert!(now.utc_offset_hours.abs() <= 14.0);
    }
}
