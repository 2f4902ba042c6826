use chrono::TimeDelta;

quantity!(Hours, suffix: "h", precision: 2);

impl Hours {
    pub const ONE: Self = Self(1.0);

    /// Round to the nearest whole minute.
    #[must_use]
    pub fn round_to_minute(self) -> Self {
        Self((self.0 * 60.0).round() / 60.0)
    }
}

impl From<TimeDelta> for Hours {
    fn from(time_delta: TimeDelta) -> Self {
        Self(time_delta.as_seconds_f64() / 3600.0)
    }
}

impl From<Hours> for TimeDelta {
    #[expect(clippy::cast_possible_truncation)]
    fn from(hours: Hours) -> Self {
        Self::seconds((hours.0 * 3600.0).round() as i64)
    }
}
