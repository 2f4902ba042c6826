quantity!(Percent, suffix: "%", precision: 1);

impl Percent {
    pub const HUNDRED: Self = Self(100.0);

    /// Convert the percentage into a `0.0..=1.0` ratio.
    pub const fn to_ratio(self) -> f64 {
        0.01 * self.0
    }
}

