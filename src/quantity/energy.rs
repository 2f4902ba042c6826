use std::ops::{Div, Mul};

use crate::quantity::{power::Kilowatts, proportions::Percent, time::Hours};

quantity!(KilowattHours, suffix: "kWh", precision: 3);

impl Mul<Percent> for KilowattHours {
    type Output = Self;

    fn mul(self, percent: Percent) -> Self::Output {
        self * percent.to_ratio()
    }
}

impl Div<Kilowatts> for KilowattHours {
    type Output = Hours;

    fn div(self, rhs: Kilowatts) -> Self::Output {
        Hours(self.0 / rhs.0)
    }
}

impl Div<Hours> for KilowattHours {
    type Output = Kilowatts;

    fn div(self, rhs: Hours) -> Self::Output {
        assert!(rhs.0.is_normal());
        Kilowatts(self.0 / rhs.0)
    }
}
