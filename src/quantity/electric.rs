//! Battery terminal quantities.

use std::ops::Mul;

use crate::quantity::power::Watts;

quantity!(Volts, suffix: "V", precision: 2);
quantity!(Amperes, suffix: "A", precision: 1);
quantity!(Ohms, suffix: "Ω", precision: 4);

impl Mul<Ohms> for Amperes {
    type Output = Volts;

    fn mul(self, resistance: Ohms) -> Self::Output {
        Volts(self.0 * resistance.0)
    }
}

impl Mul<Volts> for Amperes {
    type Output = Watts;

    fn mul(self, voltage: Volts) -> Self::Output {
        Watts(self.0 * voltage.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::quantity::power::Kilowatts;

    #[test]
    fn test_terminal_power() {
        let power = Kilowatts::from(Amperes(50.0) * Volts(52.0));
        assert_abs_diff_eq!(power.0, 2.6);
    }

    #[test]
    fn test_resistive_drop() {
        assert_abs_diff_eq!((Amperes(25.0) * Ohms(0.08)).0, 2.0);
    }
}
