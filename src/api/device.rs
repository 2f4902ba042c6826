use std::ops::RangeInclusive;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    api::models::{BatteryTelemetry, DailyEnergy, DeviceRating, MinSoc},
    core::schedule::ChargeTimes,
    prelude::*,
};

/// Inverter cloud access consumed by the planner.
///
/// Implementations own the transport, authentication and retries.
#[async_trait]
pub trait Device: Sync {
    async fn get_battery_telemetry(&self, serial_number: &str) -> Result<BatteryTelemetry>;

    async fn get_min_soc(&self, serial_number: &str) -> Result<MinSoc>;

    /// Daily consumption reports, one per available day in the range.
    async fn get_consumption_history(
        &self,
        serial_number: &str,
        dates: RangeInclusive<NaiveDate>,
    ) -> Result<Vec<DailyEnergy>>;

    /// Daily PV generation reports, one per available day in the range.
    async fn get_generation_history(
        &self,
        serial_number: &str,
        dates: RangeInclusive<NaiveDate>,
    ) -> Result<Vec<DailyEnergy>>;

    /// [`None`] when the model is unknown.
    async fn get_device_rating(&self, serial_number: &str) -> Result<Option<DeviceRating>>;

    async fn set_charge_times(&self, serial_number: &str, charge_times: &ChargeTimes) -> Result;
}
