use async_trait::async_trait;
use chrono::{Days, NaiveDate};

use crate::{api::models::DailyEnergy, core::generation::ForecastService, prelude::*};

#[async_trait]
pub trait ForecastProvider: Sync {
    fn service(&self) -> ForecastService;

    /// Fetch the forecasts for the consecutive days, skipping the unavailable ones.
    ///
    /// Provider failures are not fatal: the planner falls back to another source.
    #[instrument(skip_all, fields(service = ?self.service()))]
    async fn get_upcoming_forecasts(&self, since: NaiveDate, n_days: u64) -> Vec<DailyEnergy> {
        let mut forecasts = Vec::new();
        for date in (0..n_days).filter_map(|n| since.checked_add_days(Days::new(n))) {
            match self.get_forecast(date).await {
                Ok(Some(forecast)) => forecasts.push(forecast),
                Ok(None) => debug!(%date, "unavailable"),
                Err(error) => warn!(%date, "failed to fetch the forecast: {error:#}"),
            }
        }
        info!(n_forecasts = forecasts.len(), "fetched");
        forecasts
    }

    async fn get_forecast(&self, on: NaiveDate) -> Result<Option<DailyEnergy>>;
}
