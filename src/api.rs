mod device;
mod forecast;
pub mod models;
pub mod snapshot;

pub use self::{device::Device, forecast::ForecastProvider};
