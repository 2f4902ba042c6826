#[macro_use]
mod macros;

pub mod electric;
pub mod energy;
pub mod power;
pub mod proportions;
pub mod temperature;
pub mod time;
