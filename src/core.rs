pub mod battery;
pub mod clock;
pub mod demand;
pub mod generation;
pub mod inputs;
pub mod plan;
pub mod planner;
pub mod schedule;
pub mod simulator;
pub mod timeline;
pub mod window;
pub mod working_mode;

pub use self::{inputs::PlanInputs, planner::plan_charge, schedule::ScheduleEmitter};
