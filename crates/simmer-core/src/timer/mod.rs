mod driver;
mod registry;
mod service;
mod step;

pub use registry::{ClearOutcome, Completion, ScheduleRequest, TimerRegistry, Transition};
pub use service::TimerService;
pub use step::{StepTimer, TimerView};
