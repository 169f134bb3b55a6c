mod pipeline;
mod traits;

pub use pipeline::{Coordinator, RunReport};
pub use traits::{Planner, Report, Reporter};
