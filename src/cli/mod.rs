//! Command implementations behind the `moodmix` binary.
//!
//! - [`serve`] runs the web server, optionally opening the login page
//! - [`plan`] runs the planner chain locally and prints the plan as a table

mod plan;
mod serve;

pub use plan::plan;
pub use serve::serve;
