// gaudit data models

pub mod run;
pub mod section;
pub mod finding;
pub mod stat;
pub mod raw_object;
pub mod report;

// Re-exports for convenience
pub use run::{Run, RunStatus, InvocationParams};
pub use section::{Section, SectionStatus};
pub use finding::{Finding, Severity};
pub use stat::{Stat, stats_as_map};
pub use raw_object::RawObject;
pub use report::{RunReport, SectionReport};
