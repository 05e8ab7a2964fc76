// Trip processing pipeline: source, validation, features, cleaning, loading

pub mod cleaning;
pub mod features;
pub mod loader;
pub mod source;
pub mod validation;

// Re-export the entry points used by tasks and the CLI
pub use cleaning::{CleaningOutcome, CleaningPipeline};
pub use features::ZoneGrid;
pub use loader::{LoadReport, Loader};
pub use validation::{ExclusionLedger, ExclusionReason};
