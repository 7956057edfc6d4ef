//! Wire formats for the Bambu Lab local protocol and Bambu SSDP discovery.

pub mod bambu;
pub mod report;
pub mod sequence;
pub mod ssdp;

pub use bambu::{BambuCommand, ProjectFileOptions, SpeedLevel, SpeedLevelError};
pub use report::{status_from_report, ReportOutcome, ReportState};
pub use sequence::SequenceCounter;
