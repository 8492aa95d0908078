pub mod analysis;
pub mod callback;
pub mod engine;
pub mod redo;
pub mod undo;

pub use analysis::{AnalysisResult, StopCondition};
pub use callback::{PageRequirement, RecoveryCallbackTable};
pub use engine::{recover, RecoveryReport};
