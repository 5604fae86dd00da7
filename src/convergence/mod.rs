//! 偏移量收敛检测模块

pub mod detector;
pub mod memo;
pub mod snapshot;

pub use detector::{ConvergenceDetector, ConvergenceOutcome, ConvergenceScope};
pub use memo::{ConvergenceMemo, MemoKey};
pub use snapshot::{ConvergenceSnapshot, OffsetVerdict, render_snapshot};
