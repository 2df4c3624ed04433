//! 告警执行器：去重窗口、检查评估与执行器池

pub mod dedup;
pub mod evaluator;
pub mod executor;
pub mod expression;

pub use dedup::{Admission, DedupWindow, KeysSeen};
pub use evaluator::ExpressionCheckEvaluator;
pub use executor::{ExecutionReport, ExecutorPool, ExecutorStats};
pub use expression::{ThresholdEngine, ThresholdExpression};
