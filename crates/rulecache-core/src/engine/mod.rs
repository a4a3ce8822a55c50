pub mod locks;
pub mod pipeline;
pub mod runner;

pub use pipeline::{CompileOutcome, CompilePipeline, Timeouts};
pub use runner::{CheckOutcome, Disposition, RunReport, WorkflowRunner};
