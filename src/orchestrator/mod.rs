pub mod batch_processor;
pub mod paper_processor;

pub use batch_processor::Scheduler;
pub use paper_processor::{process_paper, Pipeline};
