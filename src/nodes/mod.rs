//! The three phases of the generation pipeline.

mod approval;
mod architect;
mod elements;

pub use approval::ApprovalGate;
pub use architect::ArchitectNode;
pub use elements::ElementsNode;
