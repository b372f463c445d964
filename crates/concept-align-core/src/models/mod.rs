//! Domain models for the concept-align system.

mod concept;
mod mapping;
mod source;
mod submission;

pub use concept::*;
pub use mapping::*;
pub use source::*;
pub use submission::*;
