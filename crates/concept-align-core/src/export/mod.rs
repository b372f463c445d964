//! Mapping package export.

mod package;
mod packager;

pub use package::*;
pub use packager::*;
