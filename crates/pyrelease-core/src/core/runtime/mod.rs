//! Process execution and the side-effect seam the pipeline runs through.

pub(crate) mod effects;
pub(crate) mod process;
