//! Outcome shaping shared by the library and the CLI.

pub(crate) mod outcome;
