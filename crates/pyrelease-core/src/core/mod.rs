pub(crate) mod config;
pub(crate) mod distribution;
pub(crate) mod runtime;
pub(crate) mod tooling;
