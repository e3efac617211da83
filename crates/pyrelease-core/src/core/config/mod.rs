//! Release configuration: environment snapshot, `[tool.pyrelease]`, and the
//! per-command context.

pub mod context;
pub(crate) mod settings;

pub use settings::{
    BuildBackend, Credentials, ProjectLayout, ProjectSettings, ReleaseConfig,
    ReleaseRequest, DEFAULT_OUT_DIR, DEFAULT_TOKEN_ENV, DEFAULT_USERNAME,
};
pub(crate) use settings::EnvSnapshot;
