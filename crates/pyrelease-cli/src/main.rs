use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use pyrelease_core::{CommandContext, ExecutionOutcome, ReleaseUserError, SharedEffects, SystemEffects};
use serde_json::json;

mod cli;
mod output;
mod style;

use cli::PyreleaseCli;
use output::{emit_output, OutputOptions};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PyreleaseCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let effects: SharedEffects = Arc::new(SystemEffects::new());
    let ctx = CommandContext::new(effects);
    let request = cli.release_request();

    let outcome = core_call(|| pyrelease_core::run_release(&ctx, &request));
    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };
    let code = emit_output(&opts, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("pyrelease={level},pyrelease_core={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn core_call<F>(action: F) -> ExecutionOutcome
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    match action() {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(user) = err.downcast_ref::<ReleaseUserError>() {
                return ExecutionOutcome::user_error(
                    user.message().to_string(),
                    user.details().clone(),
                );
            }
            let issues: Vec<String> = err.chain().map(std::string::ToString::to_string).collect();
            ExecutionOutcome::failure(
                format!("pyrelease: {err}"),
                json!({
                    "reason": "internal_error",
                    "error": err.to_string(),
                    "issues": issues,
                    "hint": "Re-run with -vv for more detail, or open an issue if this persists.",
                }),
            )
        }
    }
}
