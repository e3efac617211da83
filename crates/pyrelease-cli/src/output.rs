use atty::Stream;
use color_eyre::Result;
use pyrelease_core::{format_bytes, short_sha, CommandStatus, ExecutionOutcome, StepStatus};
use serde::Serialize;
use serde_json::Value;

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    status: CommandStatus,
    message: &'a str,
    details: &'a Value,
}

pub fn emit_output(opts: &OutputOptions, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();

    if opts.json {
        let payload = JsonEnvelope {
            status: outcome.status,
            message: &outcome.message,
            details: &outcome.details,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if opts.quiet {
        if outcome.status != CommandStatus::Ok {
            eprintln!("{}", outcome.message);
        }
        return Ok(code);
    }

    let style = Style::new(opts.no_color, atty::is(Stream::Stdout));
    println!("{}", style.status(outcome.status, &outcome.message));
    for line in render_plan(&style, &outcome.details) {
        println!("{line}");
    }
    for line in render_steps(&style, &outcome.details) {
        println!("{line}");
    }
    for line in render_artifacts(&style, &outcome.details) {
        println!("{line}");
    }

    if outcome.status != CommandStatus::Ok {
        println!();
        println!("Why:");
        for reason in collect_why_bullets(&outcome.details, &outcome.message) {
            println!("  • {reason}");
        }
        let fixes = collect_fix_bullets(&outcome.details);
        println!();
        println!("Fix:");
        for fix in fixes {
            println!("{}", style.fix_bullet(&format!("  • {fix}")));
        }
    }

    Ok(code)
}

fn render_plan(style: &Style, details: &Value) -> Vec<String> {
    let Some(steps) = details.get("plan").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        let name = step.get("step").and_then(Value::as_str).unwrap_or_default();
        let command = step
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default();
        lines.push(format!("  {}. {name:<20} {command}", index + 1));
        if let Some(env) = step.get("env").and_then(Value::as_object) {
            for (key, value) in env {
                let value = value.as_str().unwrap_or_default();
                lines.push(style.dim(&format!("       env {key}={value}")));
            }
        }
    }
    lines
}

fn render_steps(style: &Style, details: &Value) -> Vec<String> {
    let Some(steps) = details.get("steps").and_then(Value::as_array) else {
        return Vec::new();
    };
    steps
        .iter()
        .filter_map(|step| {
            let name = step.get("step")?.as_str()?;
            let status = match step.get("status")?.as_str()? {
                "ok" => StepStatus::Ok,
                "failed" => StepStatus::Failed,
                _ => StepStatus::Skipped,
            };
            let text = match status {
                StepStatus::Skipped => format!("{name:<20} skipped"),
                _ => {
                    let millis = step.get("duration_ms").and_then(Value::as_u64).unwrap_or(0);
                    format!("{name:<20} {}", format_duration(millis))
                }
            };
            Some(style.step(status, &text))
        })
        .collect()
}

fn render_artifacts(style: &Style, details: &Value) -> Vec<String> {
    let Some(artifacts) = details.get("artifacts").and_then(Value::as_array) else {
        return Vec::new();
    };
    if artifacts.is_empty() {
        return Vec::new();
    }
    let rows: Vec<(String, String, String)> = artifacts
        .iter()
        .filter_map(|artifact| {
            let path = artifact.get("path")?.as_str()?.to_string();
            let bytes = artifact.get("bytes")?.as_u64()?;
            let sha = artifact.get("sha256")?.as_str()?;
            Some((path, format_bytes(bytes), short_sha(sha).to_string()))
        })
        .collect();
    let width = rows.iter().map(|(path, _, _)| path.len()).max().unwrap_or(0);
    let mut lines = vec![style.info("Artifacts:")];
    for (path, size, sha) in rows {
        lines.push(format!("  {path:<width$}  {size:>9}  {}", style.dim(&sha)));
    }
    lines
}

fn format_duration(millis: u64) -> String {
    if millis < 1_000 {
        format!("{millis}ms")
    } else {
        format!("{}.{}s", millis / 1_000, (millis % 1_000) / 100)
    }
}

fn collect_why_bullets(details: &Value, fallback: &str) -> Vec<String> {
    let mut bullets = Vec::new();
    if let Some(reason) = details.get("reason").and_then(Value::as_str) {
        push_unique(&mut bullets, reason_display(reason).unwrap_or(reason));
    }
    if let Some(error) = details.get("error").and_then(Value::as_str) {
        push_unique(&mut bullets, error);
    }
    if let Some(issues) = details.get("issues").and_then(Value::as_array) {
        for issue in issues.iter().filter_map(Value::as_str) {
            push_unique(&mut bullets, issue);
        }
    }
    if let Some(command) = details.get("command").and_then(Value::as_str) {
        let line = match details.get("code").and_then(Value::as_i64) {
            Some(code) => format!("`{command}` exited with status {code}"),
            None => format!("`{command}` did not run to completion"),
        };
        push_unique(&mut bullets, line);
    }
    if let Some(stderr) = details.get("stderr").and_then(Value::as_str) {
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            push_unique(&mut bullets, format!("stderr: {}", line.trim_end()));
        }
    }
    if bullets.is_empty() {
        bullets.push(fallback.to_string());
    }
    bullets
}

fn collect_fix_bullets(details: &Value) -> Vec<String> {
    let mut fixes = Vec::new();
    if let Some(hint) = details.get("hint").and_then(Value::as_str) {
        push_unique(&mut fixes, hint);
    }
    let halted = details.get("keep_going") == Some(&Value::Bool(false));
    if halted && details.get("failed_step").is_some() {
        push_unique(
            &mut fixes,
            "Pass --keep-going to run the remaining steps anyway.",
        );
    }
    if fixes.is_empty() {
        fixes.push("Re-run with -v for more detail or --dry-run to inspect the plan.".to_string());
    }
    fixes
}

fn reason_display(reason: &str) -> Option<&'static str> {
    match reason {
        "missing_project_metadata" => Some("No setup.py or pyproject.toml in the project directory"),
        "missing_project_dir" => Some("The project directory does not exist"),
        "interpreter_not_found" => Some("No Python interpreter could be found"),
        "unsafe_output_dir" => Some("The output directory would remove the project itself"),
        "cleanup_failed" => Some("The output directory could not be recreated"),
        "tool_install_failed" => Some("Upgrading the packaging tools failed"),
        "build_failed" => Some("The build step failed"),
        "no_artifacts" => Some("The build produced no distributions"),
        "artifact_scan_failed" => Some("The output directory could not be read"),
        "upload_failed" => Some("The upload step failed"),
        "internal_error" => Some("pyrelease hit an unexpected error"),
        "invalid_pyproject" => Some("pyproject.toml could not be parsed"),
        "invalid_tool_setting" => Some("A [tool.pyrelease] setting has the wrong type"),
        "invalid_backend" => Some("Unknown build backend"),
        "backend_unavailable" => Some("The requested build backend does not fit this project"),
        _ => None,
    }
}

fn push_unique(vec: &mut Vec<String>, text: impl Into<String>) {
    let entry = text.into();
    if entry.trim().is_empty() {
        return;
    }
    if !vec.iter().any(|existing| existing == &entry) {
        vec.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn why_bullets_include_command_and_stderr_tail() {
        let details = json!({
            "reason": "build_failed",
            "error": "build failed",
            "command": "python3 -m build --outdir dist .",
            "code": 1,
            "stderr": "Traceback\nValueError: bad version\n",
        });
        let bullets = collect_why_bullets(&details, "fallback");
        assert_eq!(bullets[0], "The build step failed");
        assert!(bullets
            .iter()
            .any(|b| b == "`python3 -m build --outdir dist .` exited with status 1"));
        assert!(bullets.iter().any(|b| b == "stderr: ValueError: bad version"));
    }

    #[test]
    fn why_bullets_fall_back_to_message() {
        let bullets = collect_why_bullets(&json!({}), "pyrelease: boom");
        assert_eq!(bullets, vec!["pyrelease: boom".to_string()]);
    }

    #[test]
    fn fix_bullets_suggest_keep_going_after_a_halt() {
        let details = json!({
            "hint": "Check the upload token.",
            "failed_step": "upload",
            "keep_going": false,
        });
        let fixes = collect_fix_bullets(&details);
        assert_eq!(fixes[0], "Check the upload token.");
        assert!(fixes.iter().any(|f| f.contains("--keep-going")));
    }

    #[test]
    fn artifacts_render_the_shared_short_digest() {
        let style = Style::new(true, false);
        let digest = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let details = json!({
            "artifacts": [
                {"path": "dist/demo-0.1.0.tar.gz", "bytes": 2048, "sha256": digest},
            ]
        });
        let lines = render_artifacts(&style, &details);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(short_sha(digest)), "{}", lines[1]);
        assert!(!lines[1].contains(digest));
    }

    #[test]
    fn steps_render_skipped_without_duration() {
        let style = Style::new(true, false);
        let details = json!({
            "steps": [
                {"step": "build", "status": "failed", "duration_ms": 1500},
                {"step": "upload", "status": "skipped", "duration_ms": 0},
            ]
        });
        let lines = render_steps(&style, &details);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("1.5s"));
        assert!(lines[1].ends_with("skipped"));
    }
}
