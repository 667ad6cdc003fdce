//! Process-pool strategy: one child process per unit
//!
//! Children share no memory with the parent. Each runs `<worker-program> unit`,
//! writes to the same SQLite file the parent uses, and streams one JSON
//! [`UnitOutcome`] per line on stdout. URLs a child never reported (because it
//! crashed or overran its deadline) are recorded as worker failures.

use crate::orchestrator::{fail_unit, OrchestratorSettings};
use crate::pipeline::{UnitError, UnitOutcome};
use futures::future::join_all;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Slack added to a child's deadline on top of the per-URL fetch timeouts
const CHILD_DEADLINE_SLACK: Duration = Duration::from_secs(10);

pub(crate) async fn run(
    settings: &OrchestratorSettings,
    units: Vec<Vec<String>>,
    timeout: Duration,
) -> Vec<UnitOutcome> {
    let children = units
        .into_iter()
        .map(|unit| run_child(settings, unit, timeout));

    join_all(children).await.into_iter().flatten().collect()
}

fn build_command(settings: &OrchestratorSettings, unit: &[String], timeout: Duration) -> Command {
    let mut command = Command::new(&settings.worker_program);
    command
        .arg("unit")
        .arg("--database")
        .arg(&settings.database_path)
        .arg("--timeout-ms")
        .arg(timeout.as_millis().to_string())
        .arg("--connect-timeout-ms")
        .arg(settings.fetcher.connect_timeout_ms.to_string())
        .arg("--busy-timeout-ms")
        .arg(settings.busy_timeout.as_millis().to_string())
        .arg("--user-agent")
        .arg(&settings.fetcher.user_agent)
        .arg("--")
        .args(unit)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    command
}

async fn run_child(
    settings: &OrchestratorSettings,
    unit: Vec<String>,
    timeout: Duration,
) -> Vec<UnitOutcome> {
    let child = match build_command(settings, &unit, timeout).spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(
                program = %settings.worker_program.display(),
                error = %err,
                "failed to spawn unit process"
            );
            return fail_unit(&unit, &format!("failed to spawn worker process: {}", err));
        }
    };

    let pid = child.id();
    let deadline = timeout
        .saturating_mul(unit.len() as u32)
        .saturating_add(CHILD_DEADLINE_SLACK);

    // Dropping the wait future on timeout drops the child, and kill_on_drop reaps it
    let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            return fail_unit(&unit, &format!("failed to wait for worker process: {}", err));
        }
        Err(_elapsed) => {
            tracing::warn!(?pid, "unit process exceeded its deadline, killing it");
            return fail_unit(&unit, "worker process exceeded its deadline");
        }
    };

    tracing::debug!(?pid, status = %output.status, "unit process exited");
    reconcile(&unit, parse_outcomes(&output.stdout), output.status)
}

/// Parses the child's stdout, skipping lines that are not outcomes
fn parse_outcomes(stdout: &[u8]) -> Vec<UnitOutcome> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<UnitOutcome>(line) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                tracing::warn!(line, error = %err, "ignoring malformed unit output");
                None
            }
        })
        .collect()
}

/// Matches reported outcomes to the unit's URLs, in unit order
fn reconcile(unit: &[String], mut reported: Vec<UnitOutcome>, status: ExitStatus) -> Vec<UnitOutcome> {
    unit.iter()
        .map(|url| match reported.iter().position(|o| &o.url == url) {
            Some(idx) => reported.remove(idx),
            None => UnitOutcome::failure(
                url,
                UnitError::Worker(format!(
                    "worker process exited ({}) before reporting",
                    status
                )),
            ),
        })
        .collect()
}
