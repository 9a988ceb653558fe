//! Per-pod execution
//!
//! Runs one operation against every resolved pod in order. A failing pod is
//! reported inline and counted; the remaining pods still run.

use std::future::Future;
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{ActuatorError, Result};
use crate::k8s::ResolvedPodSet;

/// Run `op` once per pod and write each pod's output to `out`
///
/// With more than one pod, every section starts with a `<pod>:` header and
/// sections are separated by a blank line. `op` returns the text to print for
/// its pod. Cancellation is checked before each pod, never mid-request.
pub async fn run_for_each_pod<W, F, Fut>(
    out: &mut W,
    cancel: &CancellationToken,
    pods: &ResolvedPodSet,
    action: &str,
    mut op: F,
) -> Result<()>
where
    W: Write,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let size = pods.len();
    let mut failed = 0usize;

    for (i, pod) in pods.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(ActuatorError::Cancelled);
        }

        if size > 1 {
            writeln!(out, "{}:", pod)?;
        }

        match op(pod.clone()).await {
            Ok(output) => {
                out.write_all(output.as_bytes())?;
                if !output.is_empty() && !output.ends_with('\n') {
                    writeln!(out)?;
                }
            }
            Err(e) => {
                debug!(pod = %pod, error = %e, "Operation failed");
                writeln!(out, "Error: {}", e)?;
                failed += 1;
            }
        }

        if i != size - 1 {
            writeln!(out)?;
        }
        out.flush()?;
    }

    if failed > 0 {
        return Err(ActuatorError::PodsFailed {
            action: action.to_string(),
            count: failed,
        });
    }

    Ok(())
}
