//! Rollout status parsing.
//!
//! `oc rollout status` speaks in prose. This is the only place that prose
//! is inspected; everything past this boundary sees the structured
//! [`RolloutStatus`] enum.

use provision::RolloutStatus;

/// Markers `oc` prints for a finished rollout.
const SUCCESS_MARKER: &str = "successfully rolled out";

/// Markers for a rollout the platform has given up on.
const FAILURE_MARKERS: &[&str] = &[
    "exceeded its progress deadline",
    "progress deadline exceeded",
    "has failed progressing",
];

/// Parse `oc rollout status` output (stdout + stderr) into a status.
///
/// Anything that is neither confirmed success nor a recognized hard
/// failure is treated as still progressing and left to the retry policy.
#[must_use]
pub fn parse_rollout_status(output: &str) -> RolloutStatus {
    let lower = output.to_lowercase();

    if lower.contains(SUCCESS_MARKER) {
        return RolloutStatus::Complete;
    }

    for marker in FAILURE_MARKERS {
        if lower.contains(marker) {
            let reason = output
                .lines()
                .find(|line| line.to_lowercase().contains(marker))
                .unwrap_or(output)
                .trim()
                .to_string();
            return RolloutStatus::Failed { reason };
        }
    }

    RolloutStatus::Progressing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_marker_is_complete() {
        let status =
            parse_rollout_status("deployment \"app\" successfully rolled out");
        assert_eq!(status, RolloutStatus::Complete);
    }

    #[test]
    fn test_waiting_output_is_progressing() {
        let status = parse_rollout_status(
            "Waiting for deployment \"app\" rollout to finish: 1 of 2 updated replicas are available...",
        );
        assert_eq!(status, RolloutStatus::Progressing);
    }

    #[test]
    fn test_progress_deadline_is_failed_with_reason() {
        let status = parse_rollout_status(
            "error: deployment \"app\" exceeded its progress deadline",
        );
        match status {
            RolloutStatus::Failed { reason } => {
                assert!(reason.contains("exceeded its progress deadline"));
            }
            other => panic!("unexpected status: {other}"),
        }
    }

    #[test]
    fn test_mixed_output_prefers_success() {
        let status = parse_rollout_status(
            "Waiting for deployment \"app\" rollout to finish: 1 old replicas are pending termination...\n\
             deployment \"app\" successfully rolled out",
        );
        assert_eq!(status, RolloutStatus::Complete);
    }

    #[test]
    fn test_empty_output_is_progressing() {
        assert_eq!(parse_rollout_status(""), RolloutStatus::Progressing);
    }
}
