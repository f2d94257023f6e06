//! Exit codes for novactl
//!
//! Only configuration errors and signals end the process early; everything
//! else is reported as an outcome and the session continues.

use nova_common::{PlanRun, PlanState};

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code when any step of a plan failed, was declined or was unknown
pub const EXIT_STEP_FAILED: i32 = 1;

/// Exit code when the configuration makes a session impossible
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Exit code after an interrupt signal (128 + SIGINT)
pub const EXIT_INTERRUPTED: i32 = 130;

/// Exit code for a batch of plans (single utterance or the demo)
pub fn exit_code_for<'a>(runs: impl IntoIterator<Item = &'a PlanRun>, interrupted: bool) -> i32 {
    if interrupted {
        return EXIT_INTERRUPTED;
    }

    let mut code = EXIT_SUCCESS;
    for run in runs {
        if run.state == PlanState::Aborted && run.outcomes.iter().all(|o| o.ok) {
            // A plan that stopped without a failing step was cancelled
            return EXIT_INTERRUPTED;
        }
        if !run.all_ok() {
            code = EXIT_STEP_FAILED;
        }
    }
    code
}
