//! Built-in smoke-test script for `--demo`

use crate::input::Input;
use crate::repl::Session;

pub const DEMO_SCRIPT: [&str; 4] = [
    "open notepad",
    "type: Hello from the demo",
    "take a screenshot",
    "write an article about automation",
];

/// Run the script; the exit code is 0 only if every step succeeded
pub async fn run(session: &mut Session, input: &mut Input) -> i32 {
    let display = session.display();
    display.info(&format!("Running demo ({} requests)", DEMO_SCRIPT.len()));

    let mut code = crate::errors::EXIT_SUCCESS;
    for utterance in DEMO_SCRIPT {
        if session.interrupted() {
            return crate::errors::EXIT_INTERRUPTED;
        }
        display.info(&format!("> {}", utterance));
        let step_code = session.run_batch(&[utterance], input).await;
        code = code.max(step_code);
    }
    code
}
