use kubectl_actuator::status::ExitStatus;
use kubectl_actuator::{core, signals};
use std::sync::atomic::{AtomicBool, Ordering};

/// Entry point - catches Ctrl+C and calls core::run()
///
/// Returns ExitStatus directly, which implements std::process::Termination.
fn main() -> ExitStatus {
    // The first Ctrl+C cancels the run between pods so tunnels close cleanly
    ctrlc::set_handler(move || {
        signals::set_interrupted();
        eprintln!("\nInterrupted");

        static SECOND_CTRL_C: AtomicBool = AtomicBool::new(false);
        if SECOND_CTRL_C.swap(true, Ordering::SeqCst) {
            std::process::exit(ExitStatus::Interrupted as i32);
        }
    })
    .ok();

    let args: Vec<String> = std::env::args().collect();
    let status = core::run(args);

    if signals::was_interrupted() {
        return ExitStatus::Interrupted;
    }

    status
}
