//! Interrupt handling for graceful shutdown
//!
//! The Ctrl+C handler sets a process-wide flag and cancels the shutdown
//! token. Work in progress sees the token; the exit status sees the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

static SHUTDOWN: OnceLock<CancellationToken> = OnceLock::new();

/// Token cancelled on the first Ctrl+C
pub fn shutdown_token() -> CancellationToken {
    SHUTDOWN.get_or_init(CancellationToken::new).clone()
}

/// Check if the application was interrupted (Ctrl+C pressed)
#[inline]
pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Record the interrupt and cancel pending work (called from signal handler)
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
    shutdown_token().cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_cancels_token() {
        let token = shutdown_token();
        set_interrupted();
        assert!(was_interrupted());
        assert!(token.is_cancelled());
        assert!(shutdown_token().is_cancelled());
    }
}
