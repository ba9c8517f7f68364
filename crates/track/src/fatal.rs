//! Fail-stop signalling. Library code reports unrecoverable conditions
//! through a [`FatalHook`]; only the hook decides whether the process dies.

use std::sync::Arc;

use thiserror::Error;
use tracing::error;

/// Exit status used for every fatal condition.
pub const FATAL_EXIT_CODE: i32 = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("AIS bus not configured")]
    BusNotConfigured,

    #[error("Failed to start AIS bus: {0}")]
    BusStart(String),

    #[error("Failed to initialize target store: {0}")]
    StoreInit(String),

    #[error("Uncaught panic: {0}")]
    Panic(String),
}

impl FatalError {
    pub fn exit_code(&self) -> i32 {
        FATAL_EXIT_CODE
    }
}

pub type FatalHook = Arc<dyn Fn(FatalError) + Send + Sync>;

/// Log the error and terminate the process with [`FATAL_EXIT_CODE`].
pub fn exit_on_fatal() -> FatalHook {
    Arc::new(|fatal: FatalError| {
        error!(error = %fatal, code = fatal.exit_code(), "Fatal error, exiting");
        std::process::exit(fatal.exit_code());
    })
}

/// Log the error and carry on. Default for embedded use.
pub fn log_fatal() -> FatalHook {
    Arc::new(|fatal: FatalError| {
        error!(error = %fatal, "Fatal error reported");
    })
}

/// Route panics on any thread through `hook` after the default panic output.
pub fn install_panic_hook(hook: FatalHook) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let message = match info.location() {
            Some(loc) => format!("{message} at {}:{}", loc.file(), loc.line()),
            None => message,
        };
        hook(FatalError::Panic(message));
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_every_fatal_error_exits_255() {
        let errors = [
            FatalError::BusNotConfigured,
            FatalError::BusStart("refused".into()),
            FatalError::StoreInit("disk full".into()),
            FatalError::Panic("boom".into()),
        ];
        assert!(errors.iter().all(|e| e.exit_code() == 255));
    }

    #[test]
    fn test_recording_hook_sees_error() {
        let seen = Arc::new(Mutex::new(Vec::<FatalError>::new()));
        let hook: FatalHook = {
            let seen = seen.clone();
            Arc::new(move |e: FatalError| seen.lock().unwrap().push(e))
        };
        hook(FatalError::BusStart("refused".into()));
        log_fatal()(FatalError::BusNotConfigured);
        assert_eq!(*seen.lock().unwrap(), vec![FatalError::BusStart("refused".into())]);
    }
}
