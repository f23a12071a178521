use std::sync::Once;
use tracing::warn;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "info";

pub fn init_instrumentation() {
    INIT.call_once(|| {
        #[cfg(debug_assertions)]
        unsafe {
            backtrace_on_stack_overflow::enable();
        };

        // TOKIO_CONSOLE_BIND switches to the tokio-console subscriber
        if std::env::var("TOKIO_CONSOLE_BIND").is_ok() {
            console_subscriber::init();
            return;
        }

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true)
            .finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            warn!("Failed to set tracing subscriber: {}", err);
        }
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_instrumentation_runs_once() {
        init_instrumentation();
        init_instrumentation();
        assert!(INIT.is_completed());
    }
}
