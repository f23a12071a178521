use getset::{CopyGetters, Getters};
use portico_api::constants::DEFAULT_CONTROLLER_NAME;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Process configuration, built once at startup and shared by the controllers.
#[derive(Debug, Clone, TypedBuilder, Getters, CopyGetters, PartialEq, Eq)]
pub struct Options {
    #[getset(get = "pub")]
    #[builder(default = DEFAULT_CONTROLLER_NAME.to_string(), setter(into))]
    controller_name: String,

    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(60))]
    converged_requeue_interval: Duration,

    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(5))]
    waiting_requeue_interval: Duration,

    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(1))]
    error_backoff_base: Duration,

    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(300))]
    error_backoff_cap: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Options {
    /// Exponential backoff for a Gateway that has failed `attempts` times in a row.
    pub fn error_backoff(&self, attempts: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempts);
        self.error_backoff_base
            .saturating_mul(factor)
            .min(self.error_backoff_cap)
    }
}
