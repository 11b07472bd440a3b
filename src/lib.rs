pub mod appointment; // Appointment aggregate
pub mod atomic; // All-or-nothing step executor
pub mod config;
pub mod conflict; // Counselor double-booking detection
pub mod db;
pub mod error;
pub mod follow_up; // Follow-up chains
pub mod models;
pub mod notification;
pub mod retention;
pub mod scheduler;
pub mod time_range;
pub mod transition; // Status state machine

pub use error::{OperationError, SchedulingError};
pub use scheduler::Scheduler;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. Honors `RUST_LOG`, falling back
/// to `config::default_log_filter()`.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
        return;
    }

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
