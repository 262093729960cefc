use env_logger::{Builder, Env};
use log::info;
use std::io::Write;
use std::sync::Once;

use chrono::Local;

static INIT: Once = Once::new();

/// Initialize the logging system
pub fn init_logger() {
    INIT.call_once(|| {
        // Get log level from environment
        let env = Env::default().filter_or("LOG_LEVEL", "info");

        Builder::from_env(env)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] - {}: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .init();

        info!("Logging initialized (level: {})", get_log_level());
    });
}

/// Get the current log level
fn get_log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}
