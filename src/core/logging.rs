//! Logging initialization
//!
//! Console + file output through simplelog. The level comes from `LOG_LEVEL`.

use anyhow::Result;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, TermLogger, TerminalMode, WriteLogger};
use std::fs::OpenOptions;

use crate::core::config::Config;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `level` - Maximum level written to both sinks
/// * `log_file_path` - Path to the log file (appended to, created if missing)
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to open the file or a logger was already set
pub fn init_logger(level: LevelFilter, log_file_path: &str) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", log_file_path, e))?;

    // Bot API chatter is noisy at debug level
    let config = ConfigBuilder::new()
        .add_filter_ignore_str("reqwest")
        .add_filter_ignore_str("hyper")
        .set_time_format_rfc3339()
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, config, log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective configuration at startup. The bot token is never printed.
pub fn log_configuration(config: &Config) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("🤖 Loyalty bot configuration");
    log::info!("   • Timezone: UTC{}", config.timezone);
    log::info!("   • Birthday bonus: {} points at {}", config.birthday_bonus, config.birthday_check_time);
    log::info!("   • Registration bonus: {} points", config.registration_bonus);
    log::info!("   • Purchase accrual: {}%", config.purchase_accrual_percent);
    log::info!("   • Log level: {}", config.log_level);
    log::info!("   • Admin ID: {}", config.admin_id);
    log::info!("   • Database: {}", config.database_path);
    match config.session_timeout {
        Some(timeout) => log::info!("   • Session timeout: {}s", timeout.as_secs()),
        None => log::info!("   • Session timeout: disabled"),
    }
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Flushes every sink. Called on shutdown before the process exits.
pub fn flush() {
    log::logger().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::NamedTempFile;

    #[test]
    fn test_init_logger_creates_log_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        // A second init in the same test binary fails, which is fine here
        let _ = init_logger(LevelFilter::Info, path);
        assert!(temp_file.path().exists());
    }
}
