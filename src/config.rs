use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;

use crate::biometrics::similarity::SimilarityTolerances;
use crate::verification::session::VerificationConfig;

/// Runtime configuration for the engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the external authentication service.
    pub service_base_url: String,
    /// Cap on the general capture buffer; oldest events are trimmed.
    pub general_buffer_cap: usize,
    /// Duration of the post-verification grace window.
    pub grace_window_secs: i64,
    pub log_level: String,
    pub verification: VerificationConfig,
    pub tolerances: SimilarityTolerances,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_base_url: "http://localhost:8080".to_string(),
            general_buffer_cap: 50,
            grace_window_secs: 60,
            log_level: "info".to_string(),
            verification: VerificationConfig::default(),
            tolerances: SimilarityTolerances::default(),
        }
    }
}

/// Load configuration: defaults, then an optional `KEY=VALUE` file named by
/// `CONFIG_FILE`, then environment variables on top.
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    if let Ok(path) = env::var("CONFIG_FILE") {
        load_from_file(&mut config, Path::new(&path))?;
        info!("Configuration loaded from {}", path);
    }

    load_from_env(&mut config);
    validate_config(&config)?;

    Ok(config)
}

fn load_from_env(config: &mut Config) {
    if let Ok(url) = env::var("SERVICE_BASE_URL") {
        config.service_base_url = url;
    }

    if let Ok(level) = env::var("LOG_LEVEL") {
        config.log_level = level;
    }

    if let Ok(cap) = env::var("MAX_KEYSTROKES") {
        if let Ok(cap) = cap.parse() {
            config.general_buffer_cap = cap;
        }
    }

    if let Ok(secs) = env::var("GRACE_WINDOW_SECS") {
        if let Ok(secs) = secs.parse() {
            config.grace_window_secs = secs;
        }
    }

    if let Ok(threshold) = env::var("ANOMALY_THRESHOLD") {
        if let Ok(threshold) = threshold.parse() {
            config.verification.anomaly_threshold = threshold;
        }
    }

    if let Ok(threshold) = env::var("SUSPICIOUS_THRESHOLD") {
        if let Ok(threshold) = threshold.parse() {
            config.verification.suspicious_threshold = threshold;
        }
    }

    if let Ok(pairs) = env::var("MIN_MATCHED_PAIRS") {
        if let Ok(pairs) = pairs.parse() {
            config.verification.min_matched_pairs = pairs;
        }
    }

    if let Ok(length) = env::var("MIN_PASSWORD_LENGTH") {
        if let Ok(length) = length.parse() {
            config.verification.min_password_length = length;
        }
    }

    if let Ok(ms) = env::var("DEBOUNCE_MS") {
        if let Ok(ms) = ms.parse() {
            config.verification.debounce_ms = ms;
        }
    }

    if let Ok(attempts) = env::var("OTP_MAX_ATTEMPTS") {
        if let Ok(attempts) = attempts.parse() {
            config.verification.otp.max_attempts = attempts;
        }
    }

    if let Ok(secs) = env::var("OTP_BLOCK_SECS") {
        if let Ok(secs) = secs.parse() {
            config.verification.otp.block_duration_secs = secs;
        }
    }

    if let Ok(secs) = env::var("OTP_RESEND_COOLDOWN_SECS") {
        if let Ok(secs) = secs.parse() {
            config.verification.otp.resend_cooldown_secs = secs;
        }
    }
}

/// Load configuration from a file
fn load_from_file(config: &mut Config, path: &Path) -> Result<()> {
    let file = File::open(path).context("Failed to open configuration file")?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line.context("Failed to read line from configuration file")?;
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Parse key-value pairs
        if let Some(index) = line.find('=') {
            let key = line[..index].trim();
            let value = line[index + 1..].trim();

            match key {
                "SERVICE_BASE_URL" => config.service_base_url = value.to_string(),
                "LOG_LEVEL" => config.log_level = value.to_string(),
                "MAX_KEYSTROKES" => {
                    if let Ok(cap) = value.parse() {
                        config.general_buffer_cap = cap;
                    }
                }
                "GRACE_WINDOW_SECS" => {
                    if let Ok(secs) = value.parse() {
                        config.grace_window_secs = secs;
                    }
                }
                "ANOMALY_THRESHOLD" => {
                    if let Ok(threshold) = value.parse() {
                        config.verification.anomaly_threshold = threshold;
                    }
                }
                "SUSPICIOUS_THRESHOLD" => {
                    if let Ok(threshold) = value.parse() {
                        config.verification.suspicious_threshold = threshold;
                    }
                }
                "MIN_MATCHED_PAIRS" => {
                    if let Ok(pairs) = value.parse() {
                        config.verification.min_matched_pairs = pairs;
                    }
                }
                "MIN_PASSWORD_LENGTH" => {
                    if let Ok(length) = value.parse() {
                        config.verification.min_password_length = length;
                    }
                }
                "DEBOUNCE_MS" => {
                    if let Ok(ms) = value.parse() {
                        config.verification.debounce_ms = ms;
                    }
                }
                "OTP_MAX_ATTEMPTS" => {
                    if let Ok(attempts) = value.parse() {
                        config.verification.otp.max_attempts = attempts;
                    }
                }
                "OTP_BLOCK_SECS" => {
                    if let Ok(secs) = value.parse() {
                        config.verification.otp.block_duration_secs = secs;
                    }
                }
                "OTP_RESEND_COOLDOWN_SECS" => {
                    if let Ok(secs) = value.parse() {
                        config.verification.otp.resend_cooldown_secs = secs;
                    }
                }
                _ => {}
            }
        }
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<()> {
    if !config.service_base_url.starts_with("http") {
        bail!("SERVICE_BASE_URL must be an http(s) URL");
    }

    for (name, value) in [
        ("ANOMALY_THRESHOLD", config.verification.anomaly_threshold),
        ("SUSPICIOUS_THRESHOLD", config.verification.suspicious_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            bail!("{} must be between 0 and 1", name);
        }
    }

    if config.verification.min_matched_pairs == 0 {
        bail!("MIN_MATCHED_PAIRS must be at least 1");
    }

    if config.verification.otp.max_attempts == 0 {
        bail!("OTP_MAX_ATTEMPTS must be at least 1");
    }

    Ok(())
}
