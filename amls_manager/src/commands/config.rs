use amls_core::LoopConfig;
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;

/// Print the default loop config as TOML, or write it to `output`
pub fn execute_config(output: Option<&Path>) -> Result<()> {
    let text = LoopConfig::default()
        .to_toml_string()
        .context("failed to serialize default config")?;

    match output {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{} Wrote default loop config to {}",
                "✓".green(),
                path.display().to_string().cyan()
            );
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// Load and validate a config file, then describe the timing it sets up
pub fn execute_check(path: &Path) -> Result<()> {
    let config = load(path)?;

    println!("{} {} is valid", "✓".green(), path.display().to_string().cyan());
    print_config(&config);
    Ok(())
}

pub(crate) fn load(path: &Path) -> Result<LoopConfig> {
    LoopConfig::load(path).with_context(|| format!("invalid loop config {}", path.display()))
}

pub(crate) fn print_config(config: &LoopConfig) {
    println!(
        "  {:<22} {:.1} Hz ({} us)",
        "rate:".dimmed(),
        config.rate_hz(),
        config.nominal_period_us
    );
    println!(
        "  {:<22} {} us ({:.1}% slack)",
        "overrun threshold:".dimmed(),
        config.max_allowed_period_us,
        config.slack_percent()
    );
    println!(
        "  {:<22} {}",
        "fault after:".dimmed(),
        match config.overrun_strikes {
            1 => "first overrun".to_string(),
            n => format!("{} consecutive overruns", n),
        }
    );
    println!(
        "  {:<22} {:#04x} (budget {} us)",
        "sensor:".dimmed(),
        config.sensor_bus_address,
        config.sensor_read_budget_us
    );
    println!(
        "  {:<22} {} bytes per direction",
        "serial rings:".dimmed(),
        config.serial_buffer_capacity
    );
    println!(
        "  {:<22} {} us",
        "watchdog timeout:".dimmed(),
        config.watchdog_timeout_us
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_default_config_checks_clean() {
        let path = std::env::temp_dir().join(format!("amls-config-{}.toml", std::process::id()));
        execute_config(Some(&path)).unwrap();
        assert!(execute_check(&path).is_ok());
        assert_eq!(load(&path).unwrap(), LoopConfig::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn invalid_config_fails_check() {
        let path = std::env::temp_dir().join(format!("amls-bad-{}.toml", std::process::id()));
        fs::write(&path, "nominal_period_us = 25000\nmax_allowed_period_us = 20000\n").unwrap();
        assert!(execute_check(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
