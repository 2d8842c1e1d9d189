use crate::config::generate::generate_starter_config;
use crate::config::parse::load_config;
use crate::config::{user_config_path, SYSTEM_CONFIG_PATH};
use std::fs;
use std::path::{Path, PathBuf};

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    write_config(&generate_starter_config(), stdout)
}

fn write_config(config_content: &str, stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Try to write to ~/.config/spike/config.yml first
    let config_path = user_config_path()
        .filter(|user_config| match user_config.parent() {
            Some(parent) => match fs::create_dir_all(parent) {
                Ok(_) => true,
                Err(_) => {
                    eprintln!("Warning: Could not create directory {}", parent.display());
                    eprintln!("Falling back to {}", SYSTEM_CONFIG_PATH);
                    false
                }
            },
            None => false,
        })
        .unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG_PATH));

    if config_path.exists() {
        eprintln!(
            "Error: Config file already exists at {}",
            config_path.display()
        );
        eprintln!("Remove it first or use --stdout to print the config");
        std::process::exit(1);
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}

/// Load the config, report every problem, and print what a run would do.
pub fn validate(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = crate::cli::require_config(config_path);
    let summary = describe(&config_path)?;
    println!("{}", summary);
    Ok(())
}

fn describe(config_path: &Path) -> Result<String, crate::config::ConfigError> {
    let config = load_config(config_path)?;

    let mut lines = vec![
        format!("Config {} is valid", config_path.display()),
        format!("  source:   {}", config.collector.spec),
        format!("  upstream: {}", config.upstream.base_url),
        format!(
            "  sink:     {} into {}",
            config.sink.policy,
            config.sink.output_directory.display()
        ),
    ];
    if let Some(archive) = &config.archive {
        lines.push(format!(
            "  archive:  {} -> bucket {}",
            archive.source_directory.display(),
            archive.bucket
        ));
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_describe_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
source:
  mode: partitioned-stream
  partition: 1
  api_version: v2
credentials:
  bearer_token: secret
sink:
  mode: by-interval
  rotation_interval: 15m
  file_prefix: covid
  output_directory: /data/covid
"#
        )
        .unwrap();

        let summary = describe(file.path()).unwrap();
        assert!(summary.contains("partitioned-stream (partition 1)"));
        assert!(summary.contains("every 15m into /data/covid"));
    }

    #[test]
    fn test_describe_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "source:\n  mode: paginated-poll\nsink:\n  mode: by-count\n").unwrap();
        assert!(describe(file.path()).is_err());
    }
}
