use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::system::config::LogConfig;

/// Installs the global subscriber. `RUST_LOG` wins over the configured level;
/// with a `file_path` set, output is appended to that file instead of stderr.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_init_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig {
            level: "debug".to_string(),
            file_path: Some(dir.path().join("app.log").to_string_lossy().to_string()),
        };

        // Only one global subscriber may exist per process.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
        assert!(dir.path().join("app.log").exists());
    }
}
