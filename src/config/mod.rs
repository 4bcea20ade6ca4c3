mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config).with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./avcmux.toml",
        "~/.config/avcmux/config.toml",
        "/etc/avcmux/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    config
        .video
        .params()
        .validate()
        .context("Invalid [video] section")?;

    if config.output.encoder_name.is_empty() {
        anyhow::bail!("output.encoder_name cannot be empty");
    }
    if config.output.encoder_name.len() > 255 {
        tracing::warn!(
            "output.encoder_name is {} bytes long",
            config.output.encoder_name.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.video.width, 640);
        assert_eq!(config.video.height, 480);
        assert_eq!(config.video.frame_rate, 30);
        assert_eq!(config.output.encoder_name, "Lavf53.4.0");
        assert!(!config.output.keep_partial);
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = write_config("[video]\nwidth = 1920\nheight = 1080\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.video.width, 1920);
        assert_eq!(config.video.height, 1080);
        assert_eq!(config.video.frame_rate, 30);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_zero_frame_rate_is_rejected() {
        let file = write_config("[video]\nframe_rate = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("frame rate"));
    }

    #[test]
    fn test_empty_encoder_name_is_rejected() {
        let file = write_config("[output]\nencoder_name = \"\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let err = load_config_or_default(Some(Path::new("/nonexistent/avcmux.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_malformed_toml() {
        let file = write_config("[video\nwidth = ");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
