use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::Options;
use crate::error::{ConfigError, ConfigResult as Result};

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub conversion: ConversionConfig,
    pub stylesheet: StylesheetConfig,
    pub external: ExternalConfig,
    pub wasm: WasmConfig,
}

/// File naming and batch behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversionConfig {
    /// Recognized document suffix, without the dot
    pub input_extension: String,
    /// Suffix given to produced files, without the dot
    pub output_extension: String,
    /// Exit non-zero when any file fails
    pub strict: bool,
}

/// Default stylesheet lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StylesheetConfig {
    /// File name searched for when --xslt is absent
    pub file_name: String,
    /// Extra package directories searched after the install location
    pub search_dirs: Vec<PathBuf>,
}

/// PowerShell runner for the external-toolkit engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ExternalConfig {
    /// Program to run; defaults to `powershell` on Windows and `pwsh` elsewhere
    pub program: Option<String>,
}

/// WebAssembly engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WasmConfig {
    /// Path to the libxml2/libxslt wasm module
    pub module: Option<PathBuf>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            input_extension: "xml".to_string(),
            output_extension: "md".to_string(),
            strict: false,
        }
    }
}

impl Default for StylesheetConfig {
    fn default() -> Self {
        Self {
            file_name: crate::stylesheet::DEFAULT_STYLESHEET.to_string(),
            search_dirs: vec![],
        }
    }
}

impl ExternalConfig {
    pub fn program(&self) -> String {
        self.program.clone().unwrap_or_else(|| {
            if cfg!(windows) {
                "powershell".to_string()
            } else {
                "pwsh".to_string()
            }
        })
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(options: &Options) -> Result<Config> {
        let mut config = match &options.config {
            Some(path) => Self::load_from_file(path).await?,
            None => Self::find_config_file().await?.unwrap_or_default(),
        };

        config = Self::apply_environment_overrides(config)?;
        config = Self::merge_with_cli(config, options);

        Self::validate_config(&config)?;
        log::debug!("effective configuration: {:?}", config);
        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = ["xml2md.toml", "xml2md.json", ".xml2md.toml", ".xml2md.json"];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.is_file() {
                log::debug!("using configuration file {}", path.display());
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("xml2md");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.is_file() {
                    log::debug!("using configuration file {}", path.display());
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(ext) = env.get("XML2MD_INPUT_EXTENSION") {
            config.conversion.input_extension = ext.trim().to_string();
        }

        if let Some(strict) = env.get("XML2MD_STRICT") {
            config.conversion.strict = strict.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML2MD_STRICT value: {}", strict))
            })?;
        }

        if let Some(name) = env.get("XML2MD_STYLESHEET") {
            config.stylesheet.file_name = name;
        }

        if let Some(dir) = env.get("XML2MD_STYLESHEET_DIR") {
            config.stylesheet.search_dirs.push(PathBuf::from(dir));
        }

        if let Some(program) = env.get("XML2MD_EXTERNAL_PROGRAM") {
            config.external.program = Some(program);
        }

        if let Some(module) = env.get("XML2MD_WASM_MODULE") {
            config.wasm.module = Some(PathBuf::from(module));
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, options: &Options) -> Config {
        if options.strict {
            config.conversion.strict = true;
        }
        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        for (field, ext) in [
            ("conversion.input_extension", &config.conversion.input_extension),
            ("conversion.output_extension", &config.conversion.output_extension),
        ] {
            if ext.is_empty() {
                return Err(ConfigError::Validation(format!("{} must not be empty", field)));
            }
            if ext.contains('/') || ext.contains('\\') || ext.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid file extension for {}: {}",
                    field, ext
                )));
            }
        }

        if config.stylesheet.file_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "stylesheet.file_name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct MapEnv(HashMap<&'static str, &'static str>);

    impl EnvProvider for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.conversion.input_extension, "xml");
        assert_eq!(config.conversion.output_extension, "md");
        assert_eq!(config.stylesheet.file_name, "xform-md.xslt");
        assert!(config.wasm.module.is_none());
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[test]
    fn test_environment_overrides() {
        let env = MapEnv(HashMap::from([
            ("XML2MD_STRICT", "true"),
            ("XML2MD_STYLESHEET", "custom.xslt"),
            ("XML2MD_STYLESHEET_DIR", "/opt/xml2md"),
            ("XML2MD_EXTERNAL_PROGRAM", "powershell.exe"),
            ("XML2MD_WASM_MODULE", "/opt/libxslt.wasm"),
        ]));

        let config =
            ConfigManager::apply_environment_overrides_with(&env, Config::default()).unwrap();
        assert!(config.conversion.strict);
        assert_eq!(config.stylesheet.file_name, "custom.xslt");
        assert_eq!(config.stylesheet.search_dirs, vec![PathBuf::from("/opt/xml2md")]);
        assert_eq!(config.external.program(), "powershell.exe");
        assert_eq!(config.wasm.module, Some(PathBuf::from("/opt/libxslt.wasm")));
    }

    #[test]
    fn test_invalid_environment_value() {
        let env = MapEnv(HashMap::from([("XML2MD_STRICT", "sometimes")]));
        let result = ConfigManager::apply_environment_overrides_with(&env, Config::default());
        assert!(matches!(result, Err(ConfigError::Environment(_))));
    }

    #[test]
    fn test_validation_rejects_dotted_extension() {
        let mut config = Config::default();
        config.conversion.input_extension = ".xml".to_string();
        assert!(matches!(
            ConfigManager::validate_config(&config),
            Err(ConfigError::Validation(_))
        ));

        let mut config = Config::default();
        config.stylesheet.file_name = "  ".to_string();
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_cli_strict_overrides() {
        let options = Options {
            strict: true,
            ..Options::default()
        };
        let config = ConfigManager::merge_with_cli(Config::default(), &options);
        assert!(config.conversion.strict);
    }

    #[tokio::test]
    async fn test_load_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("xml2md.toml");
        tokio::fs::write(
            &path,
            r#"
[conversion]
input_extension = "dita"

[stylesheet]
file_name = "dita-md.xslt"
search_dirs = ["/usr/share/xml2md"]
"#,
        )
        .await
        .unwrap();

        let config = ConfigManager::load_from_file(&path).await.unwrap();
        assert_eq!(config.conversion.input_extension, "dita");
        assert_eq!(config.conversion.output_extension, "md");
        assert_eq!(config.stylesheet.file_name, "dita-md.xslt");
        assert_eq!(
            config.stylesheet.search_dirs,
            vec![PathBuf::from("/usr/share/xml2md")]
        );
    }

    #[tokio::test]
    async fn test_load_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("xml2md.json");
        tokio::fs::write(&path, r#"{"external": {"program": "pwsh-preview"}}"#)
            .await
            .unwrap();

        let config = ConfigManager::load_from_file(&path).await.unwrap();
        assert_eq!(config.external.program(), "pwsh-preview");
        assert_eq!(config.conversion.input_extension, "xml");
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("xml2md.yaml");
        tokio::fs::write(&path, "conversion: {}").await.unwrap();

        let result = ConfigManager::load_from_file(&path).await;
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_missing_explicit_config_file() {
        let options = Options {
            config: Some(PathBuf::from("/nonexistent/xml2md.toml")),
            ..Options::default()
        };
        let result = ConfigManager::load_config(&options).await;
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
