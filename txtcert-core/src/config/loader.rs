//! Configuration loader

use crate::config::{AppConfig, CaEndpoint};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Values supplied on the command line or through the environment.
///
/// Every field left as `None` keeps whatever the config file (or the
/// defaults) provided.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub cloudflare_token: Option<String>,
    pub email: Option<String>,
    /// Comma separated domain list
    pub domains: Option<String>,
    pub ca_preset: Option<String>,
    pub directory_url: Option<String>,
    pub eab_key_id: Option<String>,
    pub eab_hmac_key: Option<String>,
    pub staging: bool,
    pub config_dir: Option<PathBuf>,
    pub cert_dir: Option<PathBuf>,
    pub account_dir: Option<PathBuf>,
}

/// Configuration loader for various formats
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "json" => Self::from_json(&content),
            "toml" => Self::from_toml(&content),
            _ => Err(Error::Config(format!("Unknown config format: {}", ext))),
        }
    }

    /// Parse JSON configuration
    pub fn from_json(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid JSON: {}", e)))
    }

    /// Parse TOML configuration
    pub fn from_toml(content: &str) -> Result<AppConfig> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Resolve the final configuration: file (if any), then overrides, then validation.
    pub fn resolve(overrides: ConfigOverrides) -> Result<AppConfig> {
        let config = match &overrides.config_file {
            Some(path) => {
                tracing::info!("📄 Loading configuration from {}", path.display());
                Self::load(path)?
            }
            None => AppConfig::default(),
        };

        let config = Self::apply(config, overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides on top of a loaded configuration
    pub fn apply(mut config: AppConfig, overrides: ConfigOverrides) -> Result<AppConfig> {
        if let Some(token) = non_blank(overrides.cloudflare_token) {
            config.cloudflare_token = token;
        }
        if let Some(email) = non_blank(overrides.email) {
            config.email = email;
        }
        if let Some(domains) = non_blank(overrides.domains) {
            config.domains = parse_domains(&domains);
        }

        if overrides.staging {
            config.ca = CaEndpoint::lets_encrypt_staging();
        } else if let Some(name) = non_blank(overrides.ca_preset) {
            config.ca = CaEndpoint::preset(&name)
                .ok_or_else(|| Error::Config(format!("Unknown CA preset: {}", name)))?;
        }
        if let Some(url) = non_blank(overrides.directory_url) {
            config.ca = CaEndpoint {
                directory_url: url,
                ..CaEndpoint::custom("")
            };
        }

        match (non_blank(overrides.eab_key_id), non_blank(overrides.eab_hmac_key)) {
            (Some(kid), Some(hmac)) => config.ca = config.ca.with_eab(kid, hmac),
            (None, None) => {}
            _ => {
                return Err(Error::Config(
                    "External account binding needs both a key id and an HMAC key".to_string(),
                ));
            }
        }

        if let Some(dir) = overrides.config_dir {
            config.paths.config_dir = dir;
        }
        if let Some(dir) = overrides.cert_dir {
            config.paths.cert_dir = dir;
        }
        if let Some(dir) = overrides.account_dir {
            config.paths.account_dir = dir;
        }

        Ok(config)
    }
}

impl AppConfig {
    /// ✅ Check that every required input is present
    pub fn validate(&self) -> Result<()> {
        if self.cloudflare_token.trim().is_empty() {
            return Err(Error::Config("Missing CLOUDFLARE_KEY".to_string()));
        }
        if self.email.trim().is_empty() {
            return Err(Error::Config("Missing ACME_MAIL".to_string()));
        }
        if self.domains.is_empty() {
            return Err(Error::Config("Missing DOMAINS".to_string()));
        }
        if self.ca.directory_url.trim().is_empty() {
            return Err(Error::Config("Missing ACME directory URL".to_string()));
        }
        if self.ca.eab_required && self.ca.eab.is_none() {
            return Err(Error::Config(format!(
                "CA '{}' requires external account binding credentials",
                self.ca.name
            )));
        }
        if self.schedule.attempts_per_domain == 0 {
            return Err(Error::Config("attempts_per_domain must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Split a comma separated domain list, dropping blanks and duplicates.
pub fn parse_domains(raw: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for domain in raw.split(',').map(|d| d.trim().to_ascii_lowercase()) {
        if !domain.is_empty() && !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    domains
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn required() -> ConfigOverrides {
        ConfigOverrides {
            cloudflare_token: Some("token".to_string()),
            email: Some("ops@example.com".to_string()),
            domains: Some("example.com, *.example.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_domains() {
        assert_eq!(
            parse_domains(" example.com,*.Example.com,, example.com "),
            vec!["example.com".to_string(), "*.example.com".to_string()]
        );
        assert!(parse_domains(" , ").is_empty());
    }

    #[test]
    fn test_toml_loading() {
        let toml = r#"
            email = "ops@example.com"
            cloudflare_token = "cf"
            domains = ["example.com"]

            [schedule]
            check_interval_secs = 120
        "#;
        let config = ConfigLoader::from_toml(toml).unwrap();
        assert_eq!(config.schedule.check_interval_secs, 120);
        assert_eq!(config.schedule.attempts_per_domain, 3);
        assert_eq!(config.ca, CaEndpoint::lets_encrypt());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_loading() {
        let json = r#"{"domains": ["a.example.com"], "propagation": {"max_polls": 5}}"#;
        let config = ConfigLoader::from_json(json).unwrap();
        assert_eq!(config.domains, vec!["a.example.com".to_string()]);
        assert_eq!(config.propagation.max_polls, 5);
        assert_eq!(config.propagation.poll_interval_secs, 10);
    }

    #[test]
    fn test_unknown_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "email: x").unwrap();
        assert!(matches!(ConfigLoader::load(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "email = \"file@example.com\"\ndomains = [\"file.example.com\"]").unwrap();

        let config = ConfigLoader::resolve(ConfigOverrides {
            config_file: Some(file.path().to_path_buf()),
            ..required()
        })
        .unwrap();

        assert_eq!(config.email, "ops@example.com");
        assert_eq!(config.domains.len(), 2);
    }

    #[test]
    fn test_missing_inputs_are_config_errors() {
        let missing_token = ConfigOverrides {
            cloudflare_token: None,
            ..required()
        };
        let err = ConfigLoader::resolve(missing_token).unwrap_err();
        assert!(err.to_string().contains("CLOUDFLARE_KEY"));

        let missing_domains = ConfigOverrides {
            domains: Some(" ".to_string()),
            ..required()
        };
        assert!(ConfigLoader::resolve(missing_domains).is_err());
    }

    #[test]
    fn test_staging_and_custom_directory() {
        let config = ConfigLoader::resolve(ConfigOverrides {
            staging: true,
            ..required()
        })
        .unwrap();
        assert_eq!(config.ca, CaEndpoint::lets_encrypt_staging());

        let config = ConfigLoader::resolve(ConfigOverrides {
            directory_url: Some("https://ca.internal/directory".to_string()),
            ..required()
        })
        .unwrap();
        assert_eq!(config.ca.directory_url, "https://ca.internal/directory");
        assert_eq!(config.ca.name, "custom");
    }

    #[test]
    fn test_eab_requirements() {
        let err = ConfigLoader::resolve(ConfigOverrides {
            ca_preset: Some("zerossl".to_string()),
            ..required()
        })
        .unwrap_err();
        assert!(err.to_string().contains("external account binding"));

        let config = ConfigLoader::resolve(ConfigOverrides {
            ca_preset: Some("zerossl".to_string()),
            eab_key_id: Some("kid".to_string()),
            eab_hmac_key: Some("aG1hYw".to_string()),
            ..required()
        })
        .unwrap();
        assert_eq!(config.ca.eab.unwrap().key_id, "kid");

        let half = ConfigOverrides {
            eab_key_id: Some("kid".to_string()),
            ..required()
        };
        assert!(ConfigLoader::resolve(half).is_err());
    }
}
