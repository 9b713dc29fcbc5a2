//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Azure identity values may also come from the environment, which takes
//! precedence over the file.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable for the Entra ID tenant.
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Environment variable for the service principal's client ID.
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Environment variable for the service principal's client secret.
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
/// Environment variable for the Azure subscription.
pub const ENV_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
/// Environment variable for the resource group holding the APIM instance.
pub const ENV_RESOURCE_GROUP: &str = "AZURE_RESOURCE_GROUP_NAME";
/// Environment variable for the APIM service name.
pub const ENV_SERVICE_NAME: &str = "AZURE_APIM_SERVICE_NAME";

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Azure connection settings.
    #[serde(default)]
    pub azure: AzureConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// Only shape is checked here. Presence of the identity values is checked
    /// by [`AzureConfig::resolve`], since `--offline` runs do not need them.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("management_endpoint", &self.azure.management_endpoint),
            ("authority_host", &self.azure.authority_host),
        ] {
            let url = reqwest::Url::parse(value).map_err(|e| ConfigError::ValidationError {
                message: format!("azure.{field} is not a valid URL: {e}"),
            })?;
            if !matches!(url.scheme(), "https" | "http") {
                return Err(ConfigError::ValidationError {
                    message: format!("azure.{field} must use http or https"),
                });
            }
        }

        if !is_api_version(&self.azure.api_version) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid ARM api_version '{}'. Expected YYYY-MM-DD with optional -preview suffix",
                    self.azure.api_version
                ),
            });
        }

        if self.azure.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "azure.poll_interval_secs must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

fn is_api_version(value: &str) -> bool {
    let Some(date) = value.get(..10) else {
        return false;
    };
    let suffix = &value[10..];
    let date_ok = date.char_indices().all(|(i, c)| match i {
        4 | 7 => c == '-',
        _ => c.is_ascii_digit(),
    });
    date_ok && (suffix.is_empty() || suffix == "-preview")
}

/// Azure connection settings as written in the config file.
///
/// Identity fields are optional here; environment variables fill or
/// override them before [`AzureConfig::resolve`] checks presence.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureConfig {
    /// Entra ID tenant.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Service principal client ID.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Service principal client secret.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Azure subscription containing the APIM instance.
    #[serde(default)]
    pub subscription_id: Option<String>,

    /// Resource group containing the APIM instance.
    #[serde(default)]
    pub resource_group: Option<String>,

    /// APIM service name.
    #[serde(default)]
    pub service_name: Option<String>,

    /// Azure Resource Manager endpoint.
    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,

    /// Entra ID authority host used for token requests.
    #[serde(default = "default_authority_host")]
    pub authority_host: String,

    /// `Microsoft.ApiManagement` REST API version.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Fallback interval between long-running operation polls when Azure
    /// sends no `Retry-After` header.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            subscription_id: None,
            resource_group: None,
            service_name: None,
            management_endpoint: default_management_endpoint(),
            authority_host: default_authority_host(),
            api_version: default_api_version(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("service_name", &self.service_name)
            .field("management_endpoint", &self.management_endpoint)
            .field("authority_host", &self.authority_host)
            .field("api_version", &self.api_version)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .finish()
    }
}

impl AzureConfig {
    /// Overrides identity fields with values from the environment.
    ///
    /// `lookup` is called with each variable name; `std::env::var(..).ok()`
    /// in production. Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets = [
            (ENV_TENANT_ID, &mut self.tenant_id),
            (ENV_CLIENT_ID, &mut self.client_id),
            (ENV_CLIENT_SECRET, &mut self.client_secret),
            (ENV_SUBSCRIPTION_ID, &mut self.subscription_id),
            (ENV_RESOURCE_GROUP, &mut self.resource_group),
            (ENV_SERVICE_NAME, &mut self.service_name),
        ];

        for (var, slot) in targets {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value);
            }
        }
    }

    /// Checks that every identity value is present and returns the settings
    /// needed to build a live Azure client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSetting`] for the first absent value.
    pub fn resolve(&self) -> Result<AzureSettings, ConfigError> {
        fn require(
            value: Option<&String>,
            setting: &'static str,
            env_var: &'static str,
        ) -> Result<String, ConfigError> {
            value
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or(ConfigError::MissingSetting { setting, env_var })
        }

        Ok(AzureSettings {
            tenant_id: require(self.tenant_id.as_ref(), "tenant_id", ENV_TENANT_ID)?,
            client_id: require(self.client_id.as_ref(), "client_id", ENV_CLIENT_ID)?,
            client_secret: require(
                self.client_secret.as_ref(),
                "client_secret",
                ENV_CLIENT_SECRET,
            )?,
            subscription_id: require(
                self.subscription_id.as_ref(),
                "subscription_id",
                ENV_SUBSCRIPTION_ID,
            )?,
            resource_group: require(
                self.resource_group.as_ref(),
                "resource_group",
                ENV_RESOURCE_GROUP,
            )?,
            service_name: require(self.service_name.as_ref(), "service_name", ENV_SERVICE_NAME)?,
            management_endpoint: self.management_endpoint.trim_end_matches('/').to_string(),
            authority_host: self.authority_host.trim_end_matches('/').to_string(),
            api_version: self.api_version.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        })
    }
}

/// Fully resolved Azure settings; every identity value is present.
#[derive(Clone)]
pub struct AzureSettings {
    /// Entra ID tenant.
    pub tenant_id: String,
    /// Service principal client ID.
    pub client_id: String,
    /// Service principal client secret.
    pub client_secret: String,
    /// Azure subscription.
    pub subscription_id: String,
    /// Resource group.
    pub resource_group: String,
    /// APIM service name.
    pub service_name: String,
    /// ARM endpoint without trailing slash.
    pub management_endpoint: String,
    /// Authority host without trailing slash.
    pub authority_host: String,
    /// ARM API version.
    pub api_version: String,
    /// Fallback long-running operation poll interval.
    pub poll_interval: Duration,
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("service_name", &self.service_name)
            .field("management_endpoint", &self.management_endpoint)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

fn default_management_endpoint() -> String {
    "https://management.azure.com".to_string()
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_api_version() -> String {
    "2022-08-01".to_string()
}

const fn default_poll_interval_secs() -> u64 {
    2
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
