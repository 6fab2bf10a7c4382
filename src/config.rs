use crate::{
    services::blob_service::{DEFAULT_PAGE_SIZE, DEFAULT_STORE_TIMEOUT, Edition, ServiceOptions},
    store::StoreSettings,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::{env, fmt, num::NonZeroU32, str::FromStr, time::Duration};

const DEFAULT_UPLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

/// How the service authenticates against blob storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    /// Shared-key connection string copied from the portal.
    ConnectionString,
    /// Environment, workload identity, managed identity, or CLI login.
    DefaultCredential,
    /// App registration: tenant id, client id, and client secret.
    ClientSecret,
    /// In-process store, nothing persisted.
    Memory,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub auth: AuthMode,
    pub connection_string: Option<String>,
    pub account_url: Option<String>,
    pub container: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub page_size: NonZeroU32,
    pub store_timeout: Duration,
    pub edition: Edition,
    pub upload_limit_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Browse files in a blob storage container")]
pub struct Args {
    /// Host to bind to (overrides BLOB_BROWSER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BLOB_BROWSER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Authentication mode (overrides BLOB_BROWSER_AUTH)
    #[arg(long, value_enum)]
    pub auth: Option<AuthMode>,

    /// Storage connection string (overrides BLOB_BROWSER_CONNECTION_STRING)
    #[arg(long)]
    pub connection_string: Option<String>,

    /// Storage account URL, e.g. https://NAME.blob.core.windows.net
    /// (overrides BLOB_BROWSER_ACCOUNT_URL)
    #[arg(long)]
    pub account_url: Option<String>,

    /// Container name (overrides BLOB_BROWSER_CONTAINER)
    #[arg(long)]
    pub container: Option<String>,

    /// Tenant id for client-secret auth (overrides BLOB_BROWSER_TENANT_ID)
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// Client id for client-secret auth (overrides BLOB_BROWSER_CLIENT_ID)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Client secret for client-secret auth (overrides BLOB_BROWSER_CLIENT_SECRET)
    #[arg(long)]
    pub client_secret: Option<String>,

    /// Listing entries per store request (overrides BLOB_BROWSER_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<NonZeroU32>,

    /// Timeout applied to every store call (overrides BLOB_BROWSER_STORE_TIMEOUT_SECS)
    #[arg(long)]
    pub store_timeout_secs: Option<u64>,

    /// Feature set to expose (overrides BLOB_BROWSER_EDITION)
    #[arg(long, value_enum)]
    pub edition: Option<Edition>,

    /// Maximum accepted upload request size (overrides BLOB_BROWSER_UPLOAD_LIMIT_BYTES)
    #[arg(long)]
    pub upload_limit_bytes: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name| env::var(name))
    }

    /// Merge CLI args over environment values over defaults. `lookup` stands
    /// in for `std::env::var`.
    pub fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let var = |name: &str| -> Result<Option<String>> {
            match lookup(name) {
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {name}")),
            }
        };

        // --- Environment fallback ---
        let env_auth = match var("BLOB_BROWSER_AUTH")? {
            Some(value) => Some(
                <AuthMode as ValueEnum>::from_str(&value, true)
                    .map_err(|err| anyhow!("parsing BLOB_BROWSER_AUTH value `{value}`: {err}"))?,
            ),
            None => None,
        };
        let env_edition = match var("BLOB_BROWSER_EDITION")? {
            Some(value) => Some(
                <Edition as ValueEnum>::from_str(&value, true).map_err(|err| {
                    anyhow!("parsing BLOB_BROWSER_EDITION value `{value}`: {err}")
                })?,
            ),
            None => None,
        };
        let env_port = parse_var::<u16>("BLOB_BROWSER_PORT", var("BLOB_BROWSER_PORT")?)?;
        let env_page_size =
            parse_var::<NonZeroU32>("BLOB_BROWSER_PAGE_SIZE", var("BLOB_BROWSER_PAGE_SIZE")?)?;
        let env_timeout = parse_var::<u64>(
            "BLOB_BROWSER_STORE_TIMEOUT_SECS",
            var("BLOB_BROWSER_STORE_TIMEOUT_SECS")?,
        )?;
        let env_upload_limit = parse_var::<usize>(
            "BLOB_BROWSER_UPLOAD_LIMIT_BYTES",
            var("BLOB_BROWSER_UPLOAD_LIMIT_BYTES")?,
        )?;

        // --- Merge ---
        Ok(Self {
            host: args
                .host
                .or(var("BLOB_BROWSER_HOST")?)
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.or(env_port).unwrap_or(3000),
            auth: args
                .auth
                .or(env_auth)
                .unwrap_or(AuthMode::ConnectionString),
            connection_string: args
                .connection_string
                .or(var("BLOB_BROWSER_CONNECTION_STRING")?),
            account_url: args.account_url.or(var("BLOB_BROWSER_ACCOUNT_URL")?),
            container: args.container.or(var("BLOB_BROWSER_CONTAINER")?),
            tenant_id: args.tenant_id.or(var("BLOB_BROWSER_TENANT_ID")?),
            client_id: args.client_id.or(var("BLOB_BROWSER_CLIENT_ID")?),
            client_secret: args.client_secret.or(var("BLOB_BROWSER_CLIENT_SECRET")?),
            page_size: args
                .page_size
                .or(env_page_size)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            store_timeout: args
                .store_timeout_secs
                .or(env_timeout)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_STORE_TIMEOUT),
            edition: args.edition.or(env_edition).unwrap_or_default(),
            upload_limit_bytes: args
                .upload_limit_bytes
                .or(env_upload_limit)
                .unwrap_or(DEFAULT_UPLOAD_LIMIT_BYTES),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            page_size: self.page_size,
            store_timeout: self.store_timeout,
            edition: self.edition,
        }
    }

    /// Validate the settings the chosen auth mode needs.
    pub fn store_settings(&self) -> Result<StoreSettings> {
        let settings = match self.auth {
            AuthMode::ConnectionString => StoreSettings::ConnectionString {
                connection_string: required(
                    &self.connection_string,
                    "BLOB_BROWSER_CONNECTION_STRING",
                )?,
                container: required(&self.container, "BLOB_BROWSER_CONTAINER")?,
            },
            AuthMode::DefaultCredential => StoreSettings::DefaultCredential {
                account_url: required(&self.account_url, "BLOB_BROWSER_ACCOUNT_URL")?,
                container: required(&self.container, "BLOB_BROWSER_CONTAINER")?,
            },
            AuthMode::ClientSecret => StoreSettings::ClientSecret {
                account_url: required(&self.account_url, "BLOB_BROWSER_ACCOUNT_URL")?,
                container: required(&self.container, "BLOB_BROWSER_CONTAINER")?,
                tenant_id: required(&self.tenant_id, "BLOB_BROWSER_TENANT_ID")?,
                client_id: required(&self.client_id, "BLOB_BROWSER_CLIENT_ID")?,
                client_secret: required(&self.client_secret, "BLOB_BROWSER_CLIENT_SECRET")?,
            },
            AuthMode::Memory => StoreSettings::Memory,
        };
        Ok(settings)
    }
}

// Secrets stay out of startup logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth", &self.auth)
            .field("connection_string", &redacted(&self.connection_string))
            .field("account_url", &self.account_url)
            .field("container", &self.container)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("page_size", &self.page_size)
            .field("store_timeout", &self.store_timeout)
            .field("edition", &self.edition)
            .field("upload_limit_bytes", &self.upload_limit_bytes)
            .finish()
    }
}

fn parse_var<T>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("parsing {name} value `{value}`"))
        })
        .transpose()
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_ref()
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| anyhow!("{name} is not set"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn merge_with(args: Args, vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::merge(args, |name| {
            vars.get(name).cloned().ok_or(env::VarError::NotPresent)
        })
    }

    #[test]
    fn defaults_apply_without_input() {
        let cfg = merge_with(Args::default(), &[]).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.auth, AuthMode::ConnectionString);
        assert_eq!(cfg.page_size.get(), 10);
        assert_eq!(cfg.store_timeout, Duration::from_secs(30));
        assert_eq!(cfg.edition, Edition::Full);
    }

    #[test]
    fn args_override_environment() {
        let args = Args {
            port: Some(8080),
            auth: Some(AuthMode::Memory),
            ..Args::default()
        };
        let cfg = merge_with(
            args,
            &[
                ("BLOB_BROWSER_PORT", "9000"),
                ("BLOB_BROWSER_AUTH", "client-secret"),
                ("BLOB_BROWSER_EDITION", "lite"),
                ("BLOB_BROWSER_PAGE_SIZE", "25"),
            ],
        )
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.auth, AuthMode::Memory);
        assert_eq!(cfg.edition, Edition::Lite);
        assert_eq!(cfg.page_size.get(), 25);
    }

    #[test]
    fn invalid_numbers_are_reported_by_name() {
        let err = merge_with(Args::default(), &[("BLOB_BROWSER_PAGE_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("BLOB_BROWSER_PAGE_SIZE"));

        let err = merge_with(Args::default(), &[("BLOB_BROWSER_AUTH", "token")]).unwrap_err();
        assert!(err.to_string().contains("BLOB_BROWSER_AUTH"));
    }

    #[test]
    fn missing_settings_name_the_variable() {
        let cfg = merge_with(
            Args::default(),
            &[("BLOB_BROWSER_AUTH", "client-secret")],
        )
        .unwrap();
        let err = cfg.store_settings().err().unwrap();
        assert_eq!(err.to_string(), "BLOB_BROWSER_ACCOUNT_URL is not set");
    }

    #[test]
    fn client_secret_settings_are_complete() {
        let cfg = merge_with(
            Args::default(),
            &[
                ("BLOB_BROWSER_AUTH", "client-secret"),
                ("BLOB_BROWSER_ACCOUNT_URL", "https://acct.blob.core.windows.net"),
                ("BLOB_BROWSER_CONTAINER", "files"),
                ("BLOB_BROWSER_TENANT_ID", "tenant"),
                ("BLOB_BROWSER_CLIENT_ID", "client"),
                ("BLOB_BROWSER_CLIENT_SECRET", "secret"),
            ],
        )
        .unwrap();
        assert!(matches!(
            cfg.store_settings().unwrap(),
            StoreSettings::ClientSecret { container, .. } if container == "files"
        ));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = merge_with(
            Args::default(),
            &[
                ("BLOB_BROWSER_CONNECTION_STRING", "AccountKey=topsecret"),
                ("BLOB_BROWSER_CLIENT_SECRET", "hunter2"),
            ],
        )
        .unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("hunter2"));
    }
}
