use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use ini::{Ini, Properties};
use log::debug;
use sigv4_proxy_core::{Context, Error, ProvideCredential, Result};

/// ProfileCredentialProvider loads AWS credentials from the shared files.
///
/// Two files are consulted, in order:
/// - `~/.aws/credentials` (or the path specified by `AWS_SHARED_CREDENTIALS_FILE`)
/// - `~/.aws/config` (or the path specified by `AWS_CONFIG_FILE`)
///
/// The profile to use is determined by:
/// 1. The profile specified via `with_profile()`
/// 2. The `AWS_PROFILE` environment variable
/// 3. Default to "default"
///
/// A missing file or profile is not an error, the provider reports nothing
/// found. A file that exists but cannot be parsed is an error.
#[derive(Debug, Default, Clone)]
pub struct ProfileCredentialProvider {
    profile: Option<String>,
    config_file: Option<String>,
    credentials_file: Option<String>,
}

/// Which shared file a section is read from. They differ in section naming.
#[derive(Debug, Clone, Copy)]
enum SharedFile {
    Credentials,
    Config,
}

impl SharedFile {
    fn env_key(self) -> &'static str {
        match self {
            SharedFile::Credentials => AWS_SHARED_CREDENTIALS_FILE,
            SharedFile::Config => AWS_CONFIG_FILE,
        }
    }

    fn default_path(self) -> &'static str {
        match self {
            SharedFile::Credentials => "~/.aws/credentials",
            SharedFile::Config => "~/.aws/config",
        }
    }

    /// The config file prefixes every non default profile with `profile `.
    fn section(self, profile: &str) -> String {
        match (self, profile) {
            (SharedFile::Config, p) if p != "default" => format!("profile {p}"),
            (_, p) => p.to_string(),
        }
    }
}

impl ProfileCredentialProvider {
    /// Create a new ProfileCredentialProvider with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the profile name to use.
    ///
    /// An explicit profile wins over `AWS_PROFILE`.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Set the path to the config file.
    pub fn with_config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set the path to the credentials file.
    pub fn with_credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    fn resolve_profile(&self, ctx: &Context) -> String {
        self.profile
            .clone()
            .or_else(|| ctx.env_var(AWS_PROFILE).filter(|v| !v.is_empty()))
            .unwrap_or_else(|| "default".to_string())
    }

    async fn load_from(
        &self,
        ctx: &Context,
        file: SharedFile,
        profile: &str,
    ) -> Result<Option<Credential>> {
        let configured = match file {
            SharedFile::Credentials => self.credentials_file.clone(),
            SharedFile::Config => self.config_file.clone(),
        };
        let path = configured
            .or_else(|| ctx.env_var(file.env_key()))
            .unwrap_or_else(|| file.default_path().to_string());

        let Some(path) = ctx.expand_home_dir(&path) else {
            debug!("failed to expand homedir for path: {path}");
            return Ok(None);
        };

        let content = match ctx.file_read_as_string(&path).await {
            Ok(content) => content,
            Err(err) => {
                debug!("failed to read {file:?} file {path}: {err}");
                return Ok(None);
            }
        };

        let conf = Ini::load_from_str(&content).map_err(|e| {
            Error::config_invalid(format!("failed to parse {path}")).with_source(e)
        })?;

        let section = file.section(profile);
        let Some(props) = conf.section(Some(section.as_str())) else {
            debug!("section [{section}] not found in {path}");
            return Ok(None);
        };

        Ok(credential_from_properties(props))
    }
}

fn credential_from_properties(props: &Properties) -> Option<Credential> {
    let ak = props.get("aws_access_key_id").filter(|v| !v.is_empty())?;
    let sk = props.get("aws_secret_access_key").filter(|v| !v.is_empty())?;

    Some(Credential {
        access_key_id: ak.to_string(),
        secret_access_key: sk.to_string(),
        session_token: props
            .get("aws_session_token")
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string()),
        expires_in: None,
    })
}

#[async_trait]
impl ProvideCredential for ProfileCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let profile = self.resolve_profile(ctx);
        debug!("loading credential for profile {profile}");

        if let Some(cred) = self.load_from(ctx, SharedFile::Credentials, &profile).await? {
            return Ok(Some(cred));
        }
        self.load_from(ctx, SharedFile::Config, &profile).await
    }
}
