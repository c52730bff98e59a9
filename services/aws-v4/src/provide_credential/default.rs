use crate::provide_credential::{EnvCredentialProvider, ProfileCredentialProvider};
use crate::Credential;
use async_trait::async_trait;
use sigv4_proxy_core::{Context, ProvideCredential, ProvideCredentialChain, Result};

/// DefaultCredentialProvider will try to load credential from different sources.
///
/// Resolution order:
///
/// 1. Environment variables
/// 2. Shared config (`~/.aws/config`, `~/.aws/credentials`)
#[derive(Debug)]
pub struct DefaultCredentialProvider {
    chain: ProvideCredentialChain<Credential>,
}

impl Default for DefaultCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCredentialProvider {
    /// Create a new `DefaultCredentialProvider` instance.
    pub fn new() -> Self {
        Self::with_profile_provider(ProfileCredentialProvider::new())
    }

    /// Create a provider that reads the named profile from the shared files.
    ///
    /// Environment variables still take precedence over the profile.
    pub fn with_profile(profile: impl Into<String>) -> Self {
        Self::with_profile_provider(ProfileCredentialProvider::new().with_profile(profile))
    }

    fn with_profile_provider(profile: ProfileCredentialProvider) -> Self {
        let chain = ProvideCredentialChain::new()
            .push(EnvCredentialProvider::new())
            .push(profile);

        Self { chain }
    }

    /// Create with a custom credential chain.
    pub fn with_chain(chain: ProvideCredentialChain<Credential>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl ProvideCredential for DefaultCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.chain.provide_credential(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        AWS_ACCESS_KEY_ID, AWS_CONFIG_FILE, AWS_SECRET_ACCESS_KEY, AWS_SHARED_CREDENTIALS_FILE,
    };
    use crate::StaticCredentialProvider;
    use pretty_assertions::assert_eq;
    use sigv4_proxy_core::StaticEnv;
    use sigv4_proxy_file_read_tokio::TokioFileRead;
    use std::collections::HashMap;
    use std::io::Write;

    fn context(envs: HashMap<String, String>) -> Context {
        Context::new()
            .with_file_read(TokioFileRead)
            .with_env(StaticEnv {
                home_dir: None,
                envs,
            })
    }

    #[tokio::test]
    async fn test_credential_env_loader_without_env() {
        let _ = env_logger::builder().is_test(true).try_init();

        let ctx = context(HashMap::new());

        let l = DefaultCredentialProvider::new();
        let x = l.provide_credential(&ctx).await.expect("load must succeed");
        assert!(x.is_none());
    }

    #[tokio::test]
    async fn test_credential_env_loader_with_env() {
        let _ = env_logger::builder().is_test(true).try_init();

        let ctx = context(HashMap::from_iter([
            (AWS_ACCESS_KEY_ID.to_string(), "access_key_id".to_string()),
            (
                AWS_SECRET_ACCESS_KEY.to_string(),
                "secret_access_key".to_string(),
            ),
        ]));

        let l = DefaultCredentialProvider::new();
        let x = l
            .provide_credential(&ctx)
            .await
            .expect("load must succeed")
            .expect("must load succeed");
        assert_eq!("access_key_id", x.access_key_id);
        assert_eq!("secret_access_key", x.secret_access_key);
    }

    #[tokio::test]
    async fn test_credential_env_wins_over_profile() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "[work]")?;
        writeln!(file, "aws_access_key_id = PROFILEACCESSKEYID")?;
        writeln!(file, "aws_secret_access_key = PROFILESECRETACCESSKEY")?;
        let path = file.path().to_string_lossy().to_string();

        let mut envs = HashMap::from_iter([
            (AWS_SHARED_CREDENTIALS_FILE.to_string(), path),
            (AWS_CONFIG_FILE.to_string(), "/non/existent/path".to_string()),
        ]);

        let l = DefaultCredentialProvider::with_profile("work");
        let x = l
            .provide_credential(&context(envs.clone()))
            .await?
            .expect("profile must load");
        assert_eq!("PROFILEACCESSKEYID", x.access_key_id);

        envs.insert(AWS_ACCESS_KEY_ID.to_string(), "ENVACCESSKEYID".to_string());
        envs.insert(
            AWS_SECRET_ACCESS_KEY.to_string(),
            "ENVSECRETACCESSKEY".to_string(),
        );
        let x = l
            .provide_credential(&context(envs))
            .await?
            .expect("env must load");
        assert_eq!("ENVACCESSKEYID", x.access_key_id);
        Ok(())
    }

    #[tokio::test]
    async fn test_credential_with_custom_chain() -> anyhow::Result<()> {
        let chain = ProvideCredentialChain::new()
            .push(EnvCredentialProvider::new())
            .push(StaticCredentialProvider::new("static_ak", "static_sk"));

        let l = DefaultCredentialProvider::with_chain(chain);
        let x = l
            .provide_credential(&context(HashMap::new()))
            .await?
            .expect("static provider must load");
        assert_eq!(x, Credential::new("static_ak", "static_sk"));
        Ok(())
    }
}
