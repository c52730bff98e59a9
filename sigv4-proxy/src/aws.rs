//! AWS service support with convenience APIs
//!
//! This module re-exports the SigV4 signing types along with a constructor
//! for the signer the proxy uses.

// Re-export all AWS signing types
pub use sigv4_proxy_aws_v4::*;

use crate::{Config, Context, Signer};

/// Default AWS Signer type with commonly used components
pub type DefaultSigner = Signer<Credential>;

/// Create the AWS signer described by the proxy configuration.
///
/// The signer uses:
/// - the given context for environment and file access
/// - the default credential provider for the configured profile
/// - a request signer for the configured algorithm, service and region
///
/// ```no_run
/// # async fn example(config: sigv4_proxy::Config) -> sigv4_proxy::Result<()> {
/// let ctx = sigv4_proxy::default_context();
/// let signer = sigv4_proxy::aws::default_signer(ctx, &config);
///
/// // Fail fast when no credential is configured.
/// let cred = signer.load_credential().await?;
/// println!("signing as {}", cred.masked_access_key_id());
/// # Ok(())
/// # }
/// ```
pub fn default_signer(ctx: Context, config: &Config) -> DefaultSigner {
    let provider = DefaultCredentialProvider::with_profile(config.profile.clone());
    let signer = RequestSigner::new(config.algorithm, &config.service_name, &config.region);
    Signer::new(ctx, provider, signer)
}
