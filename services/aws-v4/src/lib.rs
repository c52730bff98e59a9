//! AWS SigV4 signing for sigv4-proxy.
//!
//! This crate provides the AWS side of the proxy:
//!
//! - [`Credential`] and the providers that load it from the environment and
//!   the shared AWS config files.
//! - [`RequestSigner`], which computes the SigV4 `Authorization` header for an
//!   outbound request given its payload hash.
//!
//! ## Example
//!
//! ```no_run
//! use sigv4_proxy_aws_v4::{DefaultCredentialProvider, RequestSigner, SigningAlgorithm};
//! use sigv4_proxy_core::hash::EMPTY_PAYLOAD_SHA256;
//! use sigv4_proxy_core::{Context, OsEnv, Signer};
//! use sigv4_proxy_file_read_tokio::TokioFileRead;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = Context::new().with_file_read(TokioFileRead).with_env(OsEnv);
//!     let signer = Signer::new(
//!         ctx,
//!         DefaultCredentialProvider::new(),
//!         RequestSigner::new(SigningAlgorithm::V4, "execute-api", "us-east-1"),
//!     );
//!
//!     let (mut parts, _) = http::Request::post("https://example.com/mcp")
//!         .body(())?
//!         .into_parts();
//!     signer.sign(&mut parts, EMPTY_PAYLOAD_SHA256).await?;
//!     Ok(())
//! }
//! ```

mod constants;
pub use constants::UNSIGNED_HEADERS;

mod credential;
pub use credential::Credential;

mod provide_credential;
pub use provide_credential::*;

mod sign_request;
pub use sign_request::{RequestSigner, SigningAlgorithm, V4RequestSigner, V4aRequestSigner};
