use sigv4_proxy_core::{Context, OsEnv};
use sigv4_proxy_file_read_tokio::TokioFileRead;

/// Build the context used by the binary.
///
/// Files are read with tokio and the environment is the process environment.
pub fn default_context() -> Context {
    Context::new().with_file_read(TokioFileRead).with_env(OsEnv)
}
