use crate::{Context, Error, ProvideCredential, Result, SignRequest, SigningCredential};
use log::debug;
use std::sync::{Arc, Mutex};

/// Signer is the main struct used to sign the request.
///
/// It owns the credential provider and the request signer, and caches the
/// last loaded credential. The cached credential is cloned as a whole under
/// the lock, so a signing call never sees a half replaced credential.
#[derive(Clone, Debug)]
pub struct Signer<K: SigningCredential> {
    ctx: Context,
    loader: Arc<dyn ProvideCredential<Credential = K>>,
    builder: Arc<dyn SignRequest<Credential = K>>,
    credential: Arc<Mutex<Option<K>>>,
}

impl<K: SigningCredential> Signer<K> {
    /// Create a new signer.
    pub fn new(
        ctx: Context,
        loader: impl ProvideCredential<Credential = K>,
        builder: impl SignRequest<Credential = K>,
    ) -> Self {
        Self {
            ctx,

            loader: Arc::new(loader),
            builder: Arc::new(builder),
            credential: Arc::new(Mutex::new(None)),
        }
    }

    /// Seed the signer with an already loaded credential.
    pub fn with_credential(self, credential: K) -> Self {
        *self.credential.lock().expect("lock poisoned") = Some(credential);
        self
    }

    /// Get the context used by this signer.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Load a credential from the provider and cache it.
    ///
    /// Unlike [`Signer::sign`], finding nothing is an error here. Use it at
    /// startup to fail fast when no credential is configured.
    pub async fn load_credential(&self) -> Result<K> {
        let Some(cred) = self.loader.provide_credential(&self.ctx).await? else {
            return Err(Error::credential_invalid(
                "no AWS credentials found: configure AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY, or a profile in ~/.aws/credentials",
            ));
        };

        *self.credential.lock().expect("lock poisoned") = Some(cred.clone());
        Ok(cred)
    }

    /// Sign the request with the given payload hash.
    pub async fn sign(&self, req: &mut http::request::Parts, payload_hash: &str) -> Result<()> {
        let credential = self.credential.lock().expect("lock poisoned").clone();
        let credential = if credential.is_valid() {
            credential
        } else {
            debug!("cached credential is missing or no longer valid, loading a new one");
            let loaded = self.loader.provide_credential(&self.ctx).await?;
            *self.credential.lock().expect("lock poisoned") = loaded.clone();
            loaded
        };

        self.builder
            .sign_request(&self.ctx, req, credential.as_ref(), payload_hash)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::HeaderValue;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug)]
    struct TestCredential(String);

    impl SigningCredential for TestCredential {
        fn is_valid(&self) -> bool {
            !self.0.is_empty()
        }
    }

    #[derive(Debug, Default)]
    struct CountingLoader {
        calls: Arc<AtomicUsize>,
        value: Option<&'static str>,
    }

    #[async_trait]
    impl ProvideCredential for CountingLoader {
        type Credential = TestCredential;

        async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.map(|v| TestCredential(v.to_string())))
        }
    }

    #[derive(Debug)]
    struct HeaderSigner;

    #[async_trait]
    impl SignRequest for HeaderSigner {
        type Credential = TestCredential;

        async fn sign_request(
            &self,
            _: &Context,
            req: &mut http::request::Parts,
            credential: Option<&Self::Credential>,
            payload_hash: &str,
        ) -> Result<()> {
            let Some(cred) = credential else {
                return Err(Error::credential_invalid("credential is required"));
            };
            req.headers.insert(
                "x-test-credential",
                HeaderValue::from_str(&cred.0).expect("must be valid"),
            );
            req.headers.insert(
                "x-test-payload",
                HeaderValue::from_str(payload_hash).expect("must be valid"),
            );
            Ok(())
        }
    }

    fn parts() -> http::request::Parts {
        http::Request::builder()
            .uri("https://example.com/mcp")
            .body(())
            .expect("request must be valid")
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn test_sign_loads_credential_once() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = CountingLoader {
            calls: calls.clone(),
            value: Some("cred"),
        };
        let signer = Signer::new(Context::new(), loader, HeaderSigner);

        for _ in 0..3 {
            let mut req = parts();
            signer.sign(&mut req, "hash").await?;
            assert_eq!(req.headers["x-test-credential"], "cred");
            assert_eq!(req.headers["x-test-payload"], "hash");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sign_with_preloaded_credential() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = CountingLoader {
            calls: calls.clone(),
            value: None,
        };
        let signer = Signer::new(Context::new(), loader, HeaderSigner)
            .with_credential(TestCredential("preloaded".to_string()));

        let mut req = parts();
        signer.sign(&mut req, "hash").await?;
        assert_eq!(req.headers["x-test-credential"], "preloaded");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_credential_requires_credential() {
        let signer = Signer::new(Context::new(), CountingLoader::default(), HeaderSigner);

        let err = signer
            .load_credential()
            .await
            .expect_err("missing credential must fail");
        assert!(err.is_credential_error());
        assert!(err.to_string().contains("no AWS credentials found"));
    }

    #[tokio::test]
    async fn test_sign_without_credential_leaves_request() {
        let signer = Signer::new(Context::new(), CountingLoader::default(), HeaderSigner);

        let mut req = parts();
        let err = signer
            .sign(&mut req, "hash")
            .await
            .expect_err("missing credential must fail");
        assert!(err.is_credential_error());
        assert!(req.headers.is_empty());
    }
}
