//! The signing transport.
//!
//! [`SigningTransport`] wraps any [`HttpSend`] and signs each request it
//! forwards. The request body is read to completion, hashed, and replaced by
//! an in-memory copy so the bytes hashed are exactly the bytes sent.

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderValue};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use log::debug;
use sigv4_proxy_aws_v4::Credential;
use sigv4_proxy_core::hash::{hex_sha256, EMPTY_PAYLOAD_SHA256};
use sigv4_proxy_core::{Error, HttpSend, Result, Signer};

/// An HTTP transport that signs every request with AWS SigV4.
///
/// Signing a request takes these steps:
///
/// 1. Read the whole body. A read failure aborts before anything is signed or sent.
/// 2. Hash the body. An absent body hashes as the empty string.
/// 3. Set `content-length` to the exact body size.
/// 4. Merge the extra headers, keeping any value the caller already set.
/// 5. Sign, then hand the request to the inner transport.
///
/// Responses are returned as they are, whatever the status code. Nothing is
/// retried.
#[derive(Clone)]
pub struct SigningTransport {
    signer: Signer<Credential>,
    headers: HeaderMap,
    inner: Arc<dyn HttpSend>,
}

impl Debug for SigningTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningTransport")
            .field("signer", &self.signer)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("inner", &self.inner)
            .finish()
    }
}

impl SigningTransport {
    /// Create a new transport that signs with `signer` and sends through `inner`.
    pub fn new(signer: Signer<Credential>, inner: impl HttpSend) -> Self {
        Self {
            signer,
            headers: HeaderMap::new(),
            inner: Arc::new(inner),
        }
    }

    /// Set extra headers added to every request.
    ///
    /// They are merged before signing, so they are covered by the signature.
    /// A header the caller already set on a request is left alone.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sign and send one request.
    pub async fn execute<B>(&self, req: http::Request<B>) -> Result<http::Response<Bytes>>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (mut parts, body) = req.into_parts();

        let (body, payload_hash) = if body.is_end_stream() {
            (Bytes::new(), EMPTY_PAYLOAD_SHA256.to_string())
        } else {
            let body = body.collect().await.map_err(|err| {
                let err: Box<dyn std::error::Error + Send + Sync> = err.into();
                let err = anyhow::anyhow!(err);
                Error::request_invalid(format!("failed to read request body for signing: {err}"))
                    .with_source(err)
            })?;
            let body = body.to_bytes();
            let hash = hex_sha256(&body);
            parts
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
            (body, hash)
        };
        debug!("payload hash for {} {}: {payload_hash}", parts.method, parts.uri);

        for (name, value) in self.headers.iter() {
            if !parts.headers.contains_key(name) {
                parts.headers.insert(name.clone(), value.clone());
            }
        }

        self.signer
            .sign(&mut parts, &payload_hash)
            .await
            .map_err(|err| err.with_context("AWS signature generation failed"))?;

        let host = parts
            .uri
            .authority()
            .map(|v| v.to_string())
            .unwrap_or_default();
        self.inner
            .http_send(http::Request::from_parts(parts, body))
            .await
            .map_err(|err| err.with_context(format!("failed to connect to target MCP server at {host}")))
    }
}

#[async_trait]
impl HttpSend for SigningTransport {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        self.execute(req.map(Full::new)).await
    }
}
