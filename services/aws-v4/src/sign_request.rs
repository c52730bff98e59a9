use crate::constants::{
    AWS4_ECDSA_P256_SHA256, AWS4_HMAC_SHA256, AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET,
    UNSIGNED_HEADERS, X_AMZ_DATE, X_AMZ_REGION_SET, X_AMZ_SECURITY_TOKEN,
};
use crate::Credential;
use async_trait::async_trait;
use http::request::Parts;
use http::{header, HeaderValue};
use log::debug;
use percent_encoding::utf8_percent_encode;
use sigv4_proxy_core::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use sigv4_proxy_core::time::{format_date, format_iso8601, now, DateTime};
use sigv4_proxy_core::{Context, Error, Result, SignRequest, SigningCredential, SigningRequest};
use std::fmt::{self, Display, Write};
use std::str::FromStr;

/// Signature algorithm selected by configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    /// Single region SigV4 with HMAC-SHA256.
    #[default]
    V4,
    /// Multi region SigV4a with ECDSA P-256.
    V4a,
}

impl SigningAlgorithm {
    fn label(self) -> &'static str {
        match self {
            SigningAlgorithm::V4 => "SigV4",
            SigningAlgorithm::V4a => "SigV4a",
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "v4" => Ok(SigningAlgorithm::V4),
            "v4a" => Ok(SigningAlgorithm::V4a),
            v => Err(Error::config_invalid(format!(
                "unsupported signature version: {v} (must be 'v4' or 'v4a')"
            ))),
        }
    }
}

impl Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningAlgorithm::V4 => f.write_str("v4"),
            SigningAlgorithm::V4a => f.write_str("v4a"),
        }
    }
}

/// Request signer for one of the supported algorithms.
///
/// Both variants check the signing context and credential the same way, so
/// callers see identical validation errors whatever algorithm is configured.
#[derive(Debug)]
pub enum RequestSigner {
    /// AWS SigV4.
    V4(V4RequestSigner),
    /// AWS SigV4a.
    V4a(V4aRequestSigner),
}

impl RequestSigner {
    /// Create a signer for the given algorithm.
    pub fn new(algorithm: SigningAlgorithm, service: &str, region: &str) -> Self {
        match algorithm {
            SigningAlgorithm::V4 => RequestSigner::V4(V4RequestSigner::new(service, region)),
            SigningAlgorithm::V4a => RequestSigner::V4a(V4aRequestSigner::new(service, region)),
        }
    }

    /// The algorithm this signer implements.
    pub fn algorithm(&self) -> SigningAlgorithm {
        match self {
            RequestSigner::V4(_) => SigningAlgorithm::V4,
            RequestSigner::V4a(_) => SigningAlgorithm::V4a,
        }
    }
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        ctx: &Context,
        req: &mut Parts,
        credential: Option<&Self::Credential>,
        payload_hash: &str,
    ) -> Result<()> {
        match self {
            RequestSigner::V4(s) => s.sign_request(ctx, req, credential, payload_hash).await,
            RequestSigner::V4a(s) => s.sign_request(ctx, req, credential, payload_hash).await,
        }
    }
}

/// Check region, service and credential in that order.
fn validate<'a>(
    algorithm: SigningAlgorithm,
    region: &str,
    service: &str,
    credential: Option<&'a Credential>,
) -> Result<&'a Credential> {
    let label = algorithm.label();
    if region.is_empty() {
        return Err(Error::config_invalid(format!(
            "region is required for {label} signing"
        )));
    }
    if service.is_empty() {
        return Err(Error::config_invalid(format!(
            "service name is required for {label} signing"
        )));
    }
    match credential {
        Some(cred) if cred.is_valid() => Ok(cred),
        _ => Err(Error::credential_invalid(format!(
            "AWS credentials are required for {label} signing"
        ))),
    }
}

/// RequestSigner that implement AWS SigV4.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Debug)]
pub struct V4RequestSigner {
    service: String,
    region: String,

    time: Option<DateTime>,
}

impl V4RequestSigner {
    /// Create a new builder for AWS V4 signer.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),

            time: None,
        }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    #[cfg(test)]
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }
}

#[async_trait]
impl SignRequest for V4RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        credential: Option<&Self::Credential>,
        payload_hash: &str,
    ) -> Result<()> {
        let cred = validate(
            SigningAlgorithm::V4,
            &self.region,
            &self.service,
            credential,
        )?;
        let now = self.time.unwrap_or_else(now);
        let mut signed_req = SigningRequest::build(req)?;

        canonicalize_header(&mut signed_req, cred, now)?;

        let (creq, signed_headers) = canonical_request_string(&signed_req, payload_hash)?;
        debug!("calculated canonical request: {creq}");
        let encoded_req = hex_sha256(creq.as_bytes());

        // Scope: "20220313/<region>/<service>/aws4_request"
        let scope = format!(
            "{}/{}/{}/aws4_request",
            format_date(now),
            self.region,
            self.service
        );
        debug!("calculated scope: {scope}");

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = {
            let mut f = String::new();
            writeln!(f, "{AWS4_HMAC_SHA256}")?;
            writeln!(f, "{}", format_iso8601(now))?;
            writeln!(f, "{scope}")?;
            write!(f, "{encoded_req}")?;
            f
        };
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key =
            generate_signing_key(&cred.secret_access_key, now, &self.region, &self.service);
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let mut authorization = HeaderValue::from_str(&format!(
            "{AWS4_HMAC_SHA256} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            cred.access_key_id,
        ))?;
        authorization.set_sensitive(true);
        signed_req
            .headers
            .insert(header::AUTHORIZATION, authorization);

        signed_req.apply(req);
        Ok(())
    }
}

/// RequestSigner for AWS SigV4a.
///
/// SigV4a derives an ECDSA P-256 key from the secret and signs for a region
/// set (`X-Amz-Region-Set`). The derivation is not available here: after the
/// usual validation this signer always reports [`sigv4_proxy_core::ErrorKind::Unsupported`].
#[derive(Debug)]
pub struct V4aRequestSigner {
    service: String,
    region: String,
}

impl V4aRequestSigner {
    /// Create a new AWS V4a signer.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),
        }
    }
}

#[async_trait]
impl SignRequest for V4aRequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        _: &mut Parts,
        credential: Option<&Self::Credential>,
        _: &str,
    ) -> Result<()> {
        validate(
            SigningAlgorithm::V4a,
            &self.region,
            &self.service,
            credential,
        )?;
        debug!(
            "{AWS4_ECDSA_P256_SHA256} requested for {X_AMZ_REGION_SET}: {}",
            self.region
        );

        Err(Error::unsupported(
            "SigV4a signing is not available: ECDSA P-256 key derivation is not implemented, use v4 instead",
        ))
    }
}

fn is_signed_header(name: &str) -> bool {
    !UNSIGNED_HEADERS.contains(&name)
}

/// Build the canonical request, returning it with the signed header list.
fn canonical_request_string(
    ctx: &SigningRequest,
    payload_hash: &str,
) -> Result<(String, String)> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    // Insert method
    writeln!(f, "{}", ctx.method)?;
    // Insert encoded path, the path is already escaped and gets encoded once more.
    writeln!(f, "{}", utf8_percent_encode(&ctx.path, &AWS_URI_ENCODE_SET))?;
    // Insert query
    let query = ctx
        .query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect();
    writeln!(f, "{}", SigningRequest::pairs_to_string(query, "=", "&"))?;
    // Insert signed headers
    let signed_headers = ctx.header_name_to_vec_sorted(is_signed_header);
    for name in signed_headers.iter() {
        let values = ctx
            .headers
            .get_all(*name)
            .iter()
            .map(SigningRequest::header_value_normalize)
            .collect::<Result<Vec<_>>>()?;
        writeln!(f, "{name}:{}", values.join(","))?;
    }
    writeln!(f)?;
    let signed_headers = signed_headers.join(";");
    writeln!(f, "{signed_headers}")?;
    write!(f, "{payload_hash}")?;

    Ok((f, signed_headers))
}

fn canonicalize_header(ctx: &mut SigningRequest, cred: &Credential, now: DateTime) -> Result<()> {
    // Insert HOST header if not present.
    if ctx.headers.get(header::HOST).is_none() {
        let host = HeaderValue::from_str(ctx.authority.as_str())?;
        ctx.headers.insert(header::HOST, host);
    }

    ctx.headers
        .insert(X_AMZ_DATE, HeaderValue::try_from(format_iso8601(now))?);

    // Insert X_AMZ_SECURITY_TOKEN header if security token exists.
    if let Some(token) = &cred.session_token {
        let mut value = HeaderValue::from_str(token)?;
        // Set token value sensitive to valid leaking.
        value.set_sensitive(true);

        ctx.headers.insert(X_AMZ_SECURITY_TOKEN, value);
    }

    Ok(())
}

fn generate_signing_key(secret: &str, time: DateTime, region: &str, service: &str) -> Vec<u8> {
    // Sign secret
    let secret = format!("AWS4{secret}");
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes());
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    // Sign request
    hmac_sha256(sign_service.as_slice(), "aws4_request".as_bytes())
}
