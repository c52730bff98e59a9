use crate::{Error, Result};
use http::uri::Authority;
use http::uri::Scheme;
use http::HeaderMap;
use http::HeaderValue;
use http::Method;

/// Signing context for request.
///
/// Built from a borrowed `http::request::Parts` so that a failed signing
/// attempt never leaves the original request half modified. Only
/// [`SigningRequest::apply`] writes back, and only headers.
#[derive(Debug)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// HTTP scheme.
    pub scheme: Scheme,
    /// HTTP authority.
    pub authority: Authority,
    /// HTTP path, still percent encoded as it will be sent.
    pub path: String,
    /// HTTP query parameters, percent decoded.
    pub query: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: HeaderMap,
}

impl SigningRequest {
    /// Build a signing context from http::request::Parts.
    pub fn build(parts: &http::request::Parts) -> Result<Self> {
        let uri = &parts.uri;
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| Error::request_invalid("request without authority is invalid for signing"))?;

        let path = match uri.path() {
            "" => "/".to_string(),
            v => v.to_string(),
        };

        Ok(SigningRequest {
            method: parts.method.clone(),
            scheme: uri.scheme().cloned().unwrap_or(Scheme::HTTPS),
            authority,
            path,
            query: uri
                .query()
                .map(|v| {
                    form_urlencoded::parse(v.as_bytes())
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect()
                })
                .unwrap_or_default(),
            headers: parts.headers.clone(),
        })
    }

    /// Apply the signing context back to http::request::Parts.
    ///
    /// Signers only ever add headers, so replacing the header map keeps every
    /// header the caller set.
    pub fn apply(self, parts: &mut http::request::Parts) {
        parts.headers = self.headers;
    }

    /// Normalize a header value for canonical forms.
    ///
    /// Leading and trailing spaces are trimmed and inner runs of spaces are
    /// collapsed into one.
    pub fn header_value_normalize(v: &HeaderValue) -> Result<String> {
        let s = v.to_str()?;

        let mut out = String::with_capacity(s.len());
        for (idx, part) in s.split_whitespace().enumerate() {
            if idx > 0 {
                out.push(' ');
            }
            out.push_str(part);
        }
        Ok(out)
    }

    /// Get header names as sorted vector, skipping names rejected by filter.
    pub fn header_name_to_vec_sorted(&self, filter: impl Fn(&str) -> bool) -> Vec<&str> {
        let mut h = self
            .headers
            .keys()
            .map(|k| k.as_str())
            .filter(|k| filter(k))
            .collect::<Vec<&str>>();
        h.sort_unstable();

        h
    }

    /// Convert sorted pairs to string.
    ///
    /// ```shell
    /// [(a, b), (c, d)] => "a:b\nc:d"
    /// ```
    pub fn pairs_to_string(mut pairs: Vec<(String, String)>, sep: &str, join: &str) -> String {
        let mut s = String::with_capacity(16);

        pairs.sort();

        for (idx, (k, v)) in pairs.into_iter().enumerate() {
            if idx != 0 {
                s.push_str(join);
            }

            s.push_str(&k);
            s.push_str(sep);
            s.push_str(&v);
        }

        s
    }
}
