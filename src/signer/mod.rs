//! AWS Signature Version 4 request signing and signed HTTP transport.
//!
//! [`RequestSigner`] turns an [`HttpRequest`] into the header set required by
//! SigV4. Signing is a pure function of the request, the credentials, and
//! the timestamp, so identical inputs always produce identical headers.
//! [`AwsClient`] adds the transport: it signs, sends with `reqwest`, and
//! decodes XML or JSON responses into a single value type.

mod canonical;
mod client;
mod error;
mod response;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

pub use canonical::{ALGORITHM, derive_signing_key, uri_encode};
pub use client::{AwsClient, JSON_CONTENT_TYPE, QUERY_CONTENT_TYPE};
pub use error::{SigningError, TransportError};
pub use response::{ResponseFormat, decode_response, sniff_format, xml_to_value};
pub(crate) use response::members;

/// Header carrying the request timestamp.
pub const AMZ_DATE_HEADER: &str = "x-amz-date";
/// Header carrying the session token for temporary credentials.
pub const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";
/// Header carrying the computed signature.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Access key pair plus optional session token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    /// Creates credentials, rejecting empty keys.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::MissingField`] when either key is empty.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Result<Self, SigningError> {
        let access = access_key_id.into();
        let secret = secret_access_key.into();
        if access.trim().is_empty() {
            return Err(SigningError::MissingField("access key id"));
        }
        if secret.trim().is_empty() {
            return Err(SigningError::MissingField("secret access key"));
        }
        Ok(Self {
            access_key_id: access,
            secret_access_key: secret,
            session_token: session_token.filter(|token| !token.trim().is_empty()),
        })
    }

    /// Access key identifier.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Session token, when the credentials are temporary.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// An HTTP request to be signed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HttpRequest {
    /// HTTP method, for example `POST`.
    pub method: String,
    /// Host header value, including a non-default port.
    pub host: String,
    /// Unencoded request path.
    pub path: String,
    /// Unencoded query parameters.
    pub query: Vec<(String, String)>,
    /// Additional headers to sign and send.
    pub headers: Vec<(String, String)>,
    /// Request payload.
    pub body: String,
}

impl HttpRequest {
    /// Starts a request for `method` against `host` at path `/`.
    #[must_use]
    pub fn new(method: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            host: host.into(),
            path: String::from("/"),
            ..Self::default()
        }
    }

    /// Sets the unencoded path.
    ///
    /// The path is percent-encoded on the wire. The signer encodes it a
    /// second time for the canonical request unless it signs for S3.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Headers produced by signing, keyed by lower-case name.
pub type SignedHeaders = BTreeMap<String, String>;

/// Signs requests for one service in one region.
#[derive(Clone, Debug)]
pub struct RequestSigner {
    credentials: Credentials,
    service: String,
    region: String,
    double_encode_path: bool,
}

impl RequestSigner {
    /// Creates a signer scoped to `service` and `region`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::MissingField`] when the service or region is
    /// empty.
    pub fn new(
        credentials: Credentials,
        service: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, SigningError> {
        let service_name = service.into();
        let region_name = region.into();
        if service_name.trim().is_empty() {
            return Err(SigningError::MissingField("service name"));
        }
        if region_name.trim().is_empty() {
            return Err(SigningError::MissingField("region"));
        }
        Ok(Self {
            double_encode_path: service_name != "s3",
            credentials,
            service: service_name,
            region: region_name,
        })
    }

    /// Overrides whether the canonical path is encoded a second time.
    ///
    /// Every service except S3 signs the already-encoded path encoded once
    /// more, and [`RequestSigner::new`] picks that mode from the service name.
    #[must_use]
    pub const fn with_double_encoded_path(mut self, double_encode: bool) -> Self {
        self.double_encode_path = double_encode;
        self
    }

    /// Path as it appears in the canonical request.
    pub(crate) fn signing_path(&self, path: &str) -> String {
        let encoded = canonical::canonical_uri(path);
        if self.double_encode_path {
            canonical::uri_encode(&encoded, true)
        } else {
            encoded
        }
    }

    /// Service the signer is scoped to.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Region the signer is scoped to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Signs `request` as of `timestamp`.
    ///
    /// The result holds every header of the request plus `host`,
    /// `x-amz-date`, `x-amz-security-token` when a session token is present,
    /// and `authorization`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidRequest`] when the method or host is
    /// empty, or [`SigningError::Key`] when key derivation fails.
    pub fn sign(
        &self,
        request: &HttpRequest,
        timestamp: DateTime<Utc>,
    ) -> Result<SignedHeaders, SigningError> {
        if request.method.trim().is_empty() {
            return Err(SigningError::InvalidRequest(String::from("empty method")));
        }
        if request.host.trim().is_empty() {
            return Err(SigningError::InvalidRequest(String::from("empty host")));
        }

        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let date = timestamp.format("%Y%m%d").to_string();

        let mut headers: SignedHeaders = request
            .headers
            .iter()
            .map(|(name, value)| canonical::normalise_header(name, value))
            .fold(BTreeMap::new(), |mut acc, (name, value)| {
                acc.entry(name)
                    .and_modify(|existing: &mut String| {
                        existing.push(',');
                        existing.push_str(&value);
                    })
                    .or_insert_with(|| value.clone());
                acc
            });
        headers.insert(String::from("host"), request.host.trim().to_owned());
        headers.insert(AMZ_DATE_HEADER.to_owned(), amz_date.clone());
        if let Some(token) = self.credentials.session_token() {
            headers.insert(SECURITY_TOKEN_HEADER.to_owned(), token.to_owned());
        }

        let canonical_headers = canonical::canonical_headers(&headers);
        let canonical_request = canonical::canonical_request(
            &request.method.to_ascii_uppercase(),
            &self.signing_path(&request.path),
            &canonical::canonical_query(&request.query),
            &canonical_headers,
            &canonical::sha256_hex(request.body.as_bytes()),
        );
        let scope = canonical::credential_scope(&date, &self.region, &self.service);
        let string_to_sign = canonical::string_to_sign(&amz_date, &scope, &canonical_request);
        let key = derive_signing_key(
            &self.credentials.secret_access_key,
            &date,
            &self.region,
            &self.service,
        )?;
        let signature = canonical::signature(&key, &string_to_sign)?;

        debug!(
            service = %self.service,
            region = %self.region,
            signed_headers = %canonical_headers.signed,
            "request signed"
        );

        headers.insert(
            AUTHORIZATION_HEADER.to_owned(),
            format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
                self.credentials.access_key_id, canonical_headers.signed
            ),
        );
        Ok(headers)
    }
}
