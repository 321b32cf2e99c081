//! Signed HTTP transport for AWS Query and AWS JSON endpoints.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

use super::canonical::{canonical_query, uri_encode};
use super::response::decode_response;
use super::{AUTHORIZATION_HEADER, HttpRequest, RequestSigner, TransportError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Content type of AWS Query requests.
pub const QUERY_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
/// Content type of AWS JSON 1.1 requests.
pub const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Sends signed requests to a single service endpoint.
///
/// Each client owns its own connection pool; nothing is shared between
/// clients. Requests are sent once and never retried.
#[derive(Clone, Debug)]
pub struct AwsClient {
    signer: RequestSigner,
    endpoint: Url,
    http: reqwest::Client,
}

impl AwsClient {
    /// Creates a client for the signer's service and region.
    ///
    /// Without an explicit `endpoint` the regional
    /// `https://{service}.{region}.amazonaws.com` endpoint is used.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] when the endpoint is not a valid
    /// URL or the HTTP client cannot be built.
    pub fn new(signer: RequestSigner, endpoint: Option<&str>) -> Result<Self, TransportError> {
        let raw = endpoint.map_or_else(
            || format!("https://{}.{}.amazonaws.com", signer.service(), signer.region()),
            str::to_owned,
        );
        let url = Url::parse(&raw)
            .map_err(|err| TransportError::Network(format!("invalid endpoint {raw}: {err}")))?;
        if url.host_str().is_none() {
            return Err(TransportError::Network(format!("endpoint {raw} has no host")));
        }
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            signer,
            endpoint: url,
            http,
        })
    }

    /// Endpoint requests are sent to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Host header value for the endpoint, including a non-default port.
    #[must_use]
    pub fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    /// Signs and sends `request`, decoding the response body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Signing`] when signing fails,
    /// [`TransportError::Network`] when no response arrives, and the errors
    /// of [`decode_response`] otherwise.
    pub async fn send(&self, request: HttpRequest) -> Result<Option<Value>, TransportError> {
        let headers = self.signer.sign(&request, Utc::now())?;

        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let mut url = self.endpoint.clone();
        url.set_path(&super::canonical::canonical_uri(&request.path));
        let query = canonical_query(&request.query);
        url.set_query((!query.is_empty()).then_some(query.as_str()));

        let mut builder = self.http.request(method, url);
        for (name, value) in &headers {
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        debug!(
            method = %request.method,
            path = %request.path,
            authorization = headers.contains_key(AUTHORIZATION_HEADER),
            "sending signed request"
        );

        let response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), "response received");
        decode_response(status, &body)
    }

    /// Sends an AWS Query request: a form-encoded `POST` carrying `Action`,
    /// `Version`, and `params`.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`AwsClient::send`].
    pub async fn query_request(
        &self,
        action: &str,
        version: &str,
        params: &[(String, String)],
    ) -> Result<Option<Value>, TransportError> {
        let mut pairs = vec![
            (String::from("Action"), action.to_owned()),
            (String::from("Version"), version.to_owned()),
        ];
        pairs.extend(params.iter().cloned());
        let body = pairs
            .iter()
            .map(|(key, value)| format!("{}={}", uri_encode(key, false), uri_encode(value, false)))
            .collect::<Vec<_>>()
            .join("&");
        let request = HttpRequest::new("POST", self.host())
            .header("content-type", QUERY_CONTENT_TYPE)
            .body(body);
        self.send(request).await
    }

    /// Sends an AWS JSON request addressed by `X-Amz-Target`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] when `payload` cannot be
    /// serialized, and the errors of [`AwsClient::send`] otherwise.
    pub async fn json_request(
        &self,
        target: &str,
        payload: &Value,
    ) -> Result<Option<Value>, TransportError> {
        let body = serde_json::to_string(payload).map_err(|err| TransportError::Decode {
            format: "JSON",
            message: err.to_string(),
        })?;
        let request = HttpRequest::new("POST", self.host())
            .header("content-type", JSON_CONTENT_TYPE)
            .header("x-amz-target", target)
            .body(body);
        self.send(request).await
    }
}
