//! Request template.
//!
//! A [`RequestTemplate`] is built once during setup and then shared between
//! all workers. It never holds a body stream: the payload is kept as an
//! immutable [`Bytes`] buffer and every call to [`RequestTemplate::request`]
//! wraps it into a brand new body.

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Request, Uri};
use http_body_util::Full;

use crate::error::ConfigError;

/// Immutable description of the request being benchmarked.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    /// Absolute URL, i.e. with scheme and authority.
    uri: Uri,
    /// Headers in the order they were specified.
    headers: Vec<(HeaderName, HeaderValue)>,
    payload: Bytes,
}

impl RequestTemplate {
    /// Builds a new template.
    ///
    /// The `headers` argument is a comma-separated list of `key:value` pairs.
    /// A single malformed entry fails the whole construction.
    pub fn new(method: &str, host: &str, headers: &str, payload: &str) -> Result<Self, ConfigError> {
        if !host.contains("://") {
            return Err(ConfigError::InvalidHost(host.to_owned()));
        }

        let method = Method::from_bytes(method.as_bytes())
            .map_err(|err| ConfigError::InvalidRequest(format!("{err}: '{method}'")))?;

        let uri: Uri = host
            .parse()
            .map_err(|err| ConfigError::InvalidRequest(format!("{err}: '{host}'")))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ConfigError::InvalidRequest(format!("URL must be absolute: '{host}'")));
        }

        let headers = parse_headers(headers)?;
        let payload = Bytes::copy_from_slice(payload.as_bytes());

        let m = Self { method, uri, headers, payload };

        Ok(m)
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[inline]
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Materializes a fresh request from this template.
    ///
    /// The returned request owns its body, so it can be consumed without
    /// affecting other callers. Cloning the payload only bumps a reference
    /// counter.
    pub fn request(&self) -> Request<Full<Bytes>> {
        let mut request = Request::new(Full::new(self.payload.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();

        let headers = request.headers_mut();
        headers.reserve(self.headers.len());
        for (name, value) in &self.headers {
            headers.append(name, value.clone());
        }

        request
    }
}

/// Parses the comma-separated header specification.
///
/// Either all entries are parsed, or an error for the first malformed one is
/// returned.
pub fn parse_headers(spec: &str) -> Result<Vec<(HeaderName, HeaderValue)>, ConfigError> {
    if spec.is_empty() {
        return Ok(Vec::new());
    }

    spec.split(',').map(parse_header).collect()
}

fn parse_header(entry: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let malformed = || ConfigError::MalformedHeader(entry.to_owned());

    let mut kvs = entry.split(':');
    let (Some(name), Some(value), None) = (kvs.next(), kvs.next(), kvs.next()) else {
        return Err(malformed());
    };

    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return Err(malformed());
    }

    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| malformed())?;
    let value = HeaderValue::from_str(value).map_err(|_| malformed())?;

    Ok((name, value))
}
