//! Transport selection.
//!
//! Exactly one transport is built per run: either [`Http1Transport`] or
//! [`Http2Transport`]. Both are safe to share between any number of
//! concurrent workers.

use core::time::Duration;

use bytes::Bytes;
use http::{Request, StatusCode, Uri};
use http_body_util::Full;

pub use self::{dial::Dialer, http1::Http1Transport, http2::Http2Transport};
use crate::{
    error::{ConfigError, TransportError},
    tls::TlsPolicy,
};

mod body;
mod dial;
mod http1;
mod http2;

/// Whether the "http2" toggle selects the HTTP/2 transport.
///
/// Kept as a named constant to make the flag-to-protocol mapping explicit.
pub const H2_SELECTS_HTTP2: bool = true;

/// HTTP protocol version spoken over a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http1,
    Http2,
}

/// Transport toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// Keep connections open between requests.
    ///
    /// Affects HTTP/1.1 only.
    pub keep_alive: bool,
    /// Advertise and decode compressed responses.
    ///
    /// Affects HTTP/1.1 only.
    pub compression: bool,
    /// Use HTTP/2.
    pub h2: bool,
    /// Overall timeout for a single request, including connection
    /// establishment and reading the response body.
    pub timeout: Option<Duration>,
}

impl TransportOptions {
    /// Returns the protocol selected by these options.
    #[inline]
    pub fn protocol(&self) -> Protocol {
        if self.h2 == H2_SELECTS_HTTP2 {
            Protocol::Http2
        } else {
            Protocol::Http1
        }
    }
}

#[derive(Debug)]
pub enum Transport {
    Http1(Http1Transport),
    Http2(Http2Transport),
}

impl Transport {
    /// Builds the transport for the given target URL.
    pub fn select(opts: &TransportOptions, tls: TlsPolicy, uri: &Uri) -> Result<Self, ConfigError> {
        let protocol = opts.protocol();
        let dialer = Dialer::new(uri, &tls, protocol)?;

        let transport = match protocol {
            Protocol::Http1 => Self::Http1(Http1Transport::new(
                dialer,
                tls,
                opts.keep_alive,
                opts.compression,
                opts.timeout,
            )),
            Protocol::Http2 => Self::Http2(Http2Transport::new(dialer, tls, opts.timeout)),
        };

        log::debug!("selected transport: {transport:?}");

        Ok(transport)
    }

    #[inline]
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http1(..) => Protocol::Http1,
            Self::Http2(..) => Protocol::Http2,
        }
    }

    #[inline]
    pub fn tls(&self) -> &TlsPolicy {
        match self {
            Self::Http1(t) => t.tls(),
            Self::Http2(t) => t.tls(),
        }
    }

    /// Returns whether connections are kept alive between requests.
    #[inline]
    pub fn keep_alive(&self) -> bool {
        match self {
            Self::Http1(t) => t.keep_alive(),
            Self::Http2(..) => true,
        }
    }

    /// Returns whether responses are allowed to be compressed.
    #[inline]
    pub fn compression(&self) -> bool {
        match self {
            Self::Http1(t) => t.compression(),
            Self::Http2(..) => true,
        }
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Self::Http1(t) => t.timeout(),
            Self::Http2(t) => t.timeout(),
        }
    }

    /// Sends the request and reads the response body until the end.
    ///
    /// The request URI must be absolute.
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<StatusCode, TransportError> {
        let future = async {
            match self {
                Self::Http1(t) => t.send(request).await,
                Self::Http2(t) => t.send(request).await,
            }
        };

        match self.timeout() {
            Some(timeout) => tokio::time::timeout(timeout, future)
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => future.await,
        }
    }
}
