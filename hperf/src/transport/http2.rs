use core::time::Duration;

use bytes::Bytes;
use http::{header, HeaderValue, Request, StatusCode};
use http_body_util::Full;
use hyper::client::conn::http2::SendRequest;
use tokio::sync::Mutex;

use super::{
    body,
    dial::{self, Dialer},
};
use crate::{error::TransportError, tls::TlsPolicy};

/// HTTP/2 transport.
///
/// All requests are multiplexed over a single shared connection, which is
/// re-established once closed. Connections are always kept alive and
/// responses are always allowed to be compressed.
#[derive(Debug)]
pub struct Http2Transport {
    dialer: Dialer,
    tls: TlsPolicy,
    timeout: Option<Duration>,
    conn: Mutex<Option<SendRequest<Full<Bytes>>>>,
}

impl Http2Transport {
    pub fn new(dialer: Dialer, tls: TlsPolicy, timeout: Option<Duration>) -> Self {
        Self {
            dialer,
            tls,
            timeout,
            conn: Mutex::new(None),
        }
    }

    #[inline]
    pub fn tls(&self) -> &TlsPolicy {
        &self.tls
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn send(&self, mut request: Request<Full<Bytes>>) -> Result<StatusCode, TransportError> {
        let mut sender = self.sender().await?;

        dial::into_http2(&mut request);
        request
            .headers_mut()
            .entry(header::ACCEPT_ENCODING)
            .or_insert(HeaderValue::from_static("gzip"));

        sender.ready().await?;
        let response = sender.send_request(request).await?;

        body::drain(response, true).await
    }

    /// Returns a handle to the shared connection, dialing a new one if there
    /// is none or it has been closed.
    async fn sender(&self) -> Result<SendRequest<Full<Bytes>>, TransportError> {
        let mut conn = self.conn.lock().await;

        if let Some(sender) = conn.as_ref().filter(|v| !v.is_closed()) {
            return Ok(sender.clone());
        }

        let sender = self.dialer.connect_http2().await?;
        *conn = Some(sender.clone());

        Ok(sender)
    }
}
