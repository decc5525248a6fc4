use core::time::Duration;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use http::{header, HeaderValue, Request, Response, StatusCode, Version};
use http_body_util::Full;
use hyper::body::Incoming;

use super::{
    body,
    dial::{Dialer, SendError, Sender},
    Protocol,
};
use crate::{error::TransportError, tls::TlsPolicy};

/// HTTP/1.1 transport.
///
/// Ready connections are kept in a shared idle pool between requests when
/// keep-alive is enabled. Otherwise each request is sent over a brand new
/// connection, which is closed afterwards.
#[derive(Debug)]
pub struct Http1Transport {
    dialer: Dialer,
    tls: TlsPolicy,
    keep_alive: bool,
    compression: bool,
    timeout: Option<Duration>,
    idle: Mutex<Vec<Sender>>,
}

impl Http1Transport {
    pub fn new(dialer: Dialer, tls: TlsPolicy, keep_alive: bool, compression: bool, timeout: Option<Duration>) -> Self {
        Self {
            dialer,
            tls,
            keep_alive,
            compression,
            timeout,
            idle: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn tls(&self) -> &TlsPolicy {
        &self.tls
    }

    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[inline]
    pub fn compression(&self) -> bool {
        self.compression
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the number of idle connections in the pool.
    #[inline]
    pub fn num_idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn send(&self, mut request: Request<Full<Bytes>>) -> Result<StatusCode, TransportError> {
        if self.compression {
            request
                .headers_mut()
                .entry(header::ACCEPT_ENCODING)
                .or_insert(HeaderValue::from_static("gzip"));
        }

        let (sender, response) = match self.checkout() {
            Some(mut sender) => match sender.send_reused(request).await {
                Ok(response) => (sender, response),
                Err(SendError::Unsent(request)) => {
                    log::trace!("idle connection has been closed by peer, dialing a new one");
                    self.send_fresh(request).await?
                }
                Err(SendError::Failed(err)) => return Err(err),
            },
            None => self.send_fresh(request).await?,
        };

        let reusable = self.keep_alive && is_reusable(&response);
        let status = body::drain(response, self.compression).await?;

        if reusable {
            self.checkin(sender);
        }

        Ok(status)
    }

    async fn send_fresh(&self, mut request: Request<Full<Bytes>>) -> Result<(Sender, Response<Incoming>), TransportError> {
        let mut sender = self.dialer.connect().await?;

        if !self.keep_alive && sender.protocol() == Protocol::Http1 {
            request
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        let response = sender.send(request).await?;

        Ok((sender, response))
    }

    fn checkout(&self) -> Option<Sender> {
        if !self.keep_alive {
            return None;
        }

        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(sender) = idle.pop() {
            if !sender.is_closed() {
                return Some(sender);
            }
        }

        None
    }

    fn checkin(&self, sender: Sender) {
        if sender.is_closed() {
            return;
        }

        self.idle.lock().unwrap_or_else(PoisonError::into_inner).push(sender);
    }
}

/// Returns whether the connection the response came from can serve more
/// requests.
///
/// HTTP/1.1 connections are persistent unless "Connection: close" is sent,
/// while HTTP/1.0 ones are persistent only with explicit "keep-alive".
fn is_reusable<B>(response: &Response<B>) -> bool {
    let has_token = |token: &str| {
        response
            .headers()
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case(token))
    };

    if has_token("close") {
        return false;
    }

    match response.version() {
        Version::HTTP_09 | Version::HTTP_10 => has_token("keep-alive"),
        _ => true,
    }
}
