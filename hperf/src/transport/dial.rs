use core::{
    fmt::{self, Debug, Formatter},
    pin::Pin,
    task::{Context, Poll},
};
use std::{io, sync::Arc};

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Request, Response, Uri, Version};
use http_body_util::Full;
use hyper::{
    body::Incoming,
    client::conn::{http1, http2},
};
use hyper_util::rt::{TokioExecutor, TokioIo};
use pin_project_lite::pin_project;
use rustls::pki_types::ServerName;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
};
use tokio_rustls::{client::TlsStream, TlsConnector};

use super::Protocol;
use crate::{
    error::{ConfigError, TransportError},
    tls::{TlsPolicy, TlsSettings},
};

/// Establishes new connections to the target.
pub struct Dialer {
    /// Target host, without brackets for IPv6 literals.
    host: String,
    port: u16,
    tls: Option<TlsDialer>,
}

struct TlsDialer {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl Dialer {
    /// Creates a dialer for the given absolute URL.
    ///
    /// TLS is used for "https" URLs only. The [`TlsPolicy`] defines how
    /// exactly it is configured. HTTP/2 connections over TLS always offer
    /// "h2" via ALPN.
    pub fn new(uri: &Uri, tls: &TlsPolicy, protocol: Protocol) -> Result<Self, ConfigError> {
        let authority = uri
            .authority()
            .ok_or_else(|| ConfigError::InvalidHost(uri.to_string()))?;
        let https = uri.scheme_str() == Some("https");

        let host = authority.host().trim_start_matches('[').trim_end_matches(']').to_owned();
        let port = authority.port_u16().unwrap_or(if https { 443 } else { 80 });

        let settings = match (tls, https) {
            (TlsPolicy::Enabled(settings), true) => Some(settings.clone()),
            (TlsPolicy::Enabled(..), false) => {
                log::warn!("TLS is enabled, but '{uri}' is not an https URL: falling back to plain HTTP");
                None
            }
            (TlsPolicy::Disabled, true) => {
                log::warn!("TLS is disabled, but '{uri}' is an https URL: using baseline TLS settings");
                Some(TlsSettings::baseline(host.clone()))
            }
            (TlsPolicy::Disabled, false) => None,
        };

        let tls = match settings {
            Some(settings) => Some(TlsDialer::new(&settings, protocol)?),
            None => None,
        };

        let m = Self { host, port, tls };

        Ok(m)
    }

    /// Returns whether connections made by this dialer are encrypted.
    #[inline]
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Opens a new connection speaking HTTP/1.1, unless "h2" was negotiated
    /// via ALPN.
    pub async fn connect(&self) -> Result<Sender, TransportError> {
        let (stream, protocol) = self.stream(Protocol::Http1).await?;

        match protocol {
            Protocol::Http1 => {
                let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        log::trace!("connection failed: {err}");
                    }
                });

                Ok(Sender::Http1(sender))
            }
            Protocol::Http2 => Ok(Sender::Http2(Self::handshake_http2(stream).await?)),
        }
    }

    /// Opens a new HTTP/2 connection.
    ///
    /// Cleartext connections use prior knowledge.
    pub async fn connect_http2(&self) -> Result<http2::SendRequest<Full<Bytes>>, TransportError> {
        let (stream, _protocol) = self.stream(Protocol::Http2).await?;

        Self::handshake_http2(stream).await
    }

    async fn handshake_http2(stream: Stream) -> Result<http2::SendRequest<Full<Bytes>>, TransportError> {
        let (sender, conn) = http2::handshake(TokioExecutor::new(), TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                log::trace!("connection failed: {err}");
            }
        });

        Ok(sender)
    }

    /// Connects to the target, performing TLS handshake if required.
    ///
    /// Returns the stream with the protocol to speak over it.
    async fn stream(&self, protocol: Protocol) -> Result<(Stream, Protocol), TransportError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(TransportError::Connect)?;
        stream.set_nodelay(true).map_err(TransportError::Connect)?;

        let Some(tls) = &self.tls else {
            return Ok((Stream::Plain { inner: stream }, protocol));
        };

        let stream = tls
            .connector
            .connect(tls.server_name.clone(), stream)
            .await
            .map_err(TransportError::Tls)?;

        let protocol = match stream.get_ref().1.alpn_protocol() {
            Some(b"h2") => Protocol::Http2,
            _ => protocol,
        };

        Ok((Stream::Tls { inner: stream }, protocol))
    }
}

impl Debug for Dialer {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        fmt.debug_struct("Dialer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls.as_ref().map(|v| &v.server_name))
            .finish()
    }
}

impl TlsDialer {
    fn new(settings: &TlsSettings, protocol: Protocol) -> Result<Self, ConfigError> {
        let mut cfg = settings.client_config()?;
        if protocol == Protocol::Http2 && !cfg.alpn_protocols.iter().any(|v| v == b"h2") {
            cfg.alpn_protocols.insert(0, b"h2".to_vec());
        }

        let server_name = ServerName::try_from(settings.server_name.clone())
            .map_err(|err| ConfigError::InvalidHost(format!("{}: {err}", settings.server_name)))?;

        let m = Self {
            connector: TlsConnector::from(Arc::new(cfg)),
            server_name,
        };

        Ok(m)
    }
}

/// Request sender bound to a single connection.
#[derive(Debug)]
pub enum Sender {
    Http1(http1::SendRequest<Full<Bytes>>),
    Http2(http2::SendRequest<Full<Bytes>>),
}

impl Sender {
    #[inline]
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http1(..) => Protocol::Http1,
            Self::Http2(..) => Protocol::Http2,
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Http1(sender) => sender.is_closed(),
            Self::Http2(sender) => sender.is_closed(),
        }
    }

    /// Sends the given request, waiting for the connection to become ready
    /// first.
    ///
    /// The request URI must be absolute. For HTTP/1.1 it is converted into
    /// the origin form, while the authority moves into the "Host" header.
    pub async fn send(&mut self, mut request: Request<Full<Bytes>>) -> Result<Response<Incoming>, TransportError> {
        let response = match self {
            Self::Http1(sender) => {
                sender.ready().await?;
                sender.send_request(into_origin_form(request)).await?
            }
            Self::Http2(sender) => {
                into_http2(&mut request);
                sender.ready().await?;
                sender.send_request(request).await?
            }
        };

        Ok(response)
    }

    /// Sends the given request over a connection taken from an idle pool.
    ///
    /// The peer may have closed such connection at any moment. If that
    /// happens before the request is written, the request is handed back
    /// with [`SendError::Unsent`], so it can be sent over a new connection.
    pub async fn send_reused(&mut self, mut request: Request<Full<Bytes>>) -> Result<Response<Incoming>, SendError> {
        let result = match self {
            Self::Http1(sender) => {
                if sender.ready().await.is_err() {
                    return Err(SendError::Unsent(request));
                }
                sender.try_send_request(into_origin_form(request)).await
            }
            Self::Http2(sender) => {
                into_http2(&mut request);
                if sender.ready().await.is_err() {
                    return Err(SendError::Unsent(request));
                }
                sender.try_send_request(request).await
            }
        };

        result.map_err(|mut err| match err.take_message() {
            Some(request) => SendError::Unsent(request),
            None => SendError::Failed(err.into_error().into()),
        })
    }
}

/// Error of sending a request over a reused connection.
#[derive(Debug)]
pub enum SendError {
    /// The connection turned out to be closed before the request was
    /// written.
    Unsent(Request<Full<Bytes>>),
    Failed(TransportError),
}

/// Headers that are meaningful for a single HTTP/1.x connection only and are
/// forbidden in HTTP/2.
const CONNECTION_HEADERS: [&str; 4] = ["connection", "keep-alive", "transfer-encoding", "upgrade"];

/// Prepares the request to be sent over HTTP/2.
pub(super) fn into_http2(request: &mut Request<Full<Bytes>>) {
    *request.version_mut() = Version::HTTP_2;
    strip_connection_headers(request.headers_mut());
}

fn strip_connection_headers(headers: &mut HeaderMap) {
    for name in CONNECTION_HEADERS {
        headers.remove(name);
    }
}

fn into_origin_form(mut request: Request<Full<Bytes>>) -> Request<Full<Bytes>> {
    if !request.headers().contains_key(header::HOST) {
        let host = request
            .uri()
            .authority()
            .and_then(|v| HeaderValue::from_str(v.as_str()).ok());
        if let Some(host) = host {
            request.headers_mut().insert(header::HOST, host);
        }
    }

    // Targets like "http://host?q=1" have an empty path.
    let target = match request.uri().path_and_query() {
        Some(pq) => {
            let path = match pq.path() {
                "" => "/",
                path => path,
            };
            match pq.query() {
                Some(query) => format!("{path}?{query}"),
                None => path.to_owned(),
            }
        }
        None => "/".to_owned(),
    };
    *request.uri_mut() = target.parse().unwrap_or_else(|_| Uri::from_static("/"));

    request
}

// Either plain or encrypted TCP stream.
pin_project! {
    #[project = StreamProj]
    pub enum Stream {
        Plain { #[pin] inner: TcpStream },
        Tls { #[pin] inner: TlsStream<TcpStream> },
    }
}

impl AsyncRead for Stream {
    #[inline]
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            StreamProj::Plain { inner } => inner.poll_read(cx, buf),
            StreamProj::Tls { inner } => inner.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    #[inline]
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.project() {
            StreamProj::Plain { inner } => inner.poll_write(cx, buf),
            StreamProj::Tls { inner } => inner.poll_write(cx, buf),
        }
    }

    #[inline]
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            StreamProj::Plain { inner } => inner.poll_flush(cx),
            StreamProj::Tls { inner } => inner.poll_flush(cx),
        }
    }

    #[inline]
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            StreamProj::Plain { inner } => inner.poll_shutdown(cx),
            StreamProj::Tls { inner } => inner.poll_shutdown(cx),
        }
    }
}
