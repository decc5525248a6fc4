//! TLS policy resolution.
//!
//! The command line exposes TLS as a bunch of loosely related toggles. Here
//! they are folded into a single [`TlsPolicy`] value, which is later
//! materialized into a [`rustls::ClientConfig`] by the transport.

use std::sync::Arc;

use rustls::{client::Resumption, ClientConfig, RootCertStore};

use crate::error::ConfigError;

/// Capacity of the client session cache used when session resumption is
/// requested.
pub const SESSION_CACHE_SIZE: usize = 128;

/// ALPN protocols offered for false start, in preference order.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Renegotiation policy applied to every TLS connection.
pub const RENEGOTIATION: Renegotiation = Renegotiation::FreelyAsClient;

/// TLS renegotiation support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renegotiation {
    /// Renegotiation is rejected.
    Never,
    /// A single server-initiated renegotiation is allowed per connection.
    OnceAsClient,
    /// Renegotiation requests are accepted as many times as asked.
    FreelyAsClient,
}

/// Resolved TLS policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    Disabled,
    Enabled(TlsSettings),
}

/// TLS settings of an enabled [`TlsPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// Name sent via SNI and verified against the server certificate.
    ///
    /// Never empty.
    pub server_name: String,
    /// Size of the client session cache, if session resumption is enabled.
    pub session_cache_size: Option<usize>,
    pub renegotiation: Renegotiation,
    /// Protocols offered via ALPN.
    ///
    /// Non-empty only when false start is requested.
    pub alpn_protocols: Vec<Vec<u8>>,
    /// Whether session tickets are accepted.
    pub session_tickets: bool,
}

impl TlsPolicy {
    /// Resolves the TLS policy from the command line toggles.
    ///
    /// When `ssl` is off all other toggles are ignored.
    pub fn resolve(ssl: bool, session_resume: bool, false_start: bool, host: &str) -> Result<Self, ConfigError> {
        if !ssl {
            return Ok(Self::Disabled);
        }

        let server_name = server_name(host)?.to_owned();

        let alpn_protocols = if false_start {
            ALPN_PROTOCOLS.iter().map(|v| v.to_vec()).collect()
        } else {
            Vec::new()
        };

        let (session_cache_size, session_tickets) = if session_resume {
            (Some(SESSION_CACHE_SIZE), true)
        } else {
            (None, false)
        };

        let settings = TlsSettings {
            server_name,
            session_cache_size,
            renegotiation: RENEGOTIATION,
            alpn_protocols,
            session_tickets,
        };

        Ok(Self::Enabled(settings))
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(..))
    }

    #[inline]
    pub fn settings(&self) -> Option<&TlsSettings> {
        match self {
            Self::Disabled => None,
            Self::Enabled(settings) => Some(settings),
        }
    }
}

impl TlsSettings {
    /// Settings used to talk to "https" targets while the TLS policy is
    /// disabled: no session resumption, no ALPN.
    pub fn baseline(server_name: String) -> Self {
        Self {
            server_name,
            session_cache_size: None,
            renegotiation: RENEGOTIATION,
            alpn_protocols: Vec::new(),
            session_tickets: false,
        }
    }

    /// Builds the rustls client config implementing these settings.
    ///
    /// Server certificates are verified against the Mozilla root store.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut cfg = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        cfg.alpn_protocols = self.alpn_protocols.clone();
        cfg.resumption = match self.session_cache_size {
            Some(size) if self.session_tickets => Resumption::in_memory_sessions(size),
            _ => Resumption::disabled(),
        };

        Ok(cfg)
    }
}

/// Extracts the TLS server name from the given URL.
///
/// The scheme prefix is stripped, as well as everything that can not be a
/// part of a server name: userinfo, port, path and query.
pub fn server_name(host: &str) -> Result<&str, ConfigError> {
    let invalid = || ConfigError::InvalidHost(host.to_owned());

    let (_scheme, rest) = host.split_once("://").ok_or_else(invalid)?;

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = match authority.rsplit_once('@') {
        Some((_userinfo, authority)) => authority,
        None => authority,
    };

    let name = match authority.strip_prefix('[') {
        Some(v) => v.split(']').next().unwrap_or_default(),
        None => authority.split(':').next().unwrap_or_default(),
    };

    if name.is_empty() {
        return Err(invalid());
    }

    Ok(name)
}
