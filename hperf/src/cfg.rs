use core::time::Duration;

use crate::{cmd::Cmd, error::ConfigError, perf::PerfConfig, transport::TransportOptions};

/// Validated benchmark config.
///
/// Built once from the command line and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Target URL, always containing "://".
    pub host: String,
    pub method: String,
    /// Raw header specification, comma-separated "key:value" pairs.
    pub headers: String,
    pub payload: String,
    pub workers: usize,
    pub duration: Duration,
    /// Per-request timeout, if any.
    pub timeout: Option<Duration>,
    pub ssl: bool,
    pub session_resume: bool,
    pub false_start: bool,
    pub keep_alive: bool,
    pub compression: bool,
    pub h2: bool,
    /// Number of histogram bins in the report.
    pub bins: usize,
}

impl BenchmarkConfig {
    #[inline]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            keep_alive: self.keep_alive,
            compression: self.compression,
            h2: self.h2,
            timeout: self.timeout,
        }
    }

    #[inline]
    pub fn perf_config(&self) -> PerfConfig {
        PerfConfig {
            workers: self.workers,
            duration: self.duration,
            bins: self.bins,
        }
    }
}

impl TryFrom<Cmd> for BenchmarkConfig {
    type Error = ConfigError;

    fn try_from(cmd: Cmd) -> Result<Self, Self::Error> {
        let Cmd {
            host,
            method,
            header,
            payload,
            workers,
            duration,
            timeout,
            keepalive,
            compress,
            http2,
            ssl,
            session,
            alpn,
            bins,
            json: _,
            verbose: _,
        } = cmd;

        if host.is_empty() {
            return Err(ConfigError::InvalidArgument("host is required".to_owned()));
        }
        let workers = usize::try_from(workers)
            .map_err(|_| ConfigError::InvalidArgument(format!("worker count must be non-negative: {workers}")))?;
        let duration = u64::try_from(duration)
            .map_err(|_| ConfigError::InvalidArgument(format!("duration must be non-negative: {duration}")))?;
        if !host.contains("://") {
            return Err(ConfigError::InvalidHost(host));
        }

        // Non-positive values mean no timeout.
        let timeout = u64::try_from(timeout)
            .ok()
            .filter(|&v| v > 0)
            .map(Duration::from_secs);

        let m = Self {
            host,
            method,
            headers: header,
            payload,
            workers,
            duration: Duration::from_secs(duration),
            timeout,
            ssl,
            session_resume: session,
            false_start: alpn,
            keep_alive: keepalive,
            compression: compress,
            h2: http2,
            bins,
        };

        Ok(m)
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> Result<BenchmarkConfig, ConfigError> {
        let cmd = Cmd::try_parse_from(core::iter::once("hperf").chain(args.iter().copied())).unwrap();
        cmd.try_into()
    }

    #[test]
    fn valid_config() {
        let cfg = parse(&["--host", "https://example.com", "-N", "8", "--duration", "3", "--timeout", "1"]).unwrap();

        assert_eq!("https://example.com", cfg.host);
        assert_eq!(8, cfg.workers);
        assert_eq!(Duration::from_secs(3), cfg.duration);
        assert_eq!(Some(Duration::from_secs(1)), cfg.timeout);
        assert!(cfg.ssl && cfg.session_resume);
        assert!(!cfg.false_start && !cfg.keep_alive && !cfg.compression && !cfg.h2);

        let perf = cfg.perf_config();
        assert_eq!(8, perf.workers);
        assert_eq!(Duration::from_secs(3), perf.duration);
    }

    #[test]
    fn zero_timeout_means_none() {
        let cfg = parse(&["--host", "http://localhost", "--timeout", "0"]).unwrap();
        assert_eq!(None, cfg.timeout);
        assert_eq!(None, cfg.transport_options().timeout);
    }

    #[test]
    fn missing_host_is_invalid() {
        assert!(matches!(parse(&[]), Err(ConfigError::InvalidArgument(..))));
    }

    #[test]
    fn negative_numbers_are_invalid() {
        let err = parse(&["--host", "http://localhost", "-N", "-1"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidArgument(..)));

        let err = parse(&["--host", "http://localhost", "--duration", "-1"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidArgument(..)));
    }

    #[test]
    fn host_without_scheme_is_invalid() {
        let err = parse(&["--host", "example.com"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHost(..)));
    }

    #[test]
    fn toggles_are_mapped() {
        let cfg = parse(&[
            "--host",
            "https://example.com",
            "--keepalive",
            "--compress",
            "--http2",
            "--alpn",
            "--session=false",
        ])
        .unwrap();

        let opts = cfg.transport_options();
        assert!(opts.keep_alive && opts.compression && opts.h2);
        assert!(cfg.false_start);
        assert!(!cfg.session_resume);
    }
}
