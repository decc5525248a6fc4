use clap::{ArgAction, Parser};

use crate::perf::DEFAULT_BINS;

/// HTTP benchmark driver.
///
/// Sends the same request from many concurrent workers for a fixed duration
/// and reports throughput, error rate and latency distribution.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Cmd {
    /// Target URL, including the scheme, e.g. "https://example.com/".
    #[clap(long, default_value = "")]
    pub host: String,
    /// Request method.
    #[clap(short = 'X', default_value = "GET")]
    pub method: String,
    /// Request headers as comma-separated "key:value" pairs.
    #[clap(short = 'H', default_value = "")]
    pub header: String,
    /// Request payload.
    #[clap(short = 'D', default_value = "")]
    pub payload: String,
    /// Number of concurrent workers.
    #[clap(short = 'N', default_value_t = 1, allow_negative_numbers = true)]
    pub workers: i64,
    /// Benchmark duration in seconds.
    #[clap(long, default_value_t = 10, allow_negative_numbers = true)]
    pub duration: i64,
    /// Timeout for each request in seconds.
    ///
    /// Zero means no timeout.
    #[clap(long, default_value_t = 0, allow_negative_numbers = true)]
    pub timeout: i64,
    /// Keep TCP connections alive between requests.
    #[clap(long, default_value_t = false, num_args = 0..=1, require_equals = true, default_missing_value = "true", action = ArgAction::Set)]
    pub keepalive: bool,
    /// Enable response compression.
    #[clap(long, default_value_t = false, num_args = 0..=1, require_equals = true, default_missing_value = "true", action = ArgAction::Set)]
    pub compress: bool,
    /// Use HTTP/2.
    #[clap(long, default_value_t = false, num_args = 0..=1, require_equals = true, default_missing_value = "true", action = ArgAction::Set)]
    pub http2: bool,
    /// Enable TLS.
    #[clap(long, default_value_t = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", action = ArgAction::Set)]
    pub ssl: bool,
    /// Enable TLS session resumption.
    #[clap(long, default_value_t = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", action = ArgAction::Set)]
    pub session: bool,
    /// Enable TLS false start via ALPN.
    #[clap(long, default_value_t = false, num_args = 0..=1, require_equals = true, default_missing_value = "true", action = ArgAction::Set)]
    pub alpn: bool,
    /// Number of latency histogram bins in the report.
    #[clap(long, default_value_t = DEFAULT_BINS)]
    pub bins: usize,
    /// Print the report as JSON.
    #[clap(long)]
    pub json: bool,
    /// Be verbose in terms of logging.
    #[clap(short, action = ArgAction::Count)]
    pub verbose: u8,
}
