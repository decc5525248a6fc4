use core::future::Future;
use std::sync::Arc;

use crate::{
    cfg::BenchmarkConfig,
    error::{ConfigError, TrialError},
    outcome::Outcome,
    perf::Job,
    request::RequestTemplate,
    tls::TlsPolicy,
    transport::Transport,
};

/// The benchmark callback.
///
/// Holds the shared read-only transport and request template. Every call
/// materializes a new request, so the same instance can be called from any
/// number of workers concurrently.
#[derive(Debug, Clone)]
pub struct Benchmark {
    transport: Arc<Transport>,
    template: Arc<RequestTemplate>,
}

impl Benchmark {
    /// Resolves the request template, TLS policy and transport from the
    /// config.
    pub fn new(cfg: &BenchmarkConfig) -> Result<Self, ConfigError> {
        let template = RequestTemplate::new(&cfg.method, &cfg.host, &cfg.headers, &cfg.payload)?;

        let tls = TlsPolicy::resolve(cfg.ssl, cfg.session_resume, cfg.false_start, &cfg.host)?;
        log::debug!("resolved TLS policy: {tls:?}");

        let transport = Transport::select(&cfg.transport_options(), tls, template.uri())?;

        Ok(Self::from_parts(transport, template))
    }

    pub fn from_parts(transport: Transport, template: RequestTemplate) -> Self {
        Self {
            transport: Arc::new(transport),
            template: Arc::new(template),
        }
    }

    #[inline]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    #[inline]
    pub fn template(&self) -> &RequestTemplate {
        &self.template
    }

    /// Performs a single trial.
    pub async fn call(&self) -> Result<(), TrialError> {
        let request = self.template.request();
        let result = self.transport.send(request).await;

        Outcome::classify(result).into_result()
    }
}

impl Job for Benchmark {
    #[inline]
    fn call(&self) -> impl Future<Output = Result<(), TrialError>> + Send {
        Benchmark::call(self)
    }
}
