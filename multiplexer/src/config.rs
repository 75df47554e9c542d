use std::net::SocketAddr;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:8080")]
    pub address: SocketAddr,

    /// Requests admitted per second before the transport answers 429.
    #[envconfig(default = "100")]
    pub incoming_limit: i64,

    /// Concurrent upstream fetches per collect batch.
    #[envconfig(default = "4")]
    pub outgoing_limit: usize,

    /// Largest URL list a single request may carry.
    #[envconfig(default = "20")]
    pub max_urls: usize,

    /// Per-URL fetch deadline.
    #[envconfig(default = "1000")]
    pub collect_timeout_ms: EnvMsDuration,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    /// Permanent fetchers: enough to serve a full batch for every request
    /// the admission gate lets through in one window.
    pub fn fixed_fetchers(&self) -> usize {
        self.incoming_limit.max(0) as usize * self.outgoing_limit
    }

    /// Elastic headroom: room to stretch every batch to `max_urls` targets,
    /// minus the permanent tier.
    pub fn overflow_fetchers(&self) -> usize {
        (self.fixed_fetchers() * (self.max_urls / self.outgoing_limit))
            .saturating_sub(self.fixed_fetchers())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
