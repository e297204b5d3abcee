//! CLI definition using clap derive. Every option can also be set from the
//! environment, which is how container deployments configure the proxy.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::TimeDelta;
use clap::Parser;

use acarsmux_relay::DEFAULT_UPSTREAM;

#[derive(Parser)]
#[command(
    name = "acarsmux",
    version,
    about = "Share one Hoppie ACARS account between several clients"
)]
pub struct Cli {
    /// Shared upstream logon code
    #[arg(long, env = "HOPPIE_LOGON", hide_env_values = true)]
    pub hoppie_logon: String,

    /// Comma-separated local logon codes allowed to use the proxy
    #[arg(long, env = "ALLOWED_LOGONS", hide_env_values = true)]
    pub allowed_logons: String,

    /// Upstream connect.html endpoint
    #[arg(long, env = "HOPPIE_UPSTREAM", default_value = DEFAULT_UPSTREAM)]
    pub upstream: String,

    /// Address the HTTP server binds to
    #[arg(long, env = "ACARSMUX_LISTEN", default_value = "0.0.0.0:80")]
    pub listen: SocketAddr,

    /// Minimum seconds between upstream polls for one callsign (0 = only
    /// coalesce concurrent polls)
    #[arg(long, env = "ACARSMUX_POLL_COALESCE_SECS", default_value_t = 0)]
    pub poll_coalesce_secs: u32,

    /// Upstream request timeout in seconds
    #[arg(
        long,
        env = "ACARSMUX_UPSTREAM_TIMEOUT_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub upstream_timeout_secs: u64,

    /// Seconds a sent telex/cpdlc is remembered for duplicate suppression
    /// (0 disables)
    #[arg(long, env = "ACARSMUX_SEND_DEDUP_SECS", default_value_t = 60)]
    pub send_dedup_secs: u32,
}

impl Cli {
    pub fn coalesce_window(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.poll_coalesce_secs))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Engine-side bound; slightly above the relay timeout so the relay's
    /// own error message wins when both would fire.
    pub fn fetch_timeout(&self) -> Duration {
        self.upstream_timeout() + Duration::from_secs(2)
    }

    pub fn send_dedup_window(&self) -> Option<TimeDelta> {
        (self.send_dedup_secs > 0).then(|| TimeDelta::seconds(i64::from(self.send_dedup_secs)))
    }
}
