//! Network availability checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::storage::RemoteConfig;
use crate::sync::ports::ConnectivityOracle;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Reports the network as available when a TCP connection to the remote
/// host succeeds.
///
/// Probing is async and happens in [`HostProbe::refresh`], either called
/// directly before a sync or from [`HostProbe::spawn_refresher`].
/// [`ConnectivityOracle::is_available`] only reads the last result.
#[derive(Debug)]
pub struct HostProbe {
    target: Option<(String, u16)>,
    timeout: Duration,
    reachable: ConnectivityFlag,
}

impl HostProbe {
    /// Probe the host of the configured remote URL.
    ///
    /// With no usable URL there is nothing to probe and the network is
    /// assumed available, leaving the configuration check to report it.
    /// Otherwise the host counts as unreachable until the first refresh.
    pub fn from_config(config: &RemoteConfig) -> Self {
        let target = url::Url::parse(config.url.trim()).ok().and_then(|url| {
            let host = url.host_str()?.to_string();
            let port = url.port_or_known_default()?;
            Some((host, port))
        });
        Self {
            reachable: ConnectivityFlag::new(target.is_none()),
            target,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Bound for the lookup and for each connection attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe now and record the result.
    pub async fn refresh(&self) -> bool {
        let available = match &self.target {
            None => true,
            Some((host, port)) => self.connect(host, *port).await,
        };
        if available != self.reachable.is_available() {
            tracing::info!(available, "network availability changed");
        }
        self.reachable.set(available);
        available
    }

    async fn connect(&self, host: &str, port: u16) -> bool {
        let addrs = match tokio::time::timeout(self.timeout, tokio::net::lookup_host((host, port)))
            .await
        {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                tracing::debug!(host, error = %e, "host did not resolve");
                return false;
            }
            Err(_) => {
                tracing::debug!(host, "host lookup timed out");
                return false;
            }
        };
        for addr in addrs {
            if let Ok(Ok(_)) = tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
                return true;
            }
        }
        false
    }

    /// Refresh on a background task every `every` until the handle is
    /// aborted. The first probe runs immediately.
    pub fn spawn_refresher(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let probe = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                probe.refresh().await;
            }
        })
    }
}

impl ConnectivityOracle for HostProbe {
    fn is_available(&self) -> bool {
        self.reachable.is_available()
    }
}

/// Connectivity switched by the caller, e.g. for an `--offline` flag.
#[derive(Debug)]
pub struct ConnectivityFlag(AtomicBool);

impl ConnectivityFlag {
    pub fn new(available: bool) -> Self {
        Self(AtomicBool::new(available))
    }

    pub fn set(&self, available: bool) {
        self.0.store(available, Ordering::SeqCst);
    }
}

impl ConnectivityOracle for ConnectivityFlag {
    fn is_available(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
