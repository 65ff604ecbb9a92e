//! Port-to-process lookup service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::domain::{ProcessInfo, ProtocolFilter};
use crate::error::Result;
use crate::ports::PlatformAdapter;

/// Delay between two checks while waiting on a port.
pub const PORT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Application service for finding the processes that own ports.
///
/// This service sits directly on a `PlatformAdapter`, adding error
/// normalization, bulk lookups and polling waits on top of it.
pub struct ProcessFinder<A> {
    adapter: Arc<A>,
}

impl<A> Clone for ProcessFinder<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
        }
    }
}

impl<A: PlatformAdapter> ProcessFinder<A> {
    /// Create a new finder over the given adapter.
    pub fn new(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Find the processes owning `port`.
    ///
    /// "Not found" is an empty list. Hard failures (command, permission)
    /// are logged and returned.
    pub async fn find_by_port(
        &self,
        port: u16,
        protocol: ProtocolFilter,
    ) -> Result<Vec<ProcessInfo>> {
        match self.adapter.find_processes_by_port(port, protocol).await {
            Ok(processes) => {
                debug!(port = port, %protocol, found = processes.len(), "Found processes");
                Ok(processes)
            }
            Err(e) if e.is_process_gone() => Ok(Vec::new()),
            Err(e) => {
                warn!(port = port, %protocol, error = %e, "Failed to find processes on port");
                Err(e.with_port(port))
            }
        }
    }

    /// Look up several ports concurrently, keeping each port's outcome.
    pub async fn try_find_by_ports(
        &self,
        ports: &[u16],
        protocol: ProtocolFilter,
    ) -> HashMap<u16, Result<Vec<ProcessInfo>>> {
        let mut unique = ports.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let lookups = unique.iter().map(|&port| self.find_by_port(port, protocol));
        unique.iter().copied().zip(join_all(lookups).await).collect()
    }

    /// Look up several ports; a failed port maps to an empty list.
    pub async fn find_by_ports(
        &self,
        ports: &[u16],
        protocol: ProtocolFilter,
    ) -> HashMap<u16, Vec<ProcessInfo>> {
        self.try_find_by_ports(ports, protocol)
            .await
            .into_iter()
            .map(|(port, result)| (port, result.unwrap_or_default()))
            .collect()
    }

    /// True iff nothing owns `port`.
    ///
    /// A failed lookup counts as busy: something may still hold the port.
    pub async fn is_port_available(&self, port: u16, protocol: ProtocolFilter) -> bool {
        matches!(self.find_by_port(port, protocol).await, Ok(p) if p.is_empty())
    }

    /// Poll until `port` is free. Returns false on timeout.
    pub async fn wait_for_port_to_be_available(
        &self,
        port: u16,
        timeout: Duration,
        protocol: ProtocolFilter,
    ) -> bool {
        self.wait_until(port, timeout, protocol, true).await
    }

    /// Poll until something owns `port`. Returns false on timeout.
    pub async fn wait_for_port_to_be_busy(
        &self,
        port: u16,
        timeout: Duration,
        protocol: ProtocolFilter,
    ) -> bool {
        self.wait_until(port, timeout, protocol, false).await
    }

    async fn wait_until(
        &self,
        port: u16,
        timeout: Duration,
        protocol: ProtocolFilter,
        available: bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_port_available(port, protocol).await == available {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(port = port, available, "Gave up waiting on port");
                return false;
            }
            sleep(PORT_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{LookupFailure, MockAdapter};
    use crate::domain::Protocol;
    use crate::error::Error;
    use tokio_test::assert_err;

    fn finder(adapter: MockAdapter) -> ProcessFinder<MockAdapter> {
        ProcessFinder::new(Arc::new(adapter))
    }

    #[tokio::test]
    async fn test_find_by_port_filters_protocol() {
        let finder = finder(
            MockAdapter::new()
                .listen(100, "dns", 5353, Protocol::Tcp)
                .listen(100, "dns", 5353, Protocol::Udp),
        );

        let both = finder.find_by_port(5353, ProtocolFilter::Both).await.unwrap();
        assert_eq!(both.len(), 2);
        assert_eq!(both[0].protocol, Protocol::Tcp);
        assert_eq!(both[1].protocol, Protocol::Udp);

        let tcp = finder.find_by_port(5353, ProtocolFilter::Tcp).await.unwrap();
        assert_eq!(tcp.len(), 1);
        assert_eq!(tcp[0].protocol, Protocol::Tcp);
    }

    #[tokio::test]
    async fn test_find_by_port_propagates_hard_failures() {
        let finder = finder(
            MockAdapter::new().fail_lookup(3000, LookupFailure::Command("boom".to_string())),
        );

        let err = assert_err!(finder.find_by_port(3000, ProtocolFilter::Both).await);
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(!finder.is_port_available(3000, ProtocolFilter::Both).await);
    }

    #[tokio::test]
    async fn test_find_by_ports_isolates_failures() {
        let finder = finder(
            MockAdapter::new()
                .listen(7, "api", 8080, Protocol::Tcp)
                .fail_lookup(3000, LookupFailure::Denied),
        );

        let outcomes = finder
            .try_find_by_ports(&[3000, 8080, 9090, 8080], ProtocolFilter::Both)
            .await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[&3000].as_ref().unwrap_err().port(), Some(3000));
        assert_eq!(outcomes[&8080].as_ref().unwrap()[0].pid, 7);
        assert!(outcomes[&9090].as_ref().unwrap().is_empty());
        let looked_up = finder.adapter().lookups();
        assert_eq!(looked_up.iter().filter(|&&p| p == 8080).count(), 1);
        assert_eq!(looked_up.len(), 3);

        let found = finder.find_by_ports(&[3000, 8080], ProtocolFilter::Both).await;
        assert!(found[&3000].is_empty());
        assert_eq!(found[&8080].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_free_port_returns_promptly() {
        let finder = finder(MockAdapter::new());

        let start = Instant::now();
        let freed = finder
            .wait_for_port_to_be_available(3000, Duration::from_secs(10), ProtocolFilter::Both)
            .await;
        assert!(freed);
        assert!(start.elapsed() < PORT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_process_exits() {
        let adapter = Arc::new(MockAdapter::new().listen(42, "node", 3000, Protocol::Tcp));
        let finder = ProcessFinder::new(Arc::clone(&adapter));

        let background = Arc::clone(&adapter);
        tokio::spawn(async move {
            sleep(Duration::from_millis(1_100)).await;
            background.exit(42);
        });

        let start = Instant::now();
        let freed = finder
            .wait_for_port_to_be_available(3000, Duration::from_secs(5), ProtocolFilter::Both)
            .await;
        assert!(freed);
        assert!(start.elapsed() >= Duration::from_millis(1_100));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_on_wall_clock() {
        let finder = finder(MockAdapter::new().listen(42, "node", 3000, Protocol::Tcp));

        let start = Instant::now();
        let freed = finder
            .wait_for_port_to_be_available(3000, Duration::from_millis(900), ProtocolFilter::Both)
            .await;
        assert!(!freed);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(900) + PORT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_busy_port() {
        let adapter = Arc::new(MockAdapter::new());
        let finder = ProcessFinder::new(Arc::clone(&adapter));

        assert!(
            !finder
                .wait_for_port_to_be_busy(4000, Duration::from_millis(500), ProtocolFilter::Both)
                .await
        );

        let background = Arc::clone(&adapter);
        tokio::spawn(async move {
            sleep(Duration::from_millis(300)).await;
            background.bind(ProcessInfo::new(9, "vite", 4000, Protocol::Tcp));
        });
        assert!(
            finder
                .wait_for_port_to_be_busy(4000, Duration::from_secs(2), ProtocolFilter::Tcp)
                .await
        );
    }
}
