//! Connectivity Probe
//!
//! Determines whether a destination is directly reachable by making a real
//! connection attempt: a bare TCP connect, or TCP plus a TLS handshake when
//! the destination port is the TLS port. Probe failures are not errors,
//! they are the signal that drives the auto-proxy classification.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Reachability check for a destination host and port
///
/// `check` never fails; timeouts and connection errors uniformly collapse
/// to "unreachable".
#[async_trait]
pub trait Prober: Send + Sync {
    async fn check(&self, host: &str, port: u16) -> bool;
}

/// Probe that dials the destination for real
pub struct ConnectivityProbe {
    connect_timeout: Duration,
    tls_port: u16,
    tls: TlsConnector,
}

impl ConnectivityProbe {
    /// Create a probe with the given connection timeout and TLS port.
    pub fn new(connect_timeout: Duration, tls_port: u16) -> Self {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            connect_timeout,
            tls_port,
            tls: TlsConnector::from(Arc::new(config)),
        }
    }

    async fn connect(&self, host: &str, port: u16) -> Option<TcpStream> {
        match timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => Some(stream),
            Ok(Err(e)) => {
                debug!("? connect error: {}:{}: {}", host, port, e);
                None
            }
            Err(_) => {
                debug!("? connect timeout: {}:{}", host, port);
                None
            }
        }
    }

    async fn check_tcp(&self, host: &str, port: u16) -> bool {
        // The stream is dropped as soon as the connect outcome is known.
        self.connect(host, port).await.is_some()
    }

    async fn check_tls(&self, host: &str, port: u16) -> bool {
        let Some(stream) = self.connect(host, port).await else {
            return false;
        };
        let name = match ServerName::try_from(host.to_string()) {
            Ok(name) => name,
            Err(e) => {
                debug!("? invalid tls server name: {}: {}", host, e);
                return false;
            }
        };
        match timeout(self.connect_timeout, self.tls.connect(name, stream)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("? tls handshake error: {}:{}: {}", host, port, e);
                false
            }
            Err(_) => {
                debug!("? tls handshake timeout: {}:{}", host, port);
                false
            }
        }
    }
}

#[async_trait]
impl Prober for ConnectivityProbe {
    async fn check(&self, host: &str, port: u16) -> bool {
        if port == self.tls_port {
            self.check_tls(host, port).await
        } else {
            self.check_tcp(host, port).await
        }
    }
}

/// Deduplicating wrapper around a probe
///
/// At most one probe per `host:port` key is in flight at a time. The first
/// caller for a key starts the probe as a detached task; every caller for
/// the key, first included, parks on a oneshot waiter and all receive the
/// probe's result. Detaching matters: a caller abandoning its `check`
/// future must not strand the in-flight entry, the probe runs to
/// completion and drains the remaining waiters regardless. The entry is
/// removed before waiters are released, so a later call with the same key
/// starts a fresh probe.
pub struct ProbeDeduper {
    inner: Arc<dyn Prober>,
    inflight: Arc<Mutex<HashMap<String, Vec<oneshot::Sender<bool>>>>>,
}

impl ProbeDeduper {
    pub fn new(inner: Arc<dyn Prober>) -> Self {
        Self {
            inner,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl Prober for ProbeDeduper {
    async fn check(&self, host: &str, port: u16) -> bool {
        let key = format!("{}:{}", host, port);
        let (tx, rx) = oneshot::channel();

        {
            let mut inflight = self.inflight.lock().await;
            match inflight.entry(key.clone()) {
                Entry::Occupied(mut entry) => {
                    debug!("probe for {} already in flight, waiting", key);
                    entry.get_mut().push(tx);
                }
                Entry::Vacant(entry) => {
                    entry.insert(vec![tx]);
                    let inner = Arc::clone(&self.inner);
                    let inflight = Arc::clone(&self.inflight);
                    let host = host.to_string();
                    tokio::spawn(async move {
                        let reachable = inner.check(&host, port).await;
                        let waiters = inflight.lock().await.remove(&key).unwrap_or_default();
                        for tx in waiters {
                            let _ = tx.send(reachable);
                        }
                    });
                }
            }
        }

        // A dropped sender means the probe task went away; treat the
        // destination as unreachable.
        rx.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowProbe {
        calls: AtomicUsize,
        result: bool,
        delay: Duration,
    }

    #[async_trait]
    impl Prober for SlowProbe {
        async fn check(&self, _host: &str, _port: u16) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result
        }
    }

    #[tokio::test]
    async fn test_concurrent_checks_share_one_probe() {
        let inner = Arc::new(SlowProbe {
            calls: AtomicUsize::new(0),
            result: true,
            delay: Duration::from_millis(100),
        });
        let deduper = Arc::new(ProbeDeduper::new(inner.clone() as Arc<dyn Prober>));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let deduper = Arc::clone(&deduper);
            handles.push(tokio::spawn(async move {
                deduper.check("example.com", 80).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completed_probe_is_not_cached() {
        let inner = Arc::new(SlowProbe {
            calls: AtomicUsize::new(0),
            result: false,
            delay: Duration::from_millis(1),
        });
        let deduper = ProbeDeduper::new(inner.clone() as Arc<dyn Prober>);

        assert!(!deduper.check("example.com", 80).await);
        assert!(!deduper.check("example.com", 80).await);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_strand_the_key() {
        let inner = Arc::new(SlowProbe {
            calls: AtomicUsize::new(0),
            result: true,
            delay: Duration::from_millis(200),
        });
        let deduper = Arc::new(ProbeDeduper::new(inner.clone() as Arc<dyn Prober>));

        // First caller starts the probe, then abandons it mid-flight, the
        // way a caller-side timeout around a decide would.
        let owner = {
            let deduper = Arc::clone(&deduper);
            tokio::spawn(async move { deduper.check("example.com", 80).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        owner.abort();

        // A later check for the same key must still complete: the probe
        // finishes detached and drains its waiters.
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            deduper.check("example.com", 80),
        )
        .await
        .expect("check must not hang after the first caller went away");
        assert!(result);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_probe_independently() {
        let inner = Arc::new(SlowProbe {
            calls: AtomicUsize::new(0),
            result: true,
            delay: Duration::from_millis(10),
        });
        let deduper = Arc::new(ProbeDeduper::new(inner.clone() as Arc<dyn Prober>));

        let a = {
            let deduper = Arc::clone(&deduper);
            tokio::spawn(async move { deduper.check("example.com", 80).await })
        };
        let b = {
            let deduper = Arc::clone(&deduper);
            tokio::spawn(async move { deduper.check("example.com", 443).await })
        };

        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_probe_connect_refused() {
        // Port 1 on loopback is assumed closed; connect is refused fast.
        let probe = ConnectivityProbe::new(Duration::from_secs(2), 443);
        assert!(!probe.check("127.0.0.1", 1).await);
    }

    #[tokio::test]
    async fn test_reachable_probe_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = ConnectivityProbe::new(Duration::from_secs(2), 443);
        assert!(probe.check("127.0.0.1", port).await);
    }
}
