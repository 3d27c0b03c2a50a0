//! Per-device UDP sockets: receive telegrams, relay them to the DVR.
//!
//! For every configured device the multiplexer holds:
//!
//! - a **listen socket** bound to the device's `listen_address:pdv_port`,
//!   with one receive task reading it;
//! - when the device has a complete downstream target, a **forward socket**
//!   bound to `0.0.0.0:origin_port`, so the DVR always sees the device's
//!   telegrams arriving from the same fixed source port.
//!
//! Devices that share a listen port share the socket (the OS would refuse a
//! second bind anyway); datagrams on a shared socket are attributed to the
//! device whose `pdv_ip` matches the sender.  Devices that share an origin
//! port share the forward socket.
//!
//! Each datagram is relayed first, then handed to the device pump.  A relay
//! failure is logged and never stops reception.
//!
//! # Reconfiguration
//!
//! [`SocketMultiplexer::reconfigure`] applies a new device registry without a
//! listening gap: sockets whose address is unchanged are carried over, new
//! sockets are bound before old ones are dropped, and only sockets no longer
//! referenced are closed.
//!
//! # Bind failures
//!
//! A socket that cannot be bound (port in use, no permission) is reported in
//! the [`ApplyReport`].  A device that already had a socket keeps it: its
//! old listen socket or origin port stays in service until a later apply
//! binds the new one.  A device with nothing to fall back to is skipped; the
//! remaining devices still run.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use pdv_core::{DeviceId, DeviceRegistry, DownstreamTarget};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::application::device_pump::DeviceDatagram;

/// Largest datagram accepted from a PDV.
pub const MAX_DATAGRAM: usize = 65_535;

/// Pause after a receive error before reading again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The socket could not be bound to its address.
    #[error("failed to bind UDP socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A telegram could not be relayed downstream.
    #[error("failed to relay {device} to {peer}: {source}")]
    ForwardFailed {
        device: DeviceId,
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Summary of an apply (start or reconfigure) pass.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Listen sockets now running.
    pub listening: usize,
    /// Forward sockets now open.
    pub forwarding: usize,
    /// Sockets that could not be bound.
    pub failures: Vec<SocketError>,
}

impl ApplyReport {
    /// Every configured device is unreachable.
    pub fn nothing_bound(&self) -> bool {
        self.listening == 0 && !self.failures.is_empty()
    }
}

#[derive(Clone)]
struct ForwardRoute {
    socket: Arc<UdpSocket>,
    target: DownstreamTarget,
}

#[derive(Clone)]
struct DeviceRoute {
    device: DeviceId,
    pdv_ip: IpAddr,
    forward: Option<ForwardRoute>,
}

/// Devices served by one listen socket.
struct ListenRoutes {
    devices: Vec<DeviceRoute>,
}

impl ListenRoutes {
    /// Attributes a datagram to a device.
    ///
    /// The sender's IP selects the device.  A socket that serves a single
    /// device attributes every datagram to it (the PDV may sit behind NAT);
    /// otherwise an unknown sender is identified by its IP and not relayed.
    fn resolve(&self, sender: IpAddr) -> (DeviceId, Option<&ForwardRoute>) {
        if let Some(route) = self.devices.iter().find(|r| r.pdv_ip == sender) {
            return (route.device.clone(), route.forward.as_ref());
        }
        match self.devices.as_slice() {
            [only] => (only.device.clone(), only.forward.as_ref()),
            _ => (sender.to_string(), None),
        }
    }
}

struct ListenBinding {
    socket: Arc<UdpSocket>,
    task: JoinHandle<()>,
}

/// Sockets a device is served by after the last apply.
struct Assignment {
    listen_addr: SocketAddr,
    forward: Option<ForwardRoute>,
}

/// Owns every device socket and receive task.
pub struct SocketMultiplexer {
    listeners: HashMap<SocketAddr, ListenBinding>,
    forwarders: HashMap<u16, Arc<UdpSocket>>,
    assignments: HashMap<DeviceId, Assignment>,
    inbound: mpsc::Sender<DeviceDatagram>,
}

impl SocketMultiplexer {
    /// Creates an idle multiplexer that will feed `inbound`.
    pub fn new(inbound: mpsc::Sender<DeviceDatagram>) -> Self {
        Self {
            listeners: HashMap::new(),
            forwarders: HashMap::new(),
            assignments: HashMap::new(),
            inbound,
        }
    }

    /// Binds sockets for every device in `registry`.
    pub async fn start(
        registry: &DeviceRegistry,
        inbound: mpsc::Sender<DeviceDatagram>,
    ) -> (Self, ApplyReport) {
        let mut mux = Self::new(inbound);
        let report = mux.reconfigure(registry).await;
        (mux, report)
    }

    /// Applies a new device registry, keeping sockets whose address did not
    /// change.
    ///
    /// A device whose new listen address or origin port cannot be bound
    /// stays on the socket it had before, and the bind failure is reported.
    pub async fn reconfigure(&mut self, registry: &DeviceRegistry) -> ApplyReport {
        let mut report = ApplyReport::default();

        // ── Forward sockets, keyed by origin port ─────────────────────────────
        let mut forwarders: HashMap<u16, Arc<UdpSocket>> = HashMap::new();
        let mut forward_routes: HashMap<DeviceId, ForwardRoute> = HashMap::new();
        let mut unavailable: HashSet<u16> = HashSet::new();
        for device in registry.iter() {
            let Some(target) = device.downstream() else {
                continue;
            };
            let id = device.id();
            let port = target.origin_port;
            let bound = forwarders
                .get(&port)
                .or_else(|| self.forwarders.get(&port))
                .cloned();
            let socket = match bound {
                Some(socket) => Some(socket),
                None if unavailable.contains(&port) => None,
                None => match bind(origin_addr(port)).await {
                    Ok(socket) => Some(socket),
                    Err(e) => {
                        warn!(device = %id, "{e}");
                        report.failures.push(e);
                        unavailable.insert(port);
                        None
                    }
                },
            };

            if let Some(socket) = socket {
                forwarders.insert(port, Arc::clone(&socket));
                forward_routes.insert(id, ForwardRoute { socket, target });
                continue;
            }
            match self.assignments.get(&id).and_then(|a| a.forward.as_ref()) {
                Some(previous) => {
                    let kept = previous.target.origin_port;
                    warn!(device = %id, origin_port = kept, "keeping previous origin port");
                    forwarders.insert(kept, Arc::clone(&previous.socket));
                    forward_routes.insert(
                        id,
                        ForwardRoute {
                            socket: Arc::clone(&previous.socket),
                            target: DownstreamTarget {
                                peer: target.peer,
                                origin_port: kept,
                            },
                        },
                    );
                }
                None => warn!(device = %id, origin_port = port, "telegrams will not be relayed"),
            }
        }

        // ── Listen sockets, keyed by listen address ───────────────────────────
        let mut groups: Vec<(SocketAddr, Vec<DeviceRoute>)> = Vec::new();
        for device in registry.iter() {
            let id = device.id();
            let route = DeviceRoute {
                forward: forward_routes.get(&id).cloned(),
                device: id,
                pdv_ip: device.pdv_ip,
            };
            let addr = device.listen_addr();
            match groups.iter_mut().find(|(a, _)| *a == addr) {
                Some((_, routes)) => routes.push(route),
                None => groups.push((addr, vec![route])),
            }
        }

        let mut sockets: Vec<(SocketAddr, Arc<UdpSocket>, Vec<DeviceRoute>)> = Vec::new();
        let mut stranded: Vec<(SocketAddr, DeviceRoute)> = Vec::new();
        for (addr, routes) in groups {
            let socket = match self.listeners.get(&addr) {
                Some(binding) => Arc::clone(&binding.socket),
                None => match bind(addr).await {
                    Ok(socket) => socket,
                    Err(e) => {
                        for route in routes {
                            let previous = self
                                .assignments
                                .get(&route.device)
                                .map(|a| a.listen_addr)
                                .filter(|old| self.listeners.contains_key(old));
                            match previous {
                                Some(old) => {
                                    warn!(device = %route.device, %old, "{e}; keeping previous listen socket");
                                    stranded.push((old, route));
                                }
                                None => {
                                    error!(device = %route.device, "{e}; device will not be monitored");
                                }
                            }
                        }
                        report.failures.push(e);
                        continue;
                    }
                },
            };
            sockets.push((addr, socket, routes));
        }

        for (old, route) in stranded {
            if let Some((_, _, routes)) = sockets.iter_mut().find(|(a, _, _)| *a == old) {
                routes.push(route);
            } else if let Some(binding) = self.listeners.get(&old) {
                sockets.push((old, Arc::clone(&binding.socket), vec![route]));
            }
        }

        // ── Swap: new tasks on the (possibly carried-over) sockets ────────────
        let previous = std::mem::take(&mut self.listeners);
        for binding in previous.values() {
            binding.task.abort();
        }

        self.assignments.clear();
        for (addr, socket, routes) in sockets {
            for route in &routes {
                self.assignments.insert(
                    route.device.clone(),
                    Assignment {
                        listen_addr: addr,
                        forward: route.forward.clone(),
                    },
                );
            }
            let routes = Arc::new(ListenRoutes { devices: routes });
            let task = tokio::spawn(receive_loop(
                Arc::clone(&socket),
                routes,
                self.inbound.clone(),
            ));
            info!(%addr, "listening for PDV telegrams");
            self.listeners.insert(addr, ListenBinding { socket, task });
        }
        self.forwarders = forwarders;

        // Wait for the old tasks to unwind so released ports are free on
        // return.
        for binding in previous.into_values() {
            let _ = binding.task.await;
        }

        report.listening = self.listeners.len();
        report.forwarding = self.forwarders.len();
        info!(
            listening = report.listening,
            forwarding = report.forwarding,
            failures = report.failures.len(),
            "device sockets applied"
        );
        report
    }

    /// Actual local address of the listen socket configured for `addr`.
    /// Useful when the configured port is 0.
    pub fn local_listen_addr(&self, addr: SocketAddr) -> Option<SocketAddr> {
        self.listeners
            .get(&addr)
            .and_then(|b| b.socket.local_addr().ok())
    }

    /// Configured addresses that currently have a listen socket.
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.keys().copied().collect()
    }

    /// Origin ports that currently have a forward socket.
    pub fn forward_ports(&self) -> Vec<u16> {
        self.forwarders.keys().copied().collect()
    }

    /// Stops every receive task and closes every socket.
    pub fn shutdown(&mut self) {
        for binding in self.listeners.values() {
            binding.task.abort();
        }
        self.listeners.clear();
        self.forwarders.clear();
        self.assignments.clear();
        debug!("device sockets closed");
    }
}

impl Drop for SocketMultiplexer {
    fn drop(&mut self) {
        for binding in self.listeners.values() {
            binding.task.abort();
        }
    }
}

fn origin_addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}

async fn bind(addr: SocketAddr) -> Result<Arc<UdpSocket>, SocketError> {
    UdpSocket::bind(addr)
        .await
        .map(Arc::new)
        .map_err(|source| SocketError::BindFailed { addr, source })
}

/// Reads one listen socket until the pump goes away or the task is aborted.
async fn receive_loop(
    socket: Arc<UdpSocket>,
    routes: Arc<ListenRoutes>,
    inbound: mpsc::Sender<DeviceDatagram>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, sender) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("PDV socket receive error: {e}");
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                continue;
            }
        };
        let payload = buf[..len].to_vec();
        let (device, forward) = routes.resolve(sender.ip());
        trace!(device = %device, %sender, bytes = len, "datagram received");

        if let Some(route) = forward {
            if let Err(e) = relay(&device, route, &payload).await {
                warn!("{e}");
            }
        }

        if inbound.send(DeviceDatagram { device, payload }).await.is_err() {
            debug!("device pump gone; receive loop stopping");
            return;
        }
    }
}

async fn relay(device: &str, route: &ForwardRoute, payload: &[u8]) -> Result<(), SocketError> {
    route
        .socket
        .send_to(payload, route.target.peer)
        .await
        .map(|_| ())
        .map_err(|source| SocketError::ForwardFailed {
            device: device.to_string(),
            peer: route.target.peer,
            source,
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pdv_core::DeviceConfig;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn route(device: &str, ip: [u8; 4]) -> DeviceRoute {
        DeviceRoute {
            device: device.to_string(),
            pdv_ip: IpAddr::from(ip),
            forward: None,
        }
    }

    #[test]
    fn test_resolve_matches_sender_ip() {
        let routes = ListenRoutes {
            devices: vec![route("a", [10, 0, 0, 1]), route("b", [10, 0, 0, 2])],
        };
        assert_eq!(routes.resolve(IpAddr::from([10, 0, 0, 2])).0, "b");
    }

    #[test]
    fn test_resolve_single_device_socket_takes_any_sender() {
        let routes = ListenRoutes {
            devices: vec![route("a", [10, 0, 0, 1])],
        };
        assert_eq!(routes.resolve(IpAddr::from([172, 16, 0, 9])).0, "a");
    }

    #[test]
    fn test_resolve_unknown_sender_on_shared_socket_uses_sender_ip() {
        let routes = ListenRoutes {
            devices: vec![route("a", [10, 0, 0, 1]), route("b", [10, 0, 0, 2])],
        };
        let (device, forward) = routes.resolve(IpAddr::from([10, 0, 0, 3]));
        assert_eq!(device, "10.0.0.3");
        assert!(forward.is_none());
    }

    #[test]
    fn test_nothing_bound_requires_a_failure() {
        assert!(!ApplyReport::default().nothing_bound());
    }

    fn listen_on_ephemeral_port() -> DeviceConfig {
        let mut device = DeviceConfig::listen_only(LOCALHOST, 0);
        device.listen_address = LOCALHOST;
        device
    }

    #[tokio::test]
    async fn test_reconfigure_keeps_unchanged_listener() {
        // Arrange
        let (tx, _rx) = mpsc::channel(8);
        let device = listen_on_ephemeral_port();
        let registry = DeviceRegistry::from_configs([device.clone()]);
        let (mut mux, report) = SocketMultiplexer::start(&registry, tx).await;
        assert_eq!(report.listening, 1);
        let before = mux.local_listen_addr(device.listen_addr()).unwrap();

        // Act
        let report = mux.reconfigure(&registry).await;

        // Assert: same socket, same ephemeral port, no bind failure.
        assert!(report.failures.is_empty());
        assert_eq!(mux.local_listen_addr(device.listen_addr()), Some(before));
    }

    #[tokio::test]
    async fn test_reconfigure_to_empty_closes_everything() {
        let (tx, _rx) = mpsc::channel(8);
        let registry = DeviceRegistry::from_configs([listen_on_ephemeral_port()]);
        let (mut mux, _) = SocketMultiplexer::start(&registry, tx).await;

        let report = mux.reconfigure(&DeviceRegistry::empty()).await;

        assert_eq!(report.listening, 0);
        assert!(mux.listen_addrs().is_empty());
        assert!(!report.nothing_bound());
    }

    #[tokio::test]
    async fn test_occupied_port_is_reported_and_skipped() {
        // Arrange: hold a port so the multiplexer cannot bind it.
        let blocker = std::net::UdpSocket::bind((LOCALHOST, 0)).unwrap();
        let taken = blocker.local_addr().unwrap().port();
        let mut blocked = DeviceConfig::listen_only(IpAddr::from([10, 0, 0, 1]), taken);
        blocked.listen_address = LOCALHOST;
        let mut healthy = listen_on_ephemeral_port();
        healthy.pdv_ip = IpAddr::from([10, 0, 0, 2]);
        let registry = DeviceRegistry::from_configs([blocked, healthy]);
        let (tx, _rx) = mpsc::channel(8);

        // Act
        let (_mux, report) = SocketMultiplexer::start(&registry, tx).await;

        // Assert
        assert_eq!(report.listening, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], SocketError::BindFailed { .. }));
        assert!(!report.nothing_bound());
    }

    // ── Changed addresses ─────────────────────────────────────────────────────

    /// Ports that were free a moment ago, all distinct.
    fn free_ports(n: usize) -> Vec<u16> {
        let held: Vec<_> = (0..n)
            .map(|_| std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap())
            .collect();
        held.iter().map(|s| s.local_addr().unwrap().port()).collect()
    }

    async fn next_datagram(rx: &mut mpsc::Receiver<DeviceDatagram>) -> DeviceDatagram {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("datagram within 2 s")
            .expect("inbound channel open")
    }

    fn pdv_sender() -> std::net::UdpSocket {
        std::net::UdpSocket::bind((LOCALHOST, 0)).unwrap()
    }

    fn relaying_on_ephemeral_port(peer: SocketAddr, origin_port: u16) -> DeviceConfig {
        let mut device = DeviceConfig::relaying(LOCALHOST, 0, peer, origin_port);
        device.listen_address = LOCALHOST;
        device
    }

    #[tokio::test]
    async fn test_moved_listener_receives_on_new_port_and_frees_old_one() {
        // Arrange
        let (tx, mut rx) = mpsc::channel(8);
        let device = listen_on_ephemeral_port();
        let registry = DeviceRegistry::from_configs([device.clone()]);
        let (mut mux, _) = SocketMultiplexer::start(&registry, tx).await;
        let old = mux.local_listen_addr(device.listen_addr()).unwrap();
        let mut moved = device.clone();
        moved.pdv_port = free_ports(1)[0];

        // Act
        let report = mux
            .reconfigure(&DeviceRegistry::from_configs([moved.clone()]))
            .await;

        // Assert
        assert!(report.failures.is_empty());
        assert_eq!(mux.listen_addrs(), vec![moved.listen_addr()]);
        pdv_sender().send_to(b"ITEM 1", moved.listen_addr()).unwrap();
        let datagram = next_datagram(&mut rx).await;
        assert_eq!(datagram.device, device.id());
        assert_eq!(datagram.payload, b"ITEM 1".to_vec());
        assert!(std::net::UdpSocket::bind(old).is_ok(), "old port still held");
    }

    #[tokio::test]
    async fn test_failed_rebind_keeps_previous_listener() {
        // Arrange
        let (tx, mut rx) = mpsc::channel(8);
        let device = listen_on_ephemeral_port();
        let (mut mux, _) =
            SocketMultiplexer::start(&DeviceRegistry::from_configs([device.clone()]), tx).await;
        let old = mux.local_listen_addr(device.listen_addr()).unwrap();
        let blocker = std::net::UdpSocket::bind((LOCALHOST, 0)).unwrap();
        let mut moved = device.clone();
        moved.pdv_port = blocker.local_addr().unwrap().port();
        let moved_registry = DeviceRegistry::from_configs([moved.clone()]);

        // Act
        let report = mux.reconfigure(&moved_registry).await;

        // Assert: the failure is reported and the old socket still serves.
        assert_eq!(report.listening, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.nothing_bound());
        assert_eq!(mux.local_listen_addr(device.listen_addr()), Some(old));
        pdv_sender().send_to(b"ITEM 2", old).unwrap();
        assert_eq!(next_datagram(&mut rx).await.device, device.id());

        // Once the port frees up, the next apply moves the device.
        drop(blocker);
        let report = mux.reconfigure(&moved_registry).await;
        assert!(report.failures.is_empty());
        assert_eq!(mux.listen_addrs(), vec![moved.listen_addr()]);
    }

    #[tokio::test]
    async fn test_listen_port_swap_between_devices() {
        // Arrange
        let ports = free_ports(2);
        let config = |ip: [u8; 4], port: u16| {
            let mut device = DeviceConfig::listen_only(IpAddr::from(ip), port);
            device.listen_address = LOCALHOST;
            device
        };
        let (tx, mut rx) = mpsc::channel(8);
        let (mut mux, report) = SocketMultiplexer::start(
            &DeviceRegistry::from_configs([
                config([10, 0, 0, 1], ports[0]),
                config([10, 0, 0, 2], ports[1]),
            ]),
            tx,
        )
        .await;
        assert_eq!(report.listening, 2);

        // Act
        let report = mux
            .reconfigure(&DeviceRegistry::from_configs([
                config([10, 0, 0, 1], ports[1]),
                config([10, 0, 0, 2], ports[0]),
            ]))
            .await;

        // Assert
        assert!(report.failures.is_empty());
        assert_eq!(report.listening, 2);
        pdv_sender()
            .send_to(b"ITEM 3", SocketAddr::new(LOCALHOST, ports[0]))
            .unwrap();
        assert_eq!(next_datagram(&mut rx).await.device, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_relay_source_port_follows_new_origin_port() {
        // Arrange
        let dvr = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
        let ports = free_ports(2);
        let mut device = relaying_on_ephemeral_port(dvr.local_addr().unwrap(), ports[0]);
        let (tx, _rx) = mpsc::channel(8);
        let (mut mux, _) =
            SocketMultiplexer::start(&DeviceRegistry::from_configs([device.clone()]), tx).await;
        let listen = mux.local_listen_addr(device.listen_addr()).unwrap();
        device.origin_port = Some(ports[1]);

        // Act
        let report = mux
            .reconfigure(&DeviceRegistry::from_configs([device]))
            .await;

        // Assert
        assert!(report.failures.is_empty());
        assert_eq!(mux.forward_ports(), vec![ports[1]]);
        pdv_sender().send_to(b"ITEM 4", listen).unwrap();
        let mut buf = [0u8; 64];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), dvr.recv_from(&mut buf))
            .await
            .expect("relayed within 2 s")
            .unwrap();
        assert_eq!(&buf[..len], b"ITEM 4");
        assert_eq!(from.port(), ports[1]);
    }

    #[tokio::test]
    async fn test_failed_origin_rebind_keeps_relaying_from_previous_port() {
        // Arrange
        let dvr = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
        let origin = free_ports(1)[0];
        let mut device = relaying_on_ephemeral_port(dvr.local_addr().unwrap(), origin);
        let (tx, _rx) = mpsc::channel(8);
        let (mut mux, _) =
            SocketMultiplexer::start(&DeviceRegistry::from_configs([device.clone()]), tx).await;
        let listen = mux.local_listen_addr(device.listen_addr()).unwrap();
        let blocker = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        device.origin_port = Some(blocker.local_addr().unwrap().port());

        // Act
        let report = mux
            .reconfigure(&DeviceRegistry::from_configs([device]))
            .await;

        // Assert
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], SocketError::BindFailed { .. }));
        assert_eq!(mux.forward_ports(), vec![origin]);
        pdv_sender().send_to(b"ITEM 5", listen).unwrap();
        let mut buf = [0u8; 64];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), dvr.recv_from(&mut buf))
            .await
            .expect("relayed within 2 s")
            .unwrap();
        assert_eq!(&buf[..len], b"ITEM 5");
        assert_eq!(from.port(), origin);
    }
}
