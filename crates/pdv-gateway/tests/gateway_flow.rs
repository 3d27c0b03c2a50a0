//! End-to-end tests for the gateway.
//!
//! These drive [`Gateway`] through its public entry points with in-memory
//! browser channels and, for the UDP relay, real loopback sockets.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pdv_core::{DeviceConfig, DeviceRegistry, QualityPreset, SessionDescription};
use pdv_gateway::application::channel::mock::{MemoryChannel, MemoryPeer};
use pdv_gateway::application::{
    DeviceDatagram, EngineError, Gateway, MediaEngineFactory, MediaRelayEngine,
};
use pdv_gateway::domain::{GatewayConfig, SessionId};
use pdv_gateway::infrastructure::media::DisabledEngineFactory;
use pdv_gateway::infrastructure::network::SocketMultiplexer;
use serde_json::json;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

// ── Helpers ───────────────────────────────────────────────────────────────────

fn gateway() -> Gateway {
    Gateway::new(&GatewayConfig::default(), Arc::new(DisabledEngineFactory))
}

/// Opens a device channel and registers it for `pdv_ip`.
async fn register(gateway: &Gateway, pdv_ip: &str) -> MemoryPeer {
    let (channel, mut peer) = MemoryChannel::pair();
    let gw = gateway.clone();
    tokio::spawn(async move { gw.serve_device_channel(channel).await });

    peer.send(json!({"command":"register","pdv_ip":pdv_ip}).to_string());
    let reply = peer.next_json().await;
    assert_eq!(reply["type"], json!("register_response"));
    assert_eq!(reply["success"], json!(true));
    peer
}

/// Two distinct UDP ports that were free a moment ago.
async fn free_udp_ports() -> (u16, u16) {
    let a = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
    let b = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
    (a.local_addr().unwrap().port(), b.local_addr().unwrap().port())
}

// ── Sale flow ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_telegrams_reach_every_registered_subscriber() {
    // Arrange
    let gateway = gateway();
    let (inbound, _pump) = gateway.spawn_device_pump();
    let mut first = register(&gateway, "10.0.0.7").await;
    let mut second = register(&gateway, "10.0.0.7").await;
    let mut other = register(&gateway, "10.0.0.8").await;

    // Act
    inbound
        .send(DeviceDatagram::new("10.0.0.7", "*PDV01*Trans:5*Atend:2 item 1"))
        .await
        .unwrap();

    // Assert
    for peer in [&mut first, &mut second] {
        let event = peer.next_json().await;
        assert_eq!(event["type"], json!("pdv_data"));
        assert_eq!(event["pdv_ip"], json!("10.0.0.7"));
        assert_eq!(event["data"], json!("*PDV01*Trans:5*Atend:2 item 1"));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(other.try_next().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_sale_raises_exactly_one_alarm_per_subscriber() {
    // Arrange
    let gateway = gateway();
    let (inbound, _pump) = gateway.spawn_device_pump();
    let mut first = register(&gateway, "10.0.0.7").await;
    let mut second = register(&gateway, "10.0.0.7").await;

    // Act: open a sale, then say nothing for longer than the timeout.
    inbound
        .send(DeviceDatagram::new("10.0.0.7", "*PDV01*Trans:5*Atend:2 item 1"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(181)).await;

    // Assert
    for peer in [&mut first, &mut second] {
        assert_eq!(peer.next_json().await["type"], json!("pdv_data"));
        let alarm = peer.next_json().await;
        assert_eq!(alarm["type"], json!("pdv_inativo_timeout"));
        assert_eq!(alarm["pdv_ip"], json!("10.0.0.7"));
        assert!(alarm["inactive_time"].as_f64().unwrap() >= 180.0);
    }

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(first.try_next().is_none());
    assert!(second.try_next().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_completed_sale_never_alarms() {
    let gateway = gateway();
    let (inbound, _pump) = gateway.spawn_device_pump();
    let mut peer = register(&gateway, "10.0.0.7").await;

    inbound
        .send(DeviceDatagram::new("10.0.0.7", "*PDV01*Trans:5*Atend:2"))
        .await
        .unwrap();
    inbound
        .send(DeviceDatagram::new("10.0.0.7", "TOTAL R$ 10,00"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(400)).await;

    assert_eq!(peer.next_json().await["type"], json!("pdv_data"));
    assert_eq!(peer.next_json().await["type"], json!("pdv_data"));
    assert!(peer.try_next().is_none());
}

#[tokio::test]
async fn test_closed_device_channel_is_unsubscribed() {
    let gateway = gateway();
    let mut peer = register(&gateway, "10.0.0.7").await;
    assert_eq!(gateway.subscribers().lock().await.subscriber_count("10.0.0.7"), 1);

    peer.hang_up();

    timeout(Duration::from_secs(2), async {
        while gateway.subscribers().lock().await.subscriber_count("10.0.0.7") > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber was not removed");
    assert_eq!(gateway.subscribers().lock().await.device_count(), 0);
}

// ── UDP relay ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_datagram_is_relayed_from_origin_port_and_published() {
    // Arrange: a DVR stand-in, a device listening on loopback, and a subscriber.
    let gateway = gateway();
    let (inbound, _pump) = gateway.spawn_device_pump();
    let dvr = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
    let (listen_port, origin_port) = free_udp_ports().await;
    let mut device =
        DeviceConfig::relaying(LOOPBACK, listen_port, dvr.local_addr().unwrap(), origin_port);
    device.listen_address = LOOPBACK;
    let listen = device.listen_addr();
    let registry = DeviceRegistry::from_configs([device]);
    let (_mux, report) = SocketMultiplexer::start(&registry, inbound).await;
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let mut subscriber = register(&gateway, "127.0.0.1").await;

    // Act
    let pdv = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
    pdv.send_to(b"*PDV01*Trans:5*Atend:2 item 1", listen).await.unwrap();

    // Assert: relayed verbatim from the fixed origin port.
    let mut buf = [0u8; 1024];
    let (len, from) = timeout(Duration::from_secs(2), dvr.recv_from(&mut buf))
        .await
        .expect("datagram was not relayed")
        .unwrap();
    assert_eq!(&buf[..len], b"*PDV01*Trans:5*Atend:2 item 1");
    assert_eq!(from.port(), origin_port);

    let event = timeout(Duration::from_secs(2), subscriber.next_json())
        .await
        .expect("telegram was not published");
    assert_eq!(event["pdv_ip"], json!("127.0.0.1"));
    assert_eq!(event["data"], json!("*PDV01*Trans:5*Atend:2 item 1"));
}

// ── Media relay sharing ───────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
    detaches: AtomicUsize,
}

struct CountingEngine {
    counters: Arc<Counters>,
    preset: QualityPreset,
}

#[async_trait]
impl MediaRelayEngine for CountingEngine {
    async fn connect(&self, _source_id: &str) -> Result<(), EngineError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_offer(&self, viewer: SessionId) -> Result<SessionDescription, EngineError> {
        Ok(SessionDescription::offer(format!("{} {viewer}", self.preset)))
    }

    async fn process_answer(
        &self,
        _viewer: SessionId,
        _answer: SessionDescription,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn detach(&self, _viewer: SessionId) {
        self.counters.detaches.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct CountingFactory(Arc<Counters>);

impl MediaEngineFactory for CountingFactory {
    fn create(&self, _source_id: &str, preset: QualityPreset) -> Arc<dyn MediaRelayEngine> {
        Arc::new(CountingEngine {
            counters: Arc::clone(&self.0),
            preset,
        })
    }
}

fn open_viewer(gateway: &Gateway) -> (MemoryPeer, tokio::task::JoinHandle<()>) {
    let (channel, peer) = MemoryChannel::pair();
    let gw = gateway.clone();
    (peer, tokio::spawn(async move { gw.serve_viewer_channel(channel).await }))
}

#[tokio::test]
async fn test_concurrent_viewers_share_one_relay_instance() {
    // Arrange
    let counters = Arc::new(Counters::default());
    let gateway = Gateway::new(
        &GatewayConfig::default(),
        Arc::new(CountingFactory(Arc::clone(&counters))),
    );
    let (mut a, task_a) = open_viewer(&gateway);
    let (mut b, task_b) = open_viewer(&gateway);

    // Act: both ask for cam1 before any instance exists.
    for peer in [&a, &b] {
        peer.send("cam1");
        peer.send(json!({"quality":"high"}).to_string());
    }
    let offer_a = a.next_json().await;
    let offer_b = b.next_json().await;
    for peer in [&a, &b] {
        peer.send(json!({"sdp":"v=0","type":"answer"}).to_string());
    }

    // Assert
    assert_eq!(offer_a["type"], json!("offer"));
    assert_ne!(offer_a["sdp"], offer_b["sdp"]);
    assert_eq!(gateway.media().refcount("cam1").await, 2);
    assert_eq!(counters.connects.load(Ordering::SeqCst), 1);

    a.send("CLOSE");
    task_a.await.unwrap();
    assert_eq!(gateway.media().refcount("cam1").await, 1);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 0);

    b.send("CLOSE");
    task_b.await.unwrap();
    assert_eq!(gateway.media().instance_count().await, 0);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(counters.detaches.load(Ordering::SeqCst), 2);
    assert!(gateway.viewers().lock().await.is_empty());
}

#[tokio::test]
async fn test_change_quality_renegotiates_on_a_fresh_instance() {
    let counters = Arc::new(Counters::default());
    let gateway = Gateway::new(
        &GatewayConfig::default(),
        Arc::new(CountingFactory(Arc::clone(&counters))),
    );
    let (mut viewer, task) = open_viewer(&gateway);
    viewer.send("cam1");
    viewer.send(json!({"quality":"high"}).to_string());
    assert!(viewer.next_json().await["sdp"]
        .as_str()
        .unwrap()
        .starts_with("high"));
    viewer.send(json!({"sdp":"v=0","type":"answer"}).to_string());

    viewer.send(json!({"change_quality":"low"}).to_string());
    let offer = viewer.next_json().await;

    assert!(offer["sdp"].as_str().unwrap().starts_with("low"));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.media().refcount("cam1").await, 1);

    viewer.hang_up();
    task.await.unwrap();
    assert_eq!(gateway.media().instance_count().await, 0);
}

#[tokio::test]
async fn test_unavailable_engine_sends_error_notice_and_cleans_up() {
    let gateway = gateway();
    let (mut viewer, task) = open_viewer(&gateway);

    viewer.send("rtsp://cam/1");
    viewer.send(json!({"quality":"medium"}).to_string());
    let notice = viewer.next_json().await;
    task.await.unwrap();

    assert_eq!(notice["type"], json!("error"));
    assert_eq!(gateway.media().instance_count().await, 0);
    assert!(gateway.viewers().lock().await.is_empty());
}
