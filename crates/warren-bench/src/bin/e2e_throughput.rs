//! End-to-end throughput benchmark for Warren.
//!
//! Each client negotiates a connection over TCP, opens a channel and then
//! drives `channel.flow` / `channel.flow-ok` round trips as fast as the
//! broker answers them.

use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Barrier;
use warren_protocol::{
    FieldTable, Frame, MethodBody, MethodKind, MethodRegistry, ProtocolInitiation, ProtocolVersion,
    V0_91,
};

const SERVER_ADDR: &str = "127.0.0.1:5672";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let version = args
        .get(2)
        .and_then(|s| s.parse::<ProtocolVersion>().ok())
        .unwrap_or(V0_91);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║         Warren End-to-End Throughput Benchmark               ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Make sure the broker is running: cargo run --release        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    run_flow_benchmark(num_clients, version).await;
}

async fn run_flow_benchmark(num_clients: usize, version: ProtocolVersion) {
    println!("📊 channel.flow round trips: {} clients, AMQP {}", num_clients, version);
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let round_trips = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let round_trips = Arc::clone(&round_trips);
        let barrier = Arc::clone(&barrier);

        let handle = tokio::spawn(async move {
            if let Err(e) = run_client(version, round_trips, barrier).await {
                eprintln!("Client {} error: {}", client_id, e);
            }
        });
        handles.push(handle);
    }

    // Wait for all clients to connect
    barrier.wait().await;
    println!("✓ All {} clients connected", num_clients);

    println!("⏳ Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    round_trips.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("📈 Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total = round_trips.load(Ordering::SeqCst);
    let per_sec = total as f64 / elapsed.as_secs_f64();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Clients:              {:>10}                           ║",
        num_clients
    );
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!(
        "║  Round Trips:          {:>10}                           ║",
        total
    );
    println!(
        "║  Throughput:           {:>10.0} rt/s                     ║",
        per_sec
    );
    println!(
        "║  Per-Client:           {:>10.0} rt/s                     ║",
        per_sec / num_clients as f64
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    for handle in handles {
        handle.abort();
    }
}

struct Client {
    stream: TcpStream,
    buf: BytesMut,
    registry: &'static MethodRegistry,
}

impl Client {
    async fn recv(&mut self) -> Result<MethodBody, BoxError> {
        loop {
            if let Some(frame) = Frame::decode_from(&mut self.buf, 1 << 20)? {
                if frame.is_heartbeat() {
                    continue;
                }
                return Ok(self.registry.decode(frame.payload)?);
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err("broker closed the connection".into());
            }
        }
    }

    async fn expect(&mut self, kind: MethodKind) -> Result<MethodBody, BoxError> {
        let body = self.recv().await?;
        if body.kind() != kind {
            return Err(format!("expected {:?}, got {}", kind, body.name()).into());
        }
        Ok(body)
    }

    async fn send(&mut self, channel: u16, body: MethodBody) -> Result<(), BoxError> {
        self.stream.write_all(&body.to_frame(channel).encode()).await?;
        Ok(())
    }
}

async fn connect(version: ProtocolVersion) -> Result<Client, BoxError> {
    let mut stream = TcpStream::connect(SERVER_ADDR).await?;
    stream.set_nodelay(true)?;
    stream
        .write_all(&ProtocolInitiation::for_version(version).encode())
        .await?;
    let registry = MethodRegistry::for_version(version).ok_or("unsupported version")?;
    let mut client = Client {
        stream,
        buf: BytesMut::with_capacity(65536),
        registry,
    };

    client.expect(MethodKind::ConnectionStart).await?;
    let start_ok = registry.create_connection_start_ok(
        FieldTable::new(),
        "PLAIN",
        Bytes::from_static(b"\0guest\0guest"),
        "en_US",
    )?;
    client.send(0, start_ok).await?;

    let tune = client.expect(MethodKind::ConnectionTune).await?;
    let tune_ok = registry.create_connection_tune_ok(
        tune.short("channel-max")?,
        tune.long("frame-max")?,
        0,
    )?;
    client.send(0, tune_ok).await?;
    client.send(0, registry.create_connection_open("/")?).await?;
    client.expect(MethodKind::ConnectionOpenOk).await?;

    client.send(1, registry.create_channel_open()?).await?;
    client.expect(MethodKind::ChannelOpenOk).await?;
    Ok(client)
}

async fn run_client(
    version: ProtocolVersion,
    round_trips: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let mut client = connect(version).await?;

    // Wait for all clients to be ready
    barrier.wait().await;

    // Pre-encode both flow frames
    let pause = client.registry.create_channel_flow(false)?.to_frame(1).encode();
    let resume = client.registry.create_channel_flow(true)?.to_frame(1).encode();

    let mut active = true;
    loop {
        active = !active;
        let frame = if active { &resume } else { &pause };
        client.stream.write_all(frame).await?;
        client.expect(MethodKind::ChannelFlowOk).await?;
        round_trips.fetch_add(1, Ordering::Relaxed);
    }
}
