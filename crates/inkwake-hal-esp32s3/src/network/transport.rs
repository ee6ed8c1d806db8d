//! TCP and TLS sessions over the embassy-net stack.

use core::net::Ipv4Addr;

use embassy_net::{IpAddress, Stack, dns::DnsQueryType, tcp::TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use embedded_tls::{
    Aes128GcmSha256, TlsConfig, TlsConnection, TlsContext, TlsError, UnsecureProvider,
};
use esp_hal::rng::Rng;
use inkwake_core::fetch::{
    Endpoint, Pacer, ReadOutcome, Session, Transport, TransportError, TrustPolicy,
};
use log::{debug, warn};
use rand_core::{CryptoRng, RngCore};

pub const TCP_RX_BYTES: usize = 4096;
pub const TCP_TX_BYTES: usize = 1024;
/// Largest TLS record plus overhead; the server may not honour fragment-length negotiation.
pub const TLS_READ_BYTES: usize = 16_640;
pub const TLS_WRITE_BYTES: usize = 4096;

/// Socket and record buffers reused by every session. Lives in a static.
pub struct TransportBuffers {
    tcp_rx: [u8; TCP_RX_BYTES],
    tcp_tx: [u8; TCP_TX_BYTES],
    tls_read: [u8; TLS_READ_BYTES],
    tls_write: [u8; TLS_WRITE_BYTES],
}

impl TransportBuffers {
    pub const fn new() -> Self {
        Self {
            tcp_rx: [0; TCP_RX_BYTES],
            tcp_tx: [0; TCP_TX_BYTES],
            tls_read: [0; TLS_READ_BYTES],
            tls_write: [0; TLS_WRITE_BYTES],
        }
    }
}

impl Default for TransportBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// Hardware RNG as a `rand_core` source. Only random while the radio is running.
pub struct HwRng(Rng);

impl HwRng {
    pub fn new() -> Self {
        Self(Rng::new())
    }
}

impl Default for HwRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for HwRng {
    fn next_u32(&mut self) -> u32 {
        self.0.random()
    }

    fn next_u64(&mut self) -> u64 {
        ((self.next_u32() as u64) << 32) | self.next_u32() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for HwRng {}

#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub connect_timeout_secs: u64,
    /// Socket inactivity timeout; the connection is aborted past it.
    pub io_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            io_timeout_secs: 15,
        }
    }
}

pub struct NetTransport<'d> {
    stack: Stack<'d>,
    buffers: &'d mut TransportBuffers,
    rng: HwRng,
    config: TransportConfig,
}

impl<'d> NetTransport<'d> {
    pub fn new(
        stack: Stack<'d>,
        buffers: &'d mut TransportBuffers,
        rng: HwRng,
        config: TransportConfig,
    ) -> Self {
        Self {
            stack,
            buffers,
            rng,
            config,
        }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddress, TransportError> {
        if let Ok(addr) = host.parse::<Ipv4Addr>() {
            return Ok(IpAddress::Ipv4(addr));
        }

        let addrs = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|err| {
                warn!("net: dns failed host={} err={:?}", host, err);
                TransportError::Dns
            })?;
        addrs.first().copied().ok_or(TransportError::Dns)
    }
}

impl Transport for NetTransport<'_> {
    type Session<'s>
        = NetSession<'s>
    where
        Self: 's;

    async fn connect<'s>(
        &'s mut self,
        endpoint: &Endpoint<'_>,
        trust: TrustPolicy,
    ) -> Result<Self::Session<'s>, TransportError> {
        if endpoint.tls && trust == TrustPolicy::VerifyCertificates {
            return Err(TransportError::TrustUnsupported);
        }

        let addr = self.resolve(endpoint.host).await?;
        debug!("net: connect addr={} port={}", addr, endpoint.port);

        let buffers = &mut *self.buffers;
        let mut socket = TcpSocket::new(self.stack, &mut buffers.tcp_rx, &mut buffers.tcp_tx);
        socket.set_timeout(Some(Duration::from_secs(self.config.connect_timeout_secs)));
        socket.connect((addr, endpoint.port)).await.map_err(|err| {
            warn!("net: tcp connect failed err={:?}", err);
            TransportError::Connect
        })?;
        socket.set_timeout(Some(Duration::from_secs(self.config.io_timeout_secs)));

        if !endpoint.tls {
            return Ok(NetSession::Plain(socket));
        }

        let tls_config = TlsConfig::new().with_server_name(endpoint.host);
        let mut tls = TlsConnection::new(socket, &mut buffers.tls_read, &mut buffers.tls_write);
        let provider = UnsecureProvider::new::<Aes128GcmSha256>(&mut self.rng);
        if let Err(err) = tls.open(TlsContext::new(&tls_config, provider)).await {
            warn!("net: tls handshake failed err={:?}", err);
            abort_tls(tls).await;
            return Err(TransportError::Tls);
        }

        Ok(NetSession::Tls(tls))
    }
}

pub enum NetSession<'s> {
    Plain(TcpSocket<'s>),
    Tls(TlsConnection<'s, TcpSocket<'s>, Aes128GcmSha256>),
}

impl Session for NetSession<'_> {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let result = match self {
            Self::Plain(socket) => match socket.write_all(bytes).await {
                Ok(()) => socket.flush().await.map_err(|_| TransportError::Io),
                Err(_) => Err(TransportError::Io),
            },
            Self::Tls(tls) => match tls.write_all(bytes).await {
                Ok(()) => tls.flush().await.map_err(|_| TransportError::Io),
                Err(_) => Err(TransportError::Io),
            },
        };
        if result.is_err() {
            warn!("net: write failed bytes={}", bytes.len());
        }
        result
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        match self {
            Self::Plain(socket) => {
                if !socket.can_recv() {
                    return Ok(if socket.may_recv() {
                        ReadOutcome::Pending
                    } else {
                        ReadOutcome::Closed
                    });
                }
                match socket.read(buf).await {
                    Ok(0) => Ok(ReadOutcome::Closed),
                    Ok(n) => Ok(ReadOutcome::Data(n)),
                    Err(err) => {
                        warn!("net: read failed err={:?}", err);
                        Err(TransportError::Io)
                    }
                }
            }
            // Record decryption is not cancel-safe, so TLS reads block until the socket
            // timeout instead of reporting Pending.
            Self::Tls(tls) => match tls.read(buf).await {
                Ok(0) | Err(TlsError::ConnectionClosed) => Ok(ReadOutcome::Closed),
                Ok(n) => Ok(ReadOutcome::Data(n)),
                Err(err) => {
                    warn!("net: tls read failed err={:?}", err);
                    Err(TransportError::Io)
                }
            },
        }
    }

    async fn close(self) {
        match self {
            Self::Plain(mut socket) => {
                socket.close();
                let _ = socket.flush().await;
                socket.abort();
            }
            Self::Tls(tls) => abort_tls(tls).await,
        }
    }
}

async fn abort_tls(tls: TlsConnection<'_, TcpSocket<'_>, Aes128GcmSha256>) {
    let mut socket = match tls.close().await {
        Ok(socket) => socket,
        Err((socket, _)) => socket,
    };
    socket.close();
    socket.abort();
}

/// Sleeps between idle polls of a plain socket.
#[derive(Debug, Clone, Copy)]
pub struct TimerPacer {
    interval_ms: u64,
}

impl TimerPacer {
    pub const fn new(interval_ms: u64) -> Self {
        Self { interval_ms }
    }
}

impl Default for TimerPacer {
    fn default() -> Self {
        Self::new(250)
    }
}

impl Pacer for TimerPacer {
    async fn pause(&mut self) {
        Timer::after_millis(self.interval_ms).await;
    }
}
