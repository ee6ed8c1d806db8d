//! Single-resource download over an injected byte transport.

pub mod http;
pub mod url;

use alloc::vec::Vec;

use log::{debug, info, warn};

pub use url::{Endpoint, Url};

/// Head bytes buffered while looking for the end of the response head.
pub const HEAD_BUFFER_BYTES: usize = 1024;

/// Certificate policy handed to the transport on every connect.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TrustPolicy {
    /// Encrypt the channel but accept any server certificate.
    #[default]
    Relaxed,
    VerifyCertificates,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransportError {
    Dns,
    Connect,
    Tls,
    Io,
    Timeout,
    /// The transport cannot honour the requested [`TrustPolicy`].
    TrustUnsupported,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReadOutcome {
    Data(usize),
    /// Nothing available yet; the connection is still open.
    Pending,
    /// Peer closed the stream.
    Closed,
}

/// Byte-stream transport. Connect and read timeouts are enforced by the implementation.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Session<'s>: Session
    where
        Self: 's;

    async fn connect<'s>(
        &'s mut self,
        endpoint: &Endpoint<'_>,
        trust: TrustPolicy,
    ) -> Result<Self::Session<'s>, TransportError>;
}

#[allow(async_fn_in_trait)]
pub trait Session {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError>;
    async fn close(self);
}

/// Cooperative pause between idle polls.
#[allow(async_fn_in_trait)]
pub trait Pacer {
    async fn pause(&mut self);
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FetchError {
    InvalidUrl,
    Connect(TransportError),
    Transport(TransportError),
    MalformedResponse,
    HeadTooLarge,
    Status(u16),
    /// No usable positive `Content-Length`.
    SizeUnknown,
    TooLarge(u64),
    OutOfMemory,
    ShortRead { received: usize, expected: usize },
    /// Too many consecutive idle polls.
    Timeout,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FetchConfig {
    pub trust: TrustPolicy,
    pub max_body_bytes: usize,
    pub max_idle_polls: u16,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            trust: TrustPolicy::Relaxed,
            max_body_bytes: 96 * 1024,
            max_idle_polls: 60,
        }
    }
}

impl FetchConfig {
    pub const fn with_trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub const fn with_max_idle_polls(mut self, max_idle_polls: u16) -> Self {
        self.max_idle_polls = max_idle_polls;
        self
    }
}

pub struct Fetcher<T, P> {
    transport: T,
    pacer: P,
    config: FetchConfig,
}

impl<T, P> Fetcher<T, P>
where
    T: Transport,
    P: Pacer,
{
    pub fn new(transport: T, pacer: P, config: FetchConfig) -> Self {
        Self {
            transport,
            pacer,
            config,
        }
    }

    pub fn config(&self) -> FetchConfig {
        self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Downloads `url` into a buffer sized exactly to the advertised length.
    ///
    /// The session is closed on every path once connected. A partial body is never returned.
    pub async fn fetch(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        let url = Url::parse(url).map_err(|_| FetchError::InvalidUrl)?;
        info!(
            "fetch: connect host={} port={} path={} trust={:?}",
            url.host, url.port, url.path, self.config.trust
        );

        let mut session = self
            .transport
            .connect(&url.endpoint(), self.config.trust)
            .await
            .map_err(FetchError::Connect)?;

        let result = exchange(&mut session, &mut self.pacer, &url, &self.config).await;
        session.close().await;

        match &result {
            Ok(body) => info!("fetch: done bytes={}", body.len()),
            Err(err) => warn!("fetch: failed err={:?}", err),
        }
        result
    }
}

async fn exchange<S: Session, P: Pacer>(
    session: &mut S,
    pacer: &mut P,
    url: &Url<'_>,
    config: &FetchConfig,
) -> Result<Vec<u8>, FetchError> {
    let request = http::get_request(url);
    session
        .write_all(request.as_bytes())
        .await
        .map_err(FetchError::Transport)?;

    let mut head_buf = [0u8; HEAD_BUFFER_BYTES];
    let mut filled = 0usize;
    let head = loop {
        if filled == head_buf.len() {
            return Err(FetchError::HeadTooLarge);
        }

        match read_some(session, pacer, &mut head_buf[filled..], config.max_idle_polls).await? {
            Some(n) => filled += n,
            None => return Err(FetchError::MalformedResponse),
        }

        if let Some(head) =
            http::parse_head(&head_buf[..filled]).map_err(|_| FetchError::MalformedResponse)?
        {
            break head;
        }
    };

    debug!(
        "fetch: head status={} content_length={:?} chunked={}",
        head.status, head.content_length, head.chunked
    );

    if head.status != 200 {
        return Err(FetchError::Status(head.status));
    }

    let expected = match head.content_length {
        Some(len) if len > 0 && !head.chunked => len,
        _ => return Err(FetchError::SizeUnknown),
    };
    if expected > config.max_body_bytes as u64 {
        return Err(FetchError::TooLarge(expected));
    }
    let expected = expected as usize;

    let mut body = Vec::new();
    body.try_reserve_exact(expected)
        .map_err(|_| FetchError::OutOfMemory)?;
    body.resize(expected, 0);

    let carried = (filled - head.head_len).min(expected);
    body[..carried].copy_from_slice(&head_buf[head.head_len..head.head_len + carried]);

    let mut received = carried;
    while received < expected {
        match read_some(session, pacer, &mut body[received..], config.max_idle_polls).await? {
            Some(n) => received += n,
            None => return Err(FetchError::ShortRead { received, expected }),
        }
    }

    Ok(body)
}

/// Reads at least one byte, pausing between idle polls. `None` means the peer closed.
async fn read_some<S: Session, P: Pacer>(
    session: &mut S,
    pacer: &mut P,
    buf: &mut [u8],
    max_idle_polls: u16,
) -> Result<Option<usize>, FetchError> {
    let mut idle_polls = 0u16;
    loop {
        match session.read(buf).await.map_err(FetchError::Transport)? {
            ReadOutcome::Data(0) | ReadOutcome::Closed => return Ok(None),
            ReadOutcome::Data(n) => return Ok(Some(n.min(buf.len()))),
            ReadOutcome::Pending => {
                idle_polls = idle_polls.saturating_add(1);
                if idle_polls > max_idle_polls {
                    return Err(FetchError::Timeout);
                }
                pacer.pause().await;
            }
        }
    }
}
