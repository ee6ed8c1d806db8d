//! Test doubles shared by the module tests.

use std::collections::{BTreeMap, VecDeque};

use aes::Aes256;
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::{
    config::KNOWN_KEYS,
    counters::KeyValueStore,
    crypto::{ContentKey, IV_LEN},
    fetch::{Endpoint, Pacer, ReadOutcome, Session, Transport, TransportError, TrustPolicy},
    network::{LinkError, NetworkLink, WifiCredentials},
    render::{MessageCode, RenderError, RenderHint, Renderer, StatusContext, StatusIcon},
};

pub const TEST_KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub fn test_key() -> ContentKey {
    ContentKey::from_hex(TEST_KEY_HEX).unwrap()
}

pub fn encrypt_with_iv(key: &ContentKey, iv: [u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    let ciphertext = cbc::Encryptor::<Aes256>::new(key.as_bytes().into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut blob = iv.to_vec();
    blob.extend_from_slice(&ciphertext);
    blob
}

pub fn http_ok(body: &[u8]) -> Vec<u8> {
    let mut response =
        format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
    response.extend_from_slice(body);
    response
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoredValue {
    U32(u32),
    Text(String),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemoryStoreError {
    NotOpen,
    Unavailable,
    UnknownKey,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub values: BTreeMap<String, StoredValue>,
    pub opened: bool,
    pub fail_open: bool,
    pub fail_reads: bool,
    pub erase_count: usize,
}

impl MemoryStore {
    pub fn opened() -> Self {
        Self {
            opened: true,
            ..Self::default()
        }
    }

    fn check(&self, key: &str) -> Result<(), MemoryStoreError> {
        if !self.opened {
            return Err(MemoryStoreError::NotOpen);
        }
        if !KNOWN_KEYS.contains(&key) {
            return Err(MemoryStoreError::UnknownKey);
        }
        Ok(())
    }

    pub fn u32_value(&self, key: &str) -> Option<u32> {
        match self.values.get(key) {
            Some(StoredValue::U32(value)) => Some(*value),
            _ => None,
        }
    }
}

impl KeyValueStore for MemoryStore {
    type Error = MemoryStoreError;

    fn open(&mut self) -> Result<(), Self::Error> {
        if self.fail_open {
            return Err(MemoryStoreError::Unavailable);
        }
        self.opened = true;
        Ok(())
    }

    fn get_u32(&mut self, key: &str) -> Result<Option<u32>, Self::Error> {
        self.check(key)?;
        if self.fail_reads {
            return Err(MemoryStoreError::Unavailable);
        }
        Ok(self.u32_value(key))
    }

    fn put_u32(&mut self, key: &str, value: u32) -> Result<(), Self::Error> {
        self.check(key)?;
        self.values.insert(key.to_string(), StoredValue::U32(value));
        Ok(())
    }

    fn get_string(&mut self, key: &str) -> Result<Option<String>, Self::Error> {
        self.check(key)?;
        if self.fail_reads {
            return Err(MemoryStoreError::Unavailable);
        }
        Ok(match self.values.get(key) {
            Some(StoredValue::Text(value)) => Some(value.clone()),
            _ => None,
        })
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.check(key)?;
        self.values
            .insert(key.to_string(), StoredValue::Text(value.to_string()));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Self::Error> {
        self.check(key)?;
        self.values.remove(key);
        Ok(())
    }

    fn erase_all(&mut self) -> Result<(), Self::Error> {
        self.values.clear();
        self.erase_count += 1;
        Ok(())
    }
}

/// Canned response for one request path.
#[derive(Clone, Debug)]
pub struct Route {
    pub response: Vec<u8>,
    /// Close the stream after this many response bytes.
    pub cut_at: Option<usize>,
    /// `Pending` results returned before every data read.
    pub pending_before_read: usize,
    /// Never deliver anything.
    pub stall: bool,
}

impl Route {
    pub fn new(response: Vec<u8>) -> Self {
        Self {
            response,
            cut_at: None,
            pending_before_read: 0,
            stall: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub routes: BTreeMap<String, Route>,
    pub chunk: usize,
    pub fail_connect: Option<TransportError>,
    pub connects: Vec<(String, u16, bool, TrustPolicy)>,
    pub requests: Vec<String>,
    pub closes: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            chunk: 512,
            ..Self::default()
        }
    }

    pub fn route(mut self, path: &str, route: Route) -> Self {
        self.routes.insert(path.to_string(), route);
        self
    }

    pub fn ok(self, path: &str, body: &[u8]) -> Self {
        self.route(path, Route::new(http_ok(body)))
    }
}

pub struct ScriptedSession<'s> {
    transport: &'s mut ScriptedTransport,
    route: Option<Route>,
    cursor: usize,
    pending_left: usize,
}

impl Transport for ScriptedTransport {
    type Session<'s>
        = ScriptedSession<'s>
    where
        Self: 's;

    async fn connect<'s>(
        &'s mut self,
        endpoint: &Endpoint<'_>,
        trust: TrustPolicy,
    ) -> Result<Self::Session<'s>, TransportError> {
        self.connects
            .push((endpoint.host.to_string(), endpoint.port, endpoint.tls, trust));
        if let Some(err) = self.fail_connect {
            return Err(err);
        }
        Ok(ScriptedSession {
            transport: self,
            route: None,
            cursor: 0,
            pending_left: 0,
        })
    }
}

impl Session for ScriptedSession<'_> {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let request = std::str::from_utf8(bytes).map_err(|_| TransportError::Io)?;
        let path = request
            .strip_prefix("GET ")
            .and_then(|rest| rest.split(' ').next())
            .ok_or(TransportError::Io)?
            .to_string();

        self.route = Some(
            self.transport
                .routes
                .get(&path)
                .cloned()
                .unwrap_or_else(|| Route::new(b"HTTP/1.1 404 Not Found\r\n\r\n".to_vec())),
        );
        self.transport.requests.push(path);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        let Some(route) = self.route.as_ref() else {
            return Err(TransportError::Io);
        };
        if route.stall {
            return Ok(ReadOutcome::Pending);
        }
        if self.pending_left > 0 {
            self.pending_left -= 1;
            return Ok(ReadOutcome::Pending);
        }

        let end = route.cut_at.unwrap_or(route.response.len()).min(route.response.len());
        if self.cursor >= end {
            return Ok(ReadOutcome::Closed);
        }

        let n = (end - self.cursor).min(buf.len()).min(self.transport.chunk.max(1));
        buf[..n].copy_from_slice(&route.response[self.cursor..self.cursor + n]);
        self.cursor += n;
        self.pending_left = route.pending_before_read;
        Ok(ReadOutcome::Data(n))
    }

    async fn close(self) {
        self.transport.closes += 1;
    }
}

#[derive(Debug, Default)]
pub struct CountingPacer {
    pub pauses: usize,
}

impl Pacer for CountingPacer {
    async fn pause(&mut self) {
        self.pauses += 1;
    }
}

#[derive(Debug, Default)]
pub struct ScriptedLink {
    pub results: VecDeque<Result<(), LinkError>>,
    pub joined_ssids: Vec<String>,
    pub releases: usize,
}

impl ScriptedLink {
    pub fn failing(err: LinkError) -> Self {
        Self {
            results: VecDeque::from([Err(err)]),
            ..Self::default()
        }
    }
}

impl NetworkLink for ScriptedLink {
    async fn join(&mut self, credentials: &WifiCredentials) -> Result<(), LinkError> {
        self.joined_ssids.push(credentials.ssid.clone());
        if !credentials.is_configured() {
            return Err(LinkError::NotConfigured);
        }
        self.results.pop_front().unwrap_or(Ok(()))
    }

    async fn release(&mut self) {
        self.releases += 1;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RenderEvent {
    Splash { wait: bool },
    Status {
        icon: StatusIcon,
        message: MessageCode,
        context: StatusContext,
    },
    Image {
        len: usize,
        hint: RenderHint,
        wait: bool,
    },
    LowPower,
}

#[derive(Debug)]
pub struct RecordingRenderer {
    pub events: Vec<RenderEvent>,
    pub image_result: Result<(), RenderError>,
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            image_result: Ok(()),
        }
    }
}

impl RecordingRenderer {
    pub fn statuses(&self) -> Vec<MessageCode> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RenderEvent::Status { message, .. } => Some(*message),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn show_splash(&mut self, wait: bool) {
        self.events.push(RenderEvent::Splash { wait });
    }

    fn show_status(&mut self, icon: StatusIcon, message: MessageCode, context: &StatusContext) {
        self.events.push(RenderEvent::Status {
            icon,
            message,
            context: *context,
        });
    }

    fn show_image(
        &mut self,
        bytes: &[u8],
        hint: RenderHint,
        wait: bool,
    ) -> Result<(), RenderError> {
        self.events.push(RenderEvent::Image {
            len: bytes.len(),
            hint,
            wait,
        });
        self.image_result
    }

    fn enter_low_power_mode(&mut self) {
        self.events.push(RenderEvent::LowPower);
    }
}

/// A valid 800x480 1bpp bitmap: header, standard palette and blank pixel rows.
pub fn sample_bitmap(inverted: bool) -> Vec<u8> {
    const DATA_OFFSET: u32 = 62;
    const IMAGE_BYTES: u32 = 48_000;

    let mut bmp = vec![0u8; (DATA_OFFSET + IMAGE_BYTES) as usize];
    bmp[0..2].copy_from_slice(b"BM");
    bmp[2..6].copy_from_slice(&(DATA_OFFSET + IMAGE_BYTES).to_le_bytes());
    bmp[10..14].copy_from_slice(&DATA_OFFSET.to_le_bytes());
    bmp[14..18].copy_from_slice(&40u32.to_le_bytes());
    bmp[18..22].copy_from_slice(&800i32.to_le_bytes());
    bmp[22..26].copy_from_slice(&480i32.to_le_bytes());
    bmp[26..28].copy_from_slice(&1u16.to_le_bytes());
    bmp[28..30].copy_from_slice(&1u16.to_le_bytes());
    bmp[34..38].copy_from_slice(&IMAGE_BYTES.to_le_bytes());
    bmp[46..50].copy_from_slice(&2u32.to_le_bytes());

    let (first, second) = if inverted {
        ([255, 255, 255, 0], [0, 0, 0, 0])
    } else {
        ([0, 0, 0, 0], [255, 255, 255, 0])
    };
    bmp[54..58].copy_from_slice(&first);
    bmp[58..62].copy_from_slice(&second);
    bmp
}
