//! Minimal HTTP/1.1 framing: one GET request, one response head.

use alloc::{format, string::String};
use core::str;

use super::url::Url;

const USER_AGENT: &str = concat!("inkwake/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResponseHead {
    pub status: u16,
    /// `None` when absent or unparseable.
    pub content_length: Option<u64>,
    pub chunked: bool,
    /// Bytes up to and including the blank line.
    pub head_len: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MalformedHead;

pub fn get_request(url: &Url<'_>) -> String {
    let host = if url.uses_default_port() {
        String::from(url.host)
    } else {
        format!("{}:{}", url.host, url.port)
    };

    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
        url.path, host, USER_AGENT
    )
}

/// Parses a response head from the start of `bytes`.
///
/// Returns `Ok(None)` until the terminating blank line has arrived.
pub fn parse_head(bytes: &[u8]) -> Result<Option<ResponseHead>, MalformedHead> {
    let Some(end) = bytes.windows(4).position(|w| w == b"\r\n\r\n") else {
        return Ok(None);
    };
    let head_len = end + 4;
    let text = str::from_utf8(&bytes[..end]).map_err(|_| MalformedHead)?;

    let mut lines = text.split("\r\n");
    let status = parse_status_line(lines.next().unwrap_or(""))?;

    let mut content_length = None;
    let mut chunked = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(MalformedHead);
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
        }
    }

    Ok(Some(ResponseHead {
        status,
        content_length,
        chunked,
        head_len,
    }))
}

fn parse_status_line(line: &str) -> Result<u16, MalformedHead> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(MalformedHead);
    }

    let code = parts.next().unwrap_or("");
    if code.len() != 3 {
        return Err(MalformedHead);
    }
    code.parse::<u16>().map_err(|_| MalformedHead)
}
