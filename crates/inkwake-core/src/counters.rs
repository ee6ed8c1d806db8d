//! Persistent key/value abstraction and the retry counters kept in it.

use alloc::string::String;
use core::fmt::Debug;

use log::warn;

use crate::{
    backoff::{BackoffSchedule, DOWNLOAD_BACKOFF, WIFI_BACKOFF},
    config::{KEY_API_RETRY, KEY_WIFI_RETRY},
};

/// Durable, scoped key/value store that survives power loss.
///
/// Reads of absent keys return `Ok(None)`. `erase_all` must work before `open`, because a
/// factory reset runs ahead of normal storage bring-up.
pub trait KeyValueStore {
    type Error: Debug;

    fn open(&mut self) -> Result<(), Self::Error>;
    fn get_u32(&mut self, key: &str) -> Result<Option<u32>, Self::Error>;
    fn put_u32(&mut self, key: &str, value: u32) -> Result<(), Self::Error>;
    fn get_string(&mut self, key: &str) -> Result<Option<String>, Self::Error>;
    fn put_string(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;
    fn remove(&mut self, key: &str) -> Result<(), Self::Error>;
    fn erase_all(&mut self) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Counter {
    WifiRetry,
    ApiRetry,
}

impl Counter {
    pub const fn key(self) -> &'static str {
        match self {
            Self::WifiRetry => KEY_WIFI_RETRY,
            Self::ApiRetry => KEY_API_RETRY,
        }
    }

    pub const fn schedule(self) -> BackoffSchedule {
        match self {
            Self::WifiRetry => WIFI_BACKOFF,
            Self::ApiRetry => DOWNLOAD_BACKOFF,
        }
    }
}

/// Retry counters over a [`KeyValueStore`]. Counters are `>= 1`; 1 means "no recent failure".
pub struct CounterStore<'a, S> {
    store: &'a mut S,
}

impl<'a, S: KeyValueStore> CounterStore<'a, S> {
    pub const INITIAL: u32 = 1;

    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Reads the counter; absent, zero and unreadable values all read as 1.
    pub fn get_or_default(&mut self, counter: Counter) -> u32 {
        match self.store.get_u32(counter.key()) {
            Ok(value) => value.unwrap_or(Self::INITIAL).max(Self::INITIAL),
            Err(err) => {
                warn!("counters: read failed key={} err={:?}", counter.key(), err);
                Self::INITIAL
            }
        }
    }

    pub fn set(&mut self, counter: Counter, value: u32) -> Result<(), S::Error> {
        self.store.put_u32(counter.key(), value.max(Self::INITIAL))
    }

    pub fn reset(&mut self, counter: Counter) -> Result<(), S::Error> {
        self.set(counter, Self::INITIAL)
    }

    /// Stores `current + 1` and returns the value that was current before the bump.
    pub fn increment(&mut self, counter: Counter) -> Result<u32, S::Error> {
        let current = self.get_or_default(counter);
        self.set(counter, current.saturating_add(1))?;
        Ok(current)
    }
}
