#![no_std]

//! ESP32-S3 adapters for the inkwake wake cycle: flash store, RTC retention, wake button,
//! Wi-Fi link, TLS transport and the e-paper renderer.

extern crate alloc;

pub mod input;
pub mod network;
pub mod platform;
pub mod storage;
