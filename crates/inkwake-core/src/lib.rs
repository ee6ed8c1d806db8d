#![cfg_attr(not(test), no_std)]

//! Wake-cycle logic for the inkwake e-paper frame.
//!
//! Everything here is hardware independent: collaborators (store, network link, transport,
//! renderer, input) are traits implemented by the board crate and by test doubles.

extern crate alloc;

pub mod backoff;
pub mod bmp;
pub mod config;
pub mod counters;
pub mod crypto;
pub mod fetch;
pub mod input;
pub mod manifest;
pub mod network;
pub mod orchestrator;
pub mod render;
pub mod retention;
pub mod sentinel;

#[cfg(test)]
mod testing;
