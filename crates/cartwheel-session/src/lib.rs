#![cfg_attr(feature = "native", allow(unsafe_op_in_unsafe_fn))]

//! Host-side session runtime for a pre-built GB/GBC/GBA emulation core.
//!
//! The native core is consumed through the typed [`native::NativeCore`]
//! interface. A [`session::Session`] owns the ROM, drives the core once per
//! display tick, translates controller state into the core's input mask,
//! moves pixels and audio out of core memory, and keeps battery saves in
//! sync with storage.

/// Audio half of the frame/audio bridge and the [`audio::AudioSink`] contract.
pub mod audio;

/// Frame/audio bridge: the host side of the core's render and sound callbacks.
pub mod bridge;

/// Session configuration, platform variants and rotation.
pub mod config;

/// Native core adapter over `cartwheel-core-sys`.
pub mod ffi;

/// Controller polling and the rotation-aware input mask.
pub mod input;

/// Bounds-checked views over the core's linear memory.
pub mod memory;

/// Typed interface of the native core and its host callbacks.
pub mod native;

/// Cartridge image loading and fingerprinting.
pub mod rom;

/// Battery save load/restore/persist, including legacy migration.
pub mod save;

/// Session lifecycle and the per-frame tick.
pub mod session;

/// Key/value storage contract and the named-file save collection.
pub mod storage;

/// Directory-backed storage.
mod std_storage;

/// Pixel decoding and the host framebuffer.
pub mod video;

pub use std_storage::StdStorage;
