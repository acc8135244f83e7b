#![forbid(unsafe_code)]

//! Core: terminal capability negotiation and input decoding.
//!
//! # Role in termloom
//! `termloom-core` is the protocol engine. It resolves a terminal-type name
//! against the capability store, compiles the resolved key escape sequences
//! into a lookup table, and runs the streaming decoder that turns raw bytes
//! into logical events.
//!
//! # Primary responsibilities
//! - **Capability resolution**: terminal-type → [`caps::CapabilityRecord`]
//!   with deterministic candidate fallback.
//! - **Key table**: de-duplicated, length-ordered escape-sequence lookup
//!   ([`key_table::KeyTable`]).
//! - **Input decoding**: [`decoder::InputDecoder`] — a bounded-buffer state
//!   machine with time-boxed ambiguity resolution, UTF-8 fallback, and three
//!   mouse-report dialects ([`mouse`]).
//! - **Output padding**: [`pad::PadEngine`] executes capability strings and
//!   honors embedded `$<N>` delay directives.
//!
//! # How it fits in the system
//! The console crate (`termloom-console`) supplies platform primitives
//! (readiness polling, raw reads, device control, live modifier state); the
//! widget layer consumes decoded [`event::Event`] values through the
//! [`dispatch::EventHandler`] seam. Neither direction leaks platform detail
//! into the decoder.

pub mod caps;
pub mod decoder;
pub mod dispatch;
pub mod event;
pub mod key_table;
pub mod mouse;
pub mod pad;
