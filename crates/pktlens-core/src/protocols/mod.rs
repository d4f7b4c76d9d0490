//! Protocol header decoding.
//!
//! Each protocol is decoded by a pure parser over a byte slice, built on
//! etherparse's zero-copy header slices:
//! - one module per protocol returning an owned, typed header
//! - `error`: the single reason a parser can fail
//!
//! Chaining the parsers into a layer stack lives in `analysis`.

pub mod error;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod tcp;
pub mod udp;
