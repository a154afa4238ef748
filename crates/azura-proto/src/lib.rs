//! Shared types and wire parsing for the Azuracast now-playing subsystem.
//!
//! Everything in this crate is pure and synchronous: the frame parser, the
//! status snapshot it produces, and the station/config-document models that
//! the resolver and coordinator consume. Sockets and HTTP live in
//! `azura-client`.

pub mod frame;
pub mod stations;
pub mod status;
