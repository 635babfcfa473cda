//! Link-layer protocol engine for transferring a text file between two
//! peers over a half-duplex serial link: framing, CRC-32 validation,
//! ENQ/ACK/RVI turn arbitration, bounded retransmission, and
//! randomized timeouts.
//!
//! The GUI shell, the concrete transport widget, and the file chooser
//! dialog are out of scope -- this crate exposes only the
//! [`Engine`] and the narrow contracts it talks to.
pub mod classifier;
pub mod config;
pub mod crc32;
pub mod engine;
pub mod file_source;
pub mod framer;
pub mod log;
pub mod serialport;
pub mod termios;

pub use engine::{Engine, EngineEvent, Error, Telemetry};
