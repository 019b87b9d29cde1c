#![cfg_attr(not(test), no_std)]
//! A man-in-the-middle OpenTherm gateway: sits electrically between a
//! thermostat and a boiler, decodes and re-encodes the Manchester-coded
//! OpenTherm frames that pass between them, and gives the embedding
//! firmware a place to read telemetry, inject diagnostic queries, and
//! substitute its own setpoint/CH-enable overrides.
//!
//! This crate has no opinion on which microcontroller, executor, or
//! wiring it runs under — it consumes `embedded_hal` digital pins and a
//! small [`hal::Clock`] trait, and exposes [`mediator::Mediator::step`]
//! for the embedding firmware to drive from whatever task loop it already
//! has.

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod frame;
pub mod hal;
pub mod line_driver;
pub mod logging;
pub mod manchester;
pub mod mediator;
pub mod override_box;
pub mod port;
pub mod telemetry;

pub use config::{GatewayConfig, OperatingMode};
pub use error::{ConfigError, DecodeError, PortError, ReceiveError};
pub use frame::{DataId, Frame, MessageType, StatusFlags};
pub use logging::{DropEvent, DropReason, LogEvent, LogHook, NullLogHook, Source};
pub use mediator::{MediatorStatus, Mediator};
pub use port::{Port, PortState, PortStats, PortStatsSnapshot, Role};
