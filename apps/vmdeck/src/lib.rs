//! Remote console embedding for the vmdeck virtualization console.
//!
//! The [`console`] module owns the remote-display session state machine:
//! transport lifecycle, agent capability resolution, per-frame surface
//! binding and the auto-fading status overlay. [`api`] resolves connection
//! parameters from the VM management API and [`transport`] holds the
//! transport contract plus the websocket link and a scripted mock.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod telemetry;
pub mod transport;
