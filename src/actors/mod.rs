//! Actor-based monitoring engine
//!
//! Each actor runs as an independent tokio task. Actors talk through
//! channels and are stopped through a tree of cancellation tokens.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │  DiscoveryActor  │ ◄── root token
//!                  └────────┬─────────┘
//!                           │ spawns one per guid (MonitoredSet)
//!             ┌─────────────┼─────────────┐
//!             │             │             │
//!      ┌──────▼──────┐      │      ┌──────▼──────┐
//!      │ AppMonitor  │      │      │ AppMonitor  │ ◄── child tokens
//!      │  (app A)    │      │      │  (app N)    │
//!      └──┬───────┬──┘      │      └──┬───────┬──┘
//!         │       │ spawns  │         │       │
//!         │  ┌────▼─────┐   │         │  ┌────▼─────┐
//!         │  │ Firehose │   │         │  │ Firehose │ ◄── grandchild tokens
//!         │  └────┬─────┘   │         │  └────┬─────┘
//!         └───────┴─────────┼─────────┴───────┘
//!                           │ emit (never blocks)
//!                  ┌────────▼─────────┐
//!                  │  Emitter queue   │ bounded
//!                  └────────┬─────────┘
//!                  ┌────────▼─────────┐
//!                  │  DeliveryActor   │ ──► Sink
//!                  └──────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **DiscoveryActor**: lists the space and starts monitors for new applications
//! - **AppMonitor**: polls summary and events of one application
//! - **FirehoseActor**: consumes the envelope stream of one application
//! - **DeliveryActor**: drains the outbound queue into the sink
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: mpsc command channel with oneshot responses (discovery)
//! 2. **State**: watch channels publishing monitor lifecycle
//! 3. **Telemetry**: a single bounded mpsc queue, shed when full

pub mod app_monitor;
pub mod discovery;
pub mod emitter;
pub mod firehose;
pub mod messages;
pub mod registry;
