//! Sticky-session connection router.
//!
//! One listening endpoint served by a pool of independent workers, with the
//! guarantee that every connection carrying a given session id reaches the
//! worker that owns that session, and that new traffic is balanced across
//! workers.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌────────────────────────────────────────────────────┐
//!                  │                      ROUTER                         │
//!   Inbound        │  ┌─────────┐   ┌─────────┐   ┌──────────────────┐  │
//!   connection ────┼─▶│   net   │──▶│  sniff  │──▶│ registry         │  │
//!                  │  │listener │   │sid/upgr │   │ affinity + loads │  │
//!                  │  └─────────┘   └─────────┘   └────────┬─────────┘  │
//!                  │                                       │ no affinity │
//!                  │                                       ▼             │
//!                  │                               ┌──────────────┐     │
//!                  │                               │   balancer   │     │
//!                  │                               └──────┬───────┘     │
//!                  └───────────────────────────────────────┼────────────┘
//!                                  handoff channel         │ socket moves once
//!                  ┌───────────────────────────────────────▼────────────┐
//!                  │                   WORKER AGENT                      │
//!                  │  ┌─────────┐    ┌──────────┐    ┌───────────────┐  │
//!                  │  │ replay  │    │  tunnel  │───▶│  application  │  │
//!                  │  │ stream  │───▶│reassembly│    │    server     │  │
//!                  │  └─────────┘    └──────────┘    └───────┬───────┘  │
//!                  │        session open/close signals       │          │
//!                  └──────────────────────┬──────────────────┘          │
//!                                         ▼ control channel             │
//!                               registry bookkeeping ◀───────────────────┘
//! ```
//!
//! The application server that speaks HTTP/WebSocket over the handed-off
//! connections is an external collaborator: it consumes injected
//! connections and emits session signals, nothing more.

// Routing core
pub mod balancer;
pub mod registry;
pub mod router;
pub mod sniff;

// Handoff protocol and worker side
pub mod handoff;
pub mod worker;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod net;

pub use config::RouterConfig;
pub use error::RouteError;
pub use router::Router;
