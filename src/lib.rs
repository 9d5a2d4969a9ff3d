//! Document synchronization controller.
//!
//! Keeps a single collaboratively edited document consistent between a local
//! editor surface, a realtime transport, and a durable commit history, while
//! tolerating disconnects, out-of-order delivery, and oversized payloads.
//!
//! The crate is transport- and storage-agnostic: the durable store, the
//! realtime transport, the crypto layer, and the editor's message port are
//! consumed as traits ([`store::DurableStore`], [`transport::RealtimeTransport`],
//! [`store::CommitDecrypter`], [`bridge::BridgePort`]). Host glue drives the
//! controller by feeding it connection events, server events, and remote
//! updates, and observes it through the broadcast event channel.

pub mod bridge;
pub mod comments;
pub mod commit;
pub mod config;
pub mod connection;
pub mod controller;
pub mod facade;
pub mod meta;
pub mod store;
pub mod transport;
pub mod update;

pub use bridge::{BridgePort, EditorHandle, InvocationBridge};
pub use comments::CommentsHub;
pub use commit::{Commit, CommitId, UpdateMerger};
pub use config::{DeploymentTier, DocumentKind, SyncConfig};
pub use controller::events::DocEvent;
pub use controller::{ControllerError, DocController, SquashOutcome};
pub use facade::OrchestratorFacade;
pub use meta::{DocumentMeta, Role};
pub use update::DocumentUpdate;
