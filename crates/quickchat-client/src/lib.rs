//! # quickchat-client
//!
//! The embeddable chat client: session lifecycle, optimistic sends, a
//! local message cache and a background polling task, with cross-instance
//! render sync over a broadcast bus.
//!
//! Each window or embedding surface owns one [`ChatClient`].  Instances
//! that should stay in step share a [`SyncBus`] and a cache store; fresh
//! batches and logouts published by one instance are applied by the
//! others without extra fetches.  All timeline mutations funnel through
//! the merge engine in `quickchat-shared`, so ordering and dedup hold no
//! matter which path a message arrived by.

pub mod bus;
pub mod client;
pub mod config;
pub mod events;
pub mod poller;
pub mod state;
pub mod transport;

mod error;

use tracing_subscriber::{fmt, EnvFilter};

pub use bus::{BusMessage, SyncBus};
pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::{ClientEvent, Notice, NoticeLevel};
pub use poller::{spawn_poller, PollerCommand, PollerConfig, PollerHandle};
pub use state::{ChatState, PendingSend, Session, SharedState};
pub use transport::ChatApi;

/// Initialise tracing for an embedding process.  `RUST_LOG` overrides the
/// default filter.  Call once at process start.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("quickchat_client=debug,quickchat_api=debug,quickchat_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
