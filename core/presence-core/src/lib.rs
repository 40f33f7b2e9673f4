//! # presence-core
//!
//! Keeps a local IPC channel open to the desktop chat client and reports what
//! the user is playing as rich presence.
//!
//! ## Design
//!
//! - **Blocking, one worker thread**: the [`Session`] owns a single worker that
//!   discovers an endpoint, handshakes, and pushes the current [`Presence`]
//!   every two seconds. No async runtime is involved.
//! - **Shared state is one mutex**: the caller refreshes the [`PresenceStore`]
//!   from media metadata; the worker only ever copies a snapshot out of it.
//! - **Platform divergence stays in `transport`**: Unix domain sockets and
//!   Windows named pipes implement the same [`Transport`] contract.
//! - **Nothing here is fatal**: a missing peer or a dropped connection only
//!   means presence is not shown until the next retry.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use presence_core::{FileSettings, Session, SettingsProvider};
//!
//! let settings = FileSettings::default_location().load_settings();
//! let mut session = Session::with_platform_transport(settings, Box::new(my_player));
//! session.start()?;
//! // on the host timer:
//! session.request_update();
//! // on shutdown:
//! session.stop()?;
//! ```

pub mod connector;
pub mod error;
pub mod format;
pub mod metadata;
pub mod session;
pub mod settings;
pub mod sink;
pub mod store;
pub mod transport;

pub use connector::{Connector, IpcConnector, IpcLink, Link, READ_TIMEOUT, WRITE_TIMEOUT};
pub use error::{ConfigError, PresenceError, Result, TransportError};
pub use format::format_presence;
pub use metadata::{MediaMetadata, MetadataProvider, NoMedia};
pub use session::{Session, SessionState};
pub use settings::{FileSettings, Settings, SettingsProvider, DEFAULT_APP_ID};
pub use sink::{ErrorSink, Reporter, TracingSink};
pub use store::PresenceStore;
pub use transport::{Connection, Endpoint, PlatformTransport, Transport, MAX_ENDPOINTS};

pub use presence_protocol::{BoundedText, Presence};
