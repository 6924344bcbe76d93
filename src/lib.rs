//! Session persistence and restoration for stateless, re-rendered pages.
//!
//! A dashboard built on a re-run-everything UI framework loses its
//! in-memory state on reload. This crate keeps the user signed in across
//! reloads by persisting the identity provider's token pair in a browser
//! channel (cookie, query parameter or `localStorage`) and restoring it
//! once per page load.
//!
//! ```text
//!  host render loop
//!        │  begin_render(&mut PageState)
//!        ▼
//!  SessionManager ──read/write/clear──▸ SessionStore ──▸ cookie | ?s= | localStorage
//!        │                                   │
//!        │                                 codec (JSON | URL-safe base64)
//!        ▼
//!  IdentityGateway ──▸ Supabase GoTrue | in-memory
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod integrations;
pub mod logging;
pub mod store;
pub mod token;

pub use auth::{
    PageState, RerenderRequests, RerenderTrigger, RestoreStatus, SessionManager, SessionServices,
    SignupForm, SignupOutcome,
};
pub use config::SessionConfig;
pub use error::{AuthError, CodecError, GatewayError, RestoreFailure, TransportError};
pub use identity::{AuthResponse, AuthUser, IdentityGateway, MemoryGateway};
pub use store::{BrowserChannels, SessionStore, StoreKind, StoreRead};
pub use token::{SessionRecord, TokenPair};
