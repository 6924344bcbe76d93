//! Authentication for a page that is re-rendered from scratch on every
//! interaction.
//!
//! Provides:
//! - Login, signup (with form checks) and logout against an [`IdentityGateway`](crate::identity::IdentityGateway)
//! - Restoration of a persisted session on page load, tolerant of stores that
//!   answer asynchronously
//! - Page-load state carried across re-renders ([`PageState`])
//!
//! ## Design Decisions
//! - No ambient globals: the host owns a [`SessionServices`] and a
//!   [`PageState`] and hands a [`SessionManager`] to whatever needs auth.
//! - Restoration is a forward-only state machine ([`RestoreStatus`]); a
//!   terminal state is never left during the page load, which bounds
//!   provider calls to one per load.
//! - Any restore failure clears the stored tokens so the next load does not
//!   retry them.

pub mod manager;
pub mod state;
pub mod validation;

pub use manager::{RerenderRequests, RerenderTrigger, SessionManager, SessionServices, SignupOutcome};
pub use state::{PageState, RestoreStatus};
pub use validation::{validate_login, SignupForm, MIN_PASSWORD_LEN};
