//! Page-load lifetime state.
//!
//! A [`PageState`] lives for one page load and is carried by the host
//! across the re-renders of that load (the way a UI framework keeps its
//! per-session scratch state). A reload starts a fresh one.

use uuid::Uuid;

use crate::error::RestoreFailure;
use crate::token::SessionRecord;

/// Where the page load stands on restoring a stored session.
///
/// Only moves forward: `NotAttempted → Pending → {Restored | NotFound | Failed}`.
/// Terminal states are final for the page load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RestoreStatus {
    #[default]
    NotAttempted,
    /// The store could not answer within this render.
    Pending,
    Restored(SessionRecord),
    NotFound,
    Failed(RestoreFailure),
}

impl RestoreStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Restored(_) | Self::NotFound | Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotAttempted => "not_attempted",
            Self::Pending => "pending",
            Self::Restored(_) => "restored",
            Self::NotFound => "not_found",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: &RestoreStatus) -> bool {
        match self {
            Self::NotAttempted => !matches!(next, Self::NotAttempted),
            Self::Pending => !matches!(next, Self::NotAttempted),
            _ => false,
        }
    }
}

/// Authentication state for one page load.
#[derive(Debug)]
pub struct PageState {
    page_load_id: Uuid,
    status: RestoreStatus,
    session: Option<SessionRecord>,
    restore_attempts: u32,
    pending_observations: u32,
    just_signed_up: bool,
}

impl Default for PageState {
    fn default() -> Self {
        Self::new()
    }
}

impl PageState {
    pub fn new() -> Self {
        Self {
            page_load_id: Uuid::new_v4(),
            status: RestoreStatus::NotAttempted,
            session: None,
            restore_attempts: 0,
            pending_observations: 0,
            just_signed_up: false,
        }
    }

    pub fn page_load_id(&self) -> Uuid {
        self.page_load_id
    }

    pub fn status(&self) -> &RestoreStatus {
        &self.status
    }

    pub fn session(&self) -> Option<&SessionRecord> {
        self.session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Gateway restore calls made during this page load.
    pub fn restore_attempts(&self) -> u32 {
        self.restore_attempts
    }

    /// Renders on which the store answered `Pending`.
    pub fn pending_observations(&self) -> u32 {
        self.pending_observations
    }

    /// Consume the one-shot "account just created and signed in" flag.
    pub fn take_just_signed_up(&mut self) -> bool {
        std::mem::take(&mut self.just_signed_up)
    }

    /// Move to `next` if legal. Illegal moves are logged and ignored.
    pub(crate) fn advance(&mut self, next: RestoreStatus) -> bool {
        if self.status == RestoreStatus::Pending && next == RestoreStatus::Pending {
            self.pending_observations += 1;
            return true;
        }
        if !self.status.can_advance_to(&next) {
            tracing::warn!(
                page_load = %self.page_load_id,
                from = self.status.label(),
                to = next.label(),
                "Ignoring backward restore transition"
            );
            return false;
        }
        if next == RestoreStatus::Pending {
            self.pending_observations += 1;
        }
        tracing::debug!(
            page_load = %self.page_load_id,
            from = self.status.label(),
            to = next.label(),
            "Restore status changed"
        );
        self.status = next;
        true
    }

    pub(crate) fn install(&mut self, record: SessionRecord) {
        self.session = Some(record);
    }

    pub(crate) fn take_session(&mut self) -> Option<SessionRecord> {
        self.session.take()
    }

    pub(crate) fn record_restore_attempt(&mut self) {
        self.restore_attempts += 1;
    }

    pub(crate) fn mark_just_signed_up(&mut self) {
        self.just_signed_up = true;
    }
}
