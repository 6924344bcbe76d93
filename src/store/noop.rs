//! Store for deployments that keep sessions for the current page load only.

use super::{SessionStore, StoreKind, StoreRead};
use crate::token::TokenPair;

/// Never persists anything; every read is [`StoreRead::Absent`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl SessionStore for NoopStore {
    fn kind(&self) -> StoreKind {
        StoreKind::None
    }

    fn read(&self) -> StoreRead {
        StoreRead::Absent
    }

    fn write(&self, _tokens: &TokenPair) {}

    fn clear(&self) {}
}
