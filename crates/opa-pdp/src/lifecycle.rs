//! Lifecycle state cell.

use crate::error::HandlerError;
use crate::model::PdpState;
use parking_lot::RwLock;

/// Shared lifecycle state. Starts `PASSIVE`; only the state-change handler
/// writes it.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: RwLock<PdpState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> PdpState {
        *self.state.read()
    }

    /// Whether decisions may be served.
    pub fn is_active(&self) -> bool {
        self.current() == PdpState::Active
    }

    pub fn set(&self, state: PdpState) {
        *self.state.write() = state;
    }

    /// Parse `raw` and store it. The stored value is untouched on error.
    pub fn set_from_str(&self, raw: &str) -> Result<PdpState, HandlerError> {
        let state: PdpState = raw.parse()?;
        self.set(state);
        Ok(state)
    }
}
