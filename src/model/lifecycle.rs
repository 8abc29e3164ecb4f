//! Compiled model handles and their explicit release.
//!
//! Native model and state memory lives outside Rust's ownership, so a
//! handle is never torn down implicitly: callers must pass it to
//! [`release`]. Dropping an unreleased handle only logs a warning.

use crate::engine::{NativeModel, NativeState, Teardown};
use crate::model::resolver::LoadReport;

/// Exclusive owner of one compiled model and the state built from it.
pub struct ModelHandle {
    report: LoadReport,
    // Field order is drop order: the state must go before its model.
    state: Option<Box<dyn NativeState>>,
    model: Option<Box<dyn NativeModel>>,
}

impl ModelHandle {
    pub(crate) fn new(
        report: LoadReport,
        model: Box<dyn NativeModel>,
        state: Box<dyn NativeState>,
    ) -> Self {
        Self {
            report,
            state: Some(state),
            model: Some(model),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.report.model_id
    }

    /// What was staged (and what was skipped) while loading this handle.
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// The compiled model, or `None` once released.
    pub fn model(&self) -> Option<&dyn NativeModel> {
        self.model.as_deref()
    }

    pub fn state(&self) -> Option<&dyn NativeState> {
        self.state.as_deref()
    }

    pub fn state_mut(&mut self) -> Option<&mut (dyn NativeState + 'static)> {
        self.state.as_deref_mut()
    }

    pub fn is_released(&self) -> bool {
        self.model.is_none() && self.state.is_none()
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_id", &self.report.model_id)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        if !self.is_released() {
            log::warn!(
                "Handle for model '{}' dropped without release; native memory leaked",
                self.report.model_id
            );
        }
    }
}

/// Free a handle's native memory: the state first, then the model.
///
/// Returns `true` if this call released anything. Releasing an already
/// released handle is a no-op, as is a binding without teardown support.
pub fn release(handle: &mut ModelHandle) -> bool {
    if handle.is_released() {
        return false;
    }

    if let Some(mut state) = handle.state.take() {
        if state.release() == Teardown::Unsupported {
            log::debug!("State for '{}' has no explicit teardown", handle.model_id());
        }
    }

    if let Some(mut model) = handle.model.take() {
        if model.release() == Teardown::Unsupported {
            log::debug!("Model '{}' has no explicit teardown", handle.model_id());
        }
    }

    log::debug!("Released handle for model '{}'", handle.model_id());
    true
}
