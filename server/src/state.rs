use crate::services::PassEngine;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: PassEngine,
}

impl AppState {
    pub fn new(engine: PassEngine) -> Self {
        Self { engine }
    }
}
