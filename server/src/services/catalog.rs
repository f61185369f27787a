use std::sync::Arc;

use uuid::Uuid;

use super::EngineError;
use crate::models::{Pass, VenuePartnership};
use crate::store::CatalogStore;

/// Read-only view over the pass catalog. Editing passes belongs to catalog management.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn CatalogStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn get_pass(&self, pass_id: Uuid) -> Result<Pass, EngineError> {
        self.store
            .load_pass(pass_id)
            .await?
            .ok_or(EngineError::PassNotFound(pass_id))
    }

    /// The active partnership for `(pass_id, venue_id)`.
    pub async fn get_venue_partnership(
        &self,
        pass_id: Uuid,
        venue_id: Uuid,
    ) -> Result<VenuePartnership, EngineError> {
        let pass = self.get_pass(pass_id).await?;
        pass.partnership_for(venue_id)
            .cloned()
            .ok_or(EngineError::PartnershipNotFound { pass_id, venue_id })
    }
}
