use std::sync::Arc;

use crate::services::{
    CatalogService, HistoryService, RegistrationService, SimulatedPaymentGateway, WorkflowSettings,
};
use crate::store::RegistrationStore;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub registrations: RegistrationService,
    pub history: HistoryService,
    pub payments: SimulatedPaymentGateway,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, settings: WorkflowSettings, payments: SimulatedPaymentGateway) -> Self
    where
        S: RegistrationStore + 'static,
    {
        Self {
            catalog: CatalogService::new(store.clone(), settings.clone()),
            registrations: RegistrationService::new(store.clone(), settings.clone()),
            history: HistoryService::new(store, settings),
            payments,
        }
    }
}
