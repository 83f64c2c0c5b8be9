use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::notification::DeliveryDispatcher;
use crate::triggers::WorkerPool;

use super::context::AppContext;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub context: Arc<AppContext>,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub workers: Arc<WorkerPool>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        context: Arc<AppContext>,
        dispatcher: Arc<DeliveryDispatcher>,
        workers: Arc<WorkerPool>,
    ) -> Self {
        Self {
            settings,
            context,
            dispatcher,
            workers,
            start_time: Instant::now(),
        }
    }
}
