pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::repositories::AssessmentStore;
use crate::services::{
    attempt_service::AttemptService, manual_grading::GradingPolicy, test_service::TestService,
};
use crate::utils::time::Clock;

pub struct AppState<S> {
    pub test_service: TestService<S>,
    pub attempt_service: AttemptService<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            test_service: self.test_service.clone(),
            attempt_service: self.attempt_service.clone(),
        }
    }
}

impl<S: AssessmentStore> AppState<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, policy: GradingPolicy) -> Self {
        Self {
            test_service: TestService::new(store.clone(), clock.clone()),
            attempt_service: AttemptService::new(store, clock, policy),
        }
    }
}
