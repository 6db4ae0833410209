// Shared state of the operational HTTP server
use std::sync::Arc;

use searcher_repository::SearchIndexStore;

use crate::consumer::ConsumerHealth;
use crate::monitor::OffsetMonitor;
use crate::reconciler::SyncReconciler;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SearchIndexStore>,
    pub health: Arc<ConsumerHealth>,
    pub monitor: Arc<OffsetMonitor>,
    pub reconciler: Arc<SyncReconciler>,
}
