use std::sync::Arc;

use crate::application::catalog::CatalogService;
use crate::application::provider::MusicProvider;
use crate::application::session::CatalogSession;
use crate::regen::PageScheduler;

#[derive(Clone)]
pub struct ApiState {
    pub catalog: CatalogService,
    /// Server-wide read context: concurrent identical reads share one fetch.
    pub session: Arc<CatalogSession>,
    pub provider: Arc<dyn MusicProvider>,
    pub scheduler: PageScheduler,
}
