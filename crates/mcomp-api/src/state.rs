//! Application state.

use std::sync::Arc;

use mcomp_worker::Scheduler;

use crate::config::ApiConfig;
use crate::middleware::ClientLimiter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub scheduler: Arc<Scheduler>,
    pub rate_limiter: Arc<ClientLimiter>,
    /// Whether an FFmpeg binary was found at startup
    pub ffmpeg_available: bool,
}

impl AppState {
    pub fn new(config: ApiConfig, scheduler: Arc<Scheduler>) -> Self {
        let rate_limiter = Arc::new(ClientLimiter::new(config.rate_limit_rps));
        let ffmpeg_available = mcomp_media::check_ffmpeg().is_ok();
        Self {
            config,
            scheduler,
            rate_limiter,
            ffmpeg_available,
        }
    }
}
