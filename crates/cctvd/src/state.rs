use crate::config::Config;
use crate::engine::EngineHandle;
use cctv_core::{HistoryStore, ModelStatus, RetentionSweeper};
use cctv_hw::Esp32Cam;
use cctv_notify::TelegramNotifier;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared by every request handler and the background sweeper.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: EngineHandle,
    /// Which models loaded at startup; fixed for the life of the process.
    pub models: ModelStatus,
    /// Every history mutation and every sweep happens under this lock.
    pub history: Arc<Mutex<HistoryStore>>,
    pub sweeper: Arc<RetentionSweeper>,
    pub notifier: Arc<TelegramNotifier>,
    pub camera: Arc<Esp32Cam>,
}

impl AppState {
    pub fn new(config: Config, engine: EngineHandle, models: ModelStatus) -> Self {
        let history = HistoryStore::new(&config.output_dir, config.max_history);
        let sweeper = RetentionSweeper::new(&config.output_dir, config.retention_days);
        let notifier = TelegramNotifier::new(
            config.telegram_bot_token.clone(),
            config.telegram_chat_id.clone(),
        );
        if !notifier.is_enabled() {
            tracing::warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set; notifications disabled");
        }
        let camera = Esp32Cam::new(&config.esp32_cam_url);

        Self {
            config: Arc::new(config),
            engine,
            models,
            history: Arc::new(Mutex::new(history)),
            sweeper: Arc::new(sweeper),
            notifier: Arc::new(notifier),
            camera: Arc::new(camera),
        }
    }
}
