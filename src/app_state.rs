use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::ChatServices;
use crate::websocket::manager::WebSocketManager;

#[derive(Clone)]
pub struct AppState {
    pub services: ChatServices,
    pub websocket_manager: WebSocketManager,
    pub config: Arc<AppConfig>,
}
