use std::sync::Arc;

use common::{Clock, storage::MediaStore};
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub media_store: Arc<dyn MediaStore>,
    pub clock: Arc<dyn Clock>,
}
