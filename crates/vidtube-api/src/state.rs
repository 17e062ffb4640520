use std::path::PathBuf;
use std::sync::Arc;

use vidtube_db::Database;
use vidtube_media::MediaUploader;

use crate::error::ApiResult;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub uploader: Arc<dyn MediaUploader>,
    pub tokens: TokenService,
    /// Where multipart file fields are spooled before upload.
    pub temp_dir: PathBuf,
    /// Marks auth cookies `Secure`. Set in production.
    pub secure_cookies: bool,
    pub default_page_size: u32,
}

/// Run a store call on the blocking pool.
pub async fn run_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    Ok(tokio::task::spawn_blocking(move || f(&state.db)).await??)
}
