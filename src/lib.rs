pub mod features;
pub mod server;
pub mod shared;

use features::subscriptions::{
    Clock, InMemorySubscriptionRepository, PaginationMode, SqliteSubscriptionRepository,
    SubscriptionRepository, SystemClock,
};
use log::{error, info, warn};
use server::ApiServer;
use shared::config::{EnvironmentConfig, ServerConfig, StorageBackend};
use shared::errors::{AppError, AppResult};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// アプリケーション状態（リポジトリと時計を保持）
pub struct AppState {
    repository: Mutex<Box<dyn SubscriptionRepository>>,
    pub clock: Arc<dyn Clock>,
    pub pagination_mode: PaginationMode,
}

impl AppState {
    pub fn new(
        repository: Box<dyn SubscriptionRepository>,
        clock: Arc<dyn Clock>,
        pagination_mode: PaginationMode,
    ) -> Self {
        Self {
            repository: Mutex::new(repository),
            clock,
            pagination_mode,
        }
    }

    /// リポジトリのロックを取得する
    pub fn lock_repository(&self) -> AppResult<MutexGuard<'_, Box<dyn SubscriptionRepository>>> {
        self.repository
            .lock()
            .map_err(|e| AppError::concurrency(format!("データベースロックエラー: {e}")))
    }
}

/// 設定に従って保存先を開く
pub fn open_repository(storage: &StorageBackend) -> AppResult<Box<dyn SubscriptionRepository>> {
    match storage {
        StorageBackend::Sqlite(path) => {
            info!("データベースを初期化しています: {}", path.display());
            let conn = shared::database::initialize_database(path)?;
            Ok(Box::new(SqliteSubscriptionRepository::new(conn)))
        }
        StorageBackend::Memory => {
            info!("メモリ上の保存先を使用します（再起動でデータは消えます）");
            Ok(Box::new(InMemorySubscriptionRepository::default()))
        }
    }
}

/// アプリケーションを起動し、終了シグナルを受け取るまで待機する
///
/// # 処理内容
/// 1. 環境変数とログシステムを初期化
/// 2. 設定を読み込み、保存先を開く
/// 3. APIサーバーを起動
/// 4. SIGINT/SIGTERMで新規接続を止め、処理中の接続を待って終了
pub async fn run() -> AppResult<()> {
    shared::load_environment_variables();
    shared::initialize_logging_system();

    info!("アプリケーション初期化を開始します...");

    let config = ServerConfig::from_env().map_err(|e| {
        error!("設定の読み込みに失敗しました: {e}");
        e
    })?;

    if EnvironmentConfig::from_env().is_production() && config.storage == StorageBackend::Memory {
        warn!("本番環境でメモリ上の保存先が指定されています。再起動でデータは失われます");
    }

    let repository = open_repository(&config.storage).map_err(|e| {
        error!("保存先の初期化に失敗しました: {e}");
        e
    })?;

    let state = Arc::new(AppState::new(
        repository,
        Arc::new(SystemClock::new(config.timezone)),
        config.pagination_mode,
    ));

    let server = ApiServer::bind(&config, state).await?;
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

    info!("アプリケーション初期化が完了しました");

    server.serve(shutdown).await
}

/// SIGINT（Ctrl+C）またはSIGTERMを待つ
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Ctrl+Cハンドラーの登録に失敗しました: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("SIGTERMハンドラーの登録に失敗しました: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINTを受信しました。終了処理を開始します"),
        _ = terminate => info!("SIGTERMを受信しました。終了処理を開始します"),
    }
}
