use crate::features::subscriptions::filter::PaginationMode;
use crate::shared::errors::{AppError, AppResult};
use chrono_tz::Tz;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: String,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        let environment = get_environment();
        let debug_mode = environment == Environment::Development;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        Self {
            environment: format!("{environment:?}").to_lowercase(),
            debug_mode,
            log_level,
        }
    }

    /// プロダクション環境かどうかを判定
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. デバッグビルドの場合は Development
/// 3. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = match env_var.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    // フォールバック: ビルド設定に基づく判定
    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_subscriptions.db"
/// - プロダクション環境: "subscriptions.db"
pub fn get_database_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => "dev_subscriptions.db",
        Environment::Production => "subscriptions.db",
    }
}

/// 環境に応じた.envファイルを読み込む
pub fn load_environment_variables() {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    let env_file = match environment.as_str() {
        "production" => ".env.production",
        _ => ".env",
    };

    // ロガー初期化前に呼ばれるため、ここでのログは出力されないことがある
    match dotenv::from_filename(env_file) {
        Ok(_) => {
            log::info!("{env_file}ファイルを読み込みました");
        }
        Err(_) => {
            if env_file != ".env" && dotenv::dotenv().is_ok() {
                log::warn!("{env_file}が見つからないため、デフォルトの.envファイルを読み込みました");
            } else {
                log::warn!("環境変数ファイルが見つかりません。直接設定された環境変数を使用します。");
            }
        }
    }
}

/// ログシステムを初期化する
///
/// # 処理内容
/// 1. 環境設定を取得
/// 2. ログレベルを設定
/// 3. env_loggerを初期化
pub fn initialize_logging_system() {
    let env_config = EnvironmentConfig::from_env();

    let log_level = match env_config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    // テストなどで二重に初期化されても失敗しないようにtry_initを使う
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init();

    log::info!(
        "ログシステムを初期化しました: level={}, environment={}",
        env_config.log_level,
        env_config.environment
    );
}

/// サブスクリプションの保存先
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    /// SQLiteファイル
    Sqlite(PathBuf),
    /// プロセス内メモリ（再起動で消える）
    Memory,
}

/// HTTPサーバーの設定を管理する構造体
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 待ち受けアドレス
    pub bind_addr: SocketAddr,
    /// 保存先
    pub storage: StorageBackend,
    /// 一覧取得時のページング適用順序
    pub pagination_mode: PaginationMode,
    /// 「今月」を決めるタイムゾーン
    pub timezone: Tz,
    /// リクエストヘッダー読み込みのタイムアウト
    pub read_timeout: Duration,
    /// シャットダウン時に処理中の接続を待つ時間
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            storage: StorageBackend::Memory,
            pagination_mode: PaginationMode::BeforeFilter,
            timezone: Tz::UTC,
            read_timeout: Duration::from_secs(3),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// 環境変数からサーバー設定を読み込む
    pub fn from_env() -> AppResult<Self> {
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        log::info!(
            "サーバー設定を読み込みました: bind={}, storage={:?}, pagination={:?}, timezone={}",
            config.bind_addr,
            config.storage,
            config.pagination_mode,
            config.timezone
        );

        Ok(config)
    }

    /// 任意の値の取得元からサーバー設定を組み立てる
    ///
    /// # 引数
    /// * `lookup` - 変数名から値を返す関数（未設定はNone）
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = match lookup("HTTP_BIND") {
            Some(value) => parse_bind_addr(&value)?,
            None => defaults.bind_addr,
        };

        let storage = match lookup("STORAGE_BACKEND").as_deref() {
            None | Some("sqlite") => {
                let path = match lookup("DATABASE_PATH") {
                    Some(path) => PathBuf::from(path),
                    None => default_database_path()?,
                };
                StorageBackend::Sqlite(path)
            }
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(AppError::configuration(format!(
                    "STORAGE_BACKEND must be 'sqlite' or 'memory', got '{other}'"
                )))
            }
        };

        let pagination_mode = match lookup("PAGINATION_MODE").as_deref() {
            None | Some("before_filter") => PaginationMode::BeforeFilter,
            Some("after_filter") => PaginationMode::AfterFilter,
            Some(other) => {
                return Err(AppError::configuration(format!(
                    "PAGINATION_MODE must be 'before_filter' or 'after_filter', got '{other}'"
                )))
            }
        };

        let timezone = match lookup("APP_TIMEZONE") {
            Some(name) => name.parse::<Tz>().map_err(|e| {
                AppError::configuration(format!("APP_TIMEZONE is invalid: {e}"))
            })?,
            None => defaults.timezone,
        };

        let read_timeout = parse_seconds(&lookup, "READ_TIMEOUT_SECS")?.unwrap_or(defaults.read_timeout);
        let shutdown_timeout =
            parse_seconds(&lookup, "SHUTDOWN_TIMEOUT_SECS")?.unwrap_or(defaults.shutdown_timeout);

        Ok(Self {
            bind_addr,
            storage,
            pagination_mode,
            timezone,
            read_timeout,
            shutdown_timeout,
        })
    }
}

/// 待ち受けアドレスを解析する
///
/// ポート番号だけが指定された場合は全インターフェースで待ち受ける。
fn parse_bind_addr(value: &str) -> AppResult<SocketAddr> {
    let value = value.trim();
    let value = value.strip_prefix(':').unwrap_or(value);

    if let Ok(port) = value.parse::<u16>() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }

    value
        .parse::<SocketAddr>()
        .map_err(|e| AppError::configuration(format!("HTTP_BIND is invalid '{value}': {e}")))
}

fn parse_seconds<F>(lookup: &F, key: &str) -> AppResult<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| AppError::configuration(format!("{key} is invalid '{value}': {e}")))
        })
        .transpose()
}

/// データディレクトリ内のデータベースファイルパスを取得する
fn default_database_path() -> AppResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| AppError::configuration("データディレクトリを特定できません"))?;

    Ok(data_dir
        .join("subscription-stats")
        .join(get_database_filename(get_environment())))
}
