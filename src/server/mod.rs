/// HTTPサーバーモジュール
///
/// サブスクリプションAPIをHTTP/1.1で公開する。ルーティングとJSON変換は `routes` が担当する。
pub mod routes;


use crate::shared::config::ServerConfig;
use crate::shared::errors::AppResult;
use crate::AppState;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// 接続受け入れに失敗した後の待ち時間
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// APIサーバー
pub struct ApiServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<AppState>,
    read_timeout: Duration,
    shutdown_timeout: Duration,
}

impl ApiServer {
    /// 設定されたアドレスでリッスンを開始する
    ///
    /// ポート0を指定した場合は空いているポートが割り当てられる。
    pub async fn bind(config: &ServerConfig, state: Arc<AppState>) -> AppResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        log::info!("APIサーバーがリッスンを開始しました: http://{local_addr}");

        Ok(Self {
            listener,
            local_addr,
            state,
            read_timeout: config.read_timeout,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// 実際にバインドされたアドレス
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `shutdown` がキャンセルされるまで接続を受け付ける
    ///
    /// # 処理内容
    /// 1. 接続ごとにタスクを起動
    /// 2. キャンセル後は新規接続の受け付けを止める
    /// 3. 処理中の接続の完了を `shutdown_timeout` まで待つ
    pub async fn serve(self, shutdown: CancellationToken) -> AppResult<()> {
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("新規接続の受け付けを停止します");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            log::debug!("接続を受け付けました: {peer}");
                            let state = Arc::clone(&self.state);
                            let shutdown = shutdown.clone();
                            let read_timeout = self.read_timeout;
                            tracker.spawn(handle_connection(stream, state, read_timeout, shutdown));
                        }
                        Err(e) => {
                            // 受け入れエラーではサーバーを止めず、少し待って再試行する
                            log::error!("接続受け入れエラー: {e}");
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        }
                    }
                }
            }
        }

        tracker.close();
        if tokio::time::timeout(self.shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            log::warn!(
                "{}秒以内に終了しなかった接続があります。強制的に終了します",
                self.shutdown_timeout.as_secs()
            );
        }

        log::info!("APIサーバーを停止しました");
        Ok(())
    }
}

/// TCP接続を処理する
async fn handle_connection(
    stream: TcpStream,
    state: Arc<AppState>,
    read_timeout: Duration,
    shutdown: CancellationToken,
) {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req| routes::handle_request(req, Arc::clone(&state)));

    let mut builder = http1::Builder::new();
    builder.timer(TokioTimer::new()).header_read_timeout(read_timeout);

    let connection = builder.serve_connection(io, service);
    let cancelled = shutdown.cancelled();
    tokio::pin!(connection);
    tokio::pin!(cancelled);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(err) = result {
                log::debug!("HTTP接続処理エラー: {err}");
            }
        }
        _ = &mut cancelled => {
            // 処理中のリクエストは最後まで返す
            connection.as_mut().graceful_shutdown();
            if let Err(err) = connection.await {
                log::debug!("終了処理中のHTTP接続エラー: {err}");
            }
        }
    }
}
