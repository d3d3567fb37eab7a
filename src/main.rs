use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match subscription_stats_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("アプリケーションの実行中にエラーが発生しました: {e}");
            eprintln!("アプリケーションの実行中にエラーが発生しました: {e}");
            ExitCode::FAILURE
        }
    }
}
