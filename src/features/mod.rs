/// 機能別モジュール
///
/// 各機能モジュールは、その機能に関連するすべてのコード（モデル、コマンド、データベース操作、計算）
/// を含む自己完結型のユニットです。
pub mod subscriptions;
