/// SQLite接続とスキーマ管理
pub mod connection;

pub use connection::{create_tables, initialize_database};
