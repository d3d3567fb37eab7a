/// サブスクリプション機能モジュール
///
/// このモジュールは、サブスクリプション管理に関連するすべての機能を提供します：
/// - サブスクリプションの作成、読み取り、更新、削除
/// - 問い合わせ期間に有効なサブスクリプションの絞り込み
/// - 問い合わせ期間の費用合計（月単位の按分）
pub mod aggregator;
pub mod commands;
pub mod filter;
pub mod memory;
pub mod models;
pub mod period;
pub mod repository;

// 公開インターフェース
pub use commands::{
    create_subscription, delete_subscription, get_subscription, get_subscription_stats,
    get_subscriptions, parse_subscription_id, update_subscription,
};

pub use aggregator::{prorate, total_cost, Proration};
pub use filter::{list_active, PaginationMode};
pub use memory::InMemorySubscriptionRepository;
pub use models::{
    CreateSubscriptionDto, CreatedResponse, ErrorResponse, NewSubscription, QueryWindow,
    StatsResponse, Subscription, SubscriptionPatch, SubscriptionResponse, UpdateSubscriptionDto,
};
pub use period::{Clock, FixedClock, SystemClock, YearMonth};
pub use repository::{SqliteSubscriptionRepository, SubscriptionRepository};
