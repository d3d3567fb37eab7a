use super::period::YearMonth;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// サブスクリプションデータモデル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: Uuid,
    pub service_name: String,
    /// 月額料金
    pub price: u64,
    pub user_id: Uuid,
    /// 課金開始月
    pub start_date: YearMonth,
    /// 最終課金月（この月を含む）。Noneは継続中
    pub end_date: Option<YearMonth>,
}

/// 作成前のサブスクリプション（IDはリポジトリが割り当てる）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub service_name: String,
    pub price: u64,
    pub user_id: Uuid,
    pub start_date: YearMonth,
    pub end_date: Option<YearMonth>,
}

impl NewSubscription {
    /// IDを付与してサブスクリプションにする
    pub fn into_subscription(self, id: Uuid) -> Subscription {
        Subscription {
            id,
            service_name: self.service_name,
            price: self.price,
            user_id: self.user_id,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// 部分更新の内容（Noneのフィールドは変更しない）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPatch {
    pub service_name: Option<String>,
    pub price: Option<u64>,
    pub user_id: Option<Uuid>,
    pub start_date: Option<YearMonth>,
    pub end_date: Option<YearMonth>,
}

impl SubscriptionPatch {
    /// 変更するフィールドが1つもないか
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.price.is_none()
            && self.user_id.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    /// 既存のサブスクリプションに差分を適用する
    pub fn apply_to(&self, subscription: &mut Subscription) {
        if let Some(ref service_name) = self.service_name {
            subscription.service_name = service_name.clone();
        }
        if let Some(price) = self.price {
            subscription.price = price;
        }
        if let Some(user_id) = self.user_id {
            subscription.user_id = user_id;
        }
        if let Some(start_date) = self.start_date {
            subscription.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            subscription.end_date = Some(end_date);
        }
    }
}

/// 一覧・集計の問い合わせ条件
///
/// リクエストごとに作られ、状態を持たない。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryWindow {
    pub start_date: Option<YearMonth>,
    pub end_date: Option<YearMonth>,
    pub user_id: Option<Uuid>,
    pub service_name: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl QueryWindow {
    /// 利用者・サービス名の絞り込みだけを残した条件（集計用）
    pub fn identity_only(&self) -> Self {
        Self {
            user_id: self.user_id,
            service_name: self.service_name.clone(),
            ..Self::default()
        }
    }
}

/// サブスクリプション作成用DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionDto {
    pub service_name: Option<String>,
    pub price: Option<i64>,
    pub user_id: Option<Uuid>,
    /// `MM-YYYY`
    pub start_date: Option<String>,
    /// `MM-YYYY`
    pub end_date: Option<String>,
}

/// サブスクリプション更新用DTO
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubscriptionDto {
    pub service_name: Option<String>,
    pub price: Option<i64>,
    pub user_id: Option<Uuid>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// APIで返すサブスクリプション表現
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub subscription_id: Uuid,
    pub service_name: String,
    pub price: u64,
    pub user_id: Uuid,
    pub start_date: String,
    pub end_date: Option<String>,
}

impl From<&Subscription> for SubscriptionResponse {
    fn from(subscription: &Subscription) -> Self {
        Self {
            subscription_id: subscription.id,
            service_name: subscription.service_name.clone(),
            price: subscription.price,
            user_id: subscription.user_id,
            start_date: subscription.start_date.to_wire(),
            end_date: subscription.end_date.map(|date| date.to_wire()),
        }
    }
}

/// 作成結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub subscription_id: Uuid,
}

/// 集計結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_price: u64,
}

/// エラーレスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}
