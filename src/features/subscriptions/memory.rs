use super::models::{NewSubscription, Subscription, SubscriptionPatch};
use super::repository::SubscriptionRepository;
use crate::shared::errors::{AppError, AppResult};
use uuid::Uuid;

/// プロセス内のVecに保存するリポジトリ
///
/// テストやデータベースを使わない起動で使う。保存順は挿入順。
#[derive(Debug, Default, Clone)]
pub struct InMemorySubscriptionRepository {
    items: Vec<Subscription>,
}

impl InMemorySubscriptionRepository {
    pub fn new(items: Vec<Subscription>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Subscription] {
        &self.items
    }
}

impl SubscriptionRepository for InMemorySubscriptionRepository {
    fn find_all(&self) -> AppResult<Vec<Subscription>> {
        Ok(self.items.clone())
    }

    fn find_by_id(&self, id: Uuid) -> AppResult<Subscription> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| AppError::not_found("subscription"))
    }

    fn create(&mut self, subscription: NewSubscription) -> AppResult<Uuid> {
        let mut id = Uuid::new_v4();
        while self.items.iter().any(|item| item.id == id) {
            id = Uuid::new_v4();
        }

        self.items.push(subscription.into_subscription(id));
        Ok(id)
    }

    fn update(&mut self, id: Uuid, patch: &SubscriptionPatch) -> AppResult<usize> {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                patch.apply_to(item);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete(&mut self, id: Uuid) -> AppResult<usize> {
        match self.items.iter().position(|item| item.id == id) {
            Some(index) => {
                self.items.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
