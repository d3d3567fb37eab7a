use super::models::{NewSubscription, Subscription, SubscriptionPatch};
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// サブスクリプションの保存先
///
/// 絞り込みと集計は `find_all` のスナップショットに対して行うため、
/// 実装は保存順（挿入順）を保って返すこと。
pub trait SubscriptionRepository: Send {
    /// 保存順に全件を取得する
    fn find_all(&self) -> AppResult<Vec<Subscription>>;

    /// IDで取得する（存在しなければ `AppError::NotFound`）
    fn find_by_id(&self, id: Uuid) -> AppResult<Subscription>;

    /// 新しいIDを割り当てて保存し、そのIDを返す
    fn create(&mut self, subscription: NewSubscription) -> AppResult<Uuid>;

    /// 指定されたフィールドだけを更新し、更新件数（0または1）を返す
    fn update(&mut self, id: Uuid, patch: &SubscriptionPatch) -> AppResult<usize>;

    /// 削除し、削除件数（0または1）を返す
    fn delete(&mut self, id: Uuid) -> AppResult<usize>;
}

/// SQLiteに保存するリポジトリ
pub struct SqliteSubscriptionRepository {
    conn: Connection,
}

impl SqliteSubscriptionRepository {
    /// テーブル作成済みの接続から作成する
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, service_name, price, user_id, start_date, end_date FROM subscriptions";

/// 行をサブスクリプションに変換する
fn map_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let id: String = row.get(0)?;
    let price: i64 = row.get(2)?;
    let user_id: String = row.get(3)?;

    Ok(Subscription {
        id: parse_uuid(&id, 0)?,
        service_name: row.get(1)?,
        price: u64::try_from(price).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Integer, Box::new(e))
        })?,
        user_id: parse_uuid(&user_id, 3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
    })
}

fn parse_uuid(value: &str, column: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn to_db_price(price: u64) -> AppResult<i64> {
    i64::try_from(price).map_err(|_| AppError::validation("price is too large"))
}

impl SubscriptionRepository for SqliteSubscriptionRepository {
    fn find_all(&self) -> AppResult<Vec<Subscription>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))?;
        let subscriptions = stmt.query_map([], map_row)?;

        subscriptions
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)
    }

    fn find_by_id(&self, id: Uuid) -> AppResult<Subscription> {
        self.conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
                map_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => AppError::not_found("subscription"),
                _ => AppError::from(e),
            })
    }

    fn create(&mut self, subscription: NewSubscription) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO subscriptions (id, service_name, price, user_id, start_date, end_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                subscription.service_name,
                to_db_price(subscription.price)?,
                subscription.user_id.to_string(),
                subscription.start_date,
                subscription.end_date,
                now
            ],
        )?;

        Ok(id)
    }

    fn update(&mut self, id: Uuid, patch: &SubscriptionPatch) -> AppResult<usize> {
        // 変更のないパッチでも存在確認の意味で件数を返す
        if patch.is_empty() {
            let exists: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM subscriptions WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            return Ok(exists as usize);
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref service_name) = patch.service_name {
            assignments.push("service_name = ?");
            values.push(Box::new(service_name.clone()));
        }
        if let Some(price) = patch.price {
            assignments.push("price = ?");
            values.push(Box::new(to_db_price(price)?));
        }
        if let Some(user_id) = patch.user_id {
            assignments.push("user_id = ?");
            values.push(Box::new(user_id.to_string()));
        }
        if let Some(start_date) = patch.start_date {
            assignments.push("start_date = ?");
            values.push(Box::new(start_date));
        }
        if let Some(end_date) = patch.end_date {
            assignments.push("end_date = ?");
            values.push(Box::new(end_date));
        }
        values.push(Box::new(id.to_string()));

        let query = format!(
            "UPDATE subscriptions SET {} WHERE id = ?",
            assignments.join(", ")
        );
        log::debug!("UPDATE文: {query}");

        let value_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows_affected = self.conn.execute(&query, value_refs.as_slice())?;

        Ok(rows_affected)
    }

    fn delete(&mut self, id: Uuid) -> AppResult<usize> {
        let rows_affected = self.conn.execute(
            "DELETE FROM subscriptions WHERE id = ?1",
            params![id.to_string()],
        )?;

        Ok(rows_affected)
    }
}
