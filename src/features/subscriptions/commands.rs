use super::aggregator::total_cost;
use super::filter::list_active;
use super::models::{
    CreateSubscriptionDto, CreatedResponse, NewSubscription, QueryWindow, StatsResponse,
    SubscriptionPatch, SubscriptionResponse, UpdateSubscriptionDto,
};
use super::period::YearMonth;
use crate::shared::errors::{AppError, AppResult};
use crate::AppState;
use uuid::Uuid;

/// サブスクリプションを作成する
///
/// # 戻り値
/// 割り当てられたID、または失敗時はエラー
pub fn create_subscription(
    state: &AppState,
    dto: CreateSubscriptionDto,
) -> AppResult<CreatedResponse> {
    let subscription = validate_create_subscription_dto(dto)?;

    let mut repository = state.lock_repository()?;
    let subscription_id = repository.create(subscription)?;

    log::info!("サブスクリプションを作成しました: id={subscription_id}");

    Ok(CreatedResponse { subscription_id })
}

/// サブスクリプションを1件取得する
pub fn get_subscription(state: &AppState, id: Uuid) -> AppResult<SubscriptionResponse> {
    let repository = state.lock_repository()?;
    let subscription = repository.find_by_id(id)?;

    Ok(SubscriptionResponse::from(&subscription))
}

/// 問い合わせ期間に有効なサブスクリプション一覧を取得する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `query` - URLのクエリ文字列
pub fn get_subscriptions(state: &AppState, query: &str) -> AppResult<Vec<SubscriptionResponse>> {
    let window = parse_list_query(query)?;

    // スナップショットを取ったらすぐにロックを手放す
    let snapshot = state.lock_repository()?.find_all()?;

    let items = list_active(
        &snapshot,
        &window,
        state.clock.current_month(),
        state.pagination_mode,
    );

    log::info!(
        "サブスクリプション一覧を取得しました: {}件中{}件",
        snapshot.len(),
        items.len()
    );

    Ok(items.iter().map(SubscriptionResponse::from).collect())
}

/// サブスクリプションを部分更新する
///
/// 存在しない場合は `AppError::NotFound`。
pub fn update_subscription(
    state: &AppState,
    id: Uuid,
    dto: UpdateSubscriptionDto,
) -> AppResult<()> {
    let patch = validate_update_subscription_dto(dto)?;

    let mut repository = state.lock_repository()?;
    let updated = repository.update(id, &patch)?;

    if updated == 0 {
        return Err(AppError::not_found("subscription"));
    }

    log::info!("サブスクリプションを更新しました: id={id}");

    Ok(())
}

/// サブスクリプションを削除する
///
/// 存在しない場合は `AppError::NotFound`。
pub fn delete_subscription(state: &AppState, id: Uuid) -> AppResult<()> {
    let mut repository = state.lock_repository()?;
    let deleted = repository.delete(id)?;

    if deleted == 0 {
        return Err(AppError::not_found("subscription"));
    }

    log::info!("サブスクリプションを削除しました: id={id}");

    Ok(())
}

/// 問い合わせ期間の費用合計を取得する
///
/// 候補は利用者・サービス名だけで絞り込み、日付とページングは按分にだけ使う。
pub fn get_subscription_stats(state: &AppState, query: &str) -> AppResult<StatsResponse> {
    let window = parse_stats_query(query)?;

    let snapshot = state.lock_repository()?.find_all()?;
    let current_month = state.clock.current_month();

    let candidates = list_active(
        &snapshot,
        &window.identity_only(),
        current_month,
        state.pagination_mode,
    );
    let total_price = total_cost(&candidates, &window, current_month);

    log::info!(
        "費用合計を計算しました: start={:?}, end={:?}, 対象{}件, total={}",
        window.start_date.map(|d| d.to_wire()),
        window.end_date.map(|d| d.to_wire()),
        candidates.len(),
        total_price
    );

    Ok(StatsResponse { total_price })
}

/// パスに含まれるIDを解析する
pub fn parse_subscription_id(value: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| AppError::validation(format!("invalid subscription_id '{value}'")))
}

/// サブスクリプション作成DTOのバリデーション
///
/// # 戻り値
/// 保存可能なサブスクリプション、または失敗時はバリデーションエラー
fn validate_create_subscription_dto(dto: CreateSubscriptionDto) -> AppResult<NewSubscription> {
    let service_name = dto
        .service_name
        .ok_or_else(|| AppError::validation("service_name is required"))?;
    validate_service_name(&service_name)?;

    let price = dto
        .price
        .ok_or_else(|| AppError::validation("price is required"))?;
    let price = validate_price(price)?;

    let user_id = dto
        .user_id
        .ok_or_else(|| AppError::validation("user_id is required"))?;

    let start_date = dto
        .start_date
        .ok_or_else(|| AppError::validation("start_date is required"))?;
    let start_date = YearMonth::parse_wire(&start_date, "start_date")?;

    let end_date = dto
        .end_date
        .map(|value| YearMonth::parse_wire(&value, "end_date"))
        .transpose()?;

    Ok(NewSubscription {
        service_name,
        price,
        user_id,
        start_date,
        end_date,
    })
}

/// サブスクリプション更新DTOのバリデーション
fn validate_update_subscription_dto(dto: UpdateSubscriptionDto) -> AppResult<SubscriptionPatch> {
    if let Some(ref service_name) = dto.service_name {
        validate_service_name(service_name)?;
    }

    let price = dto.price.map(validate_price).transpose()?;

    let start_date = dto
        .start_date
        .map(|value| YearMonth::parse_wire(&value, "start_date"))
        .transpose()?;
    let end_date = dto
        .end_date
        .map(|value| YearMonth::parse_wire(&value, "end_date"))
        .transpose()?;

    Ok(SubscriptionPatch {
        service_name: dto.service_name,
        price,
        user_id: dto.user_id,
        start_date,
        end_date,
    })
}

fn validate_service_name(service_name: &str) -> AppResult<()> {
    if service_name.trim().is_empty() {
        return Err(AppError::validation("service_name must not be empty"));
    }

    Ok(())
}

fn validate_price(price: i64) -> AppResult<u64> {
    if price < 1 {
        return Err(AppError::validation("price must be at least 1"));
    }

    u64::try_from(price).map_err(|_| AppError::validation("price is out of range"))
}

/// 一覧取得のクエリ文字列を解析する
fn parse_list_query(query: &str) -> AppResult<QueryWindow> {
    let mut window = QueryWindow::default();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "offset" => {
                let offset = parse_integer(&value, "offset")?;
                if offset < 0 {
                    return Err(AppError::validation("offset must be at least 0"));
                }
                window.offset = Some(offset as usize);
            }
            "limit" => {
                let limit = parse_integer(&value, "limit")?;
                if limit < 1 {
                    return Err(AppError::validation("limit must be at least 1"));
                }
                window.limit = Some(limit as usize);
            }
            other => apply_common_param(&mut window, other, &value)?,
        }
    }

    Ok(window)
}

/// 集計のクエリ文字列を解析する（ページングは受け付けない）
fn parse_stats_query(query: &str) -> AppResult<QueryWindow> {
    let mut window = QueryWindow::default();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        apply_common_param(&mut window, key.as_ref(), &value)?;
    }

    Ok(window)
}

/// 一覧と集計で共通のパラメータを設定する（未知のキーは無視）
fn apply_common_param(window: &mut QueryWindow, key: &str, value: &str) -> AppResult<()> {
    match key {
        "service_name" => window.service_name = Some(value.to_string()),
        "user_id" => {
            let user_id = Uuid::parse_str(value)
                .map_err(|_| AppError::validation(format!("invalid user_id '{value}'")))?;
            window.user_id = Some(user_id);
        }
        "start_date" => window.start_date = Some(YearMonth::parse_wire(value, "start_date")?),
        "end_date" => window.end_date = Some(YearMonth::parse_wire(value, "end_date")?),
        _ => log::debug!("未対応のクエリパラメータを無視します: {key}"),
    }

    Ok(())
}

fn parse_integer(value: &str, field: &str) -> AppResult<i64> {
    value
        .parse::<i64>()
        .map_err(|_| AppError::validation(format!("{field} must be an integer")))
}
