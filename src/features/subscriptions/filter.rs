//! 期間の重なりによるサブスクリプションの絞り込み
//!
//! 問い合わせ期間に「有効」なサブスクリプションだけを選び出す。I/Oは行わず、
//! 渡されたスナップショットだけを見る。

use super::models::{QueryWindow, Subscription};
use super::period::YearMonth;

/// ページング（offset/limit）を適用するタイミング
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationMode {
    /// 絞り込みの前に保存順の全件へ適用する（従来の互換動作）
    ///
    /// 条件に合う項目がページの外にあると結果から漏れる。
    #[default]
    BeforeFilter,
    /// すべての絞り込みの後に適用する
    AfterFilter,
}

/// 問い合わせ期間に有効なサブスクリプションを返す
///
/// # 引数
/// * `items` - 保存順に並んだサブスクリプション
/// * `window` - 問い合わせ条件
/// * `current_month` - 「今」が属する月
/// * `mode` - ページングの適用タイミング
///
/// # 処理内容
/// 1. 開始月が今月より後なら空を返す
/// 2. offset → limit を適用（`BeforeFilter` の場合）
/// 3. 利用者・サービス名で絞り込み
/// 4. 終了月が無ければ今月の初日を終了境界とする
/// 5. 期間の重なりで絞り込み
pub fn list_active(
    items: &[Subscription],
    window: &QueryWindow,
    current_month: YearMonth,
    mode: PaginationMode,
) -> Vec<Subscription> {
    if window.start_date.is_some_and(|start| start > current_month) {
        log::debug!(
            "開始月が未来のため空を返します: start={:?}, current={}",
            window.start_date,
            current_month
        );
        return Vec::new();
    }

    let candidates: Vec<&Subscription> = match mode {
        PaginationMode::BeforeFilter => paginate(items.iter(), window).collect(),
        PaginationMode::AfterFilter => items.iter().collect(),
    };

    let end_bound = window.end_date.unwrap_or(current_month);

    let matched = candidates
        .into_iter()
        .filter(|item| matches_identity(item, window))
        .filter(|item| overlaps(item, window.start_date, end_bound));

    match mode {
        PaginationMode::BeforeFilter => matched.cloned().collect(),
        PaginationMode::AfterFilter => paginate(matched, window).cloned().collect(),
    }
}

/// offsetとlimitを順に適用する（範囲外のoffsetは空になる）
fn paginate<'a, I>(items: I, window: &QueryWindow) -> impl Iterator<Item = &'a Subscription>
where
    I: Iterator<Item = &'a Subscription>,
{
    items
        .skip(window.offset.unwrap_or(0))
        .take(window.limit.unwrap_or(usize::MAX))
}

/// 利用者IDとサービス名の一致判定
fn matches_identity(item: &Subscription, window: &QueryWindow) -> bool {
    let user_matches = window.user_id.map_or(true, |user_id| item.user_id == user_id);
    let service_matches = window
        .service_name
        .as_deref()
        .map_or(true, |name| item.service_name == name);

    user_matches && service_matches
}

/// サブスクリプションの有効期間が問い合わせ期間と重なるか
///
/// 終了境界は含まない。継続中（終了月なし）のものは開始境界の条件を常に満たす。
pub fn overlaps(item: &Subscription, start_bound: Option<YearMonth>, end_bound: YearMonth) -> bool {
    let starts_before_end = item.start_date < end_bound;

    match start_bound {
        Some(start) => starts_before_end && item.end_date.map_or(true, |end| end > start),
        None => starts_before_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use uuid::Uuid;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    const NOW: (i32, u32) = (2025, 10);

    fn now() -> YearMonth {
        ym(NOW.0, NOW.1)
    }

    fn subscription(
        name: &str,
        price: u64,
        start_date: YearMonth,
        end_date: Option<YearMonth>,
    ) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            service_name: name.to_string(),
            price,
            user_id: Uuid::new_v4(),
            start_date,
            end_date,
        }
    }

    /// 保存順: 17か月前開始、2か月前開始、1か月前〜今月、3か月前開始
    fn fixture() -> Vec<Subscription> {
        vec![
            subscription("some item", 125, now().add_months(-17), None),
            subscription("item 2", 250, now().add_months(-2), None),
            subscription("nothing", 500, now().add_months(-1), Some(now())),
            subscription("variable", 1500, now().add_months(-3), None),
        ]
    }

    fn ids(items: &[Subscription]) -> Vec<Uuid> {
        items.iter().map(|item| item.id).collect()
    }

    #[test]
    fn test_future_start_returns_empty() {
        let items = fixture();
        let window = QueryWindow {
            start_date: Some(now().add_months(12)),
            ..QueryWindow::default()
        };

        assert!(list_active(&items, &window, now(), PaginationMode::BeforeFilter).is_empty());
    }

    #[test]
    fn test_start_in_current_month_is_not_future() {
        let items = fixture();
        let window = QueryWindow {
            start_date: Some(now()),
            ..QueryWindow::default()
        };

        let result = list_active(&items, &window, now(), PaginationMode::BeforeFilter);

        // 今月終了のものは終了境界（今月初日）より前に始まるが、終了月が開始境界と同じなので除外
        assert_eq!(ids(&result), vec![items[0].id, items[1].id, items[3].id]);
    }

    #[test]
    fn test_identity_filters() {
        let items = fixture();

        let by_user = QueryWindow {
            user_id: Some(items[0].user_id),
            ..QueryWindow::default()
        };
        assert_eq!(
            ids(&list_active(&items, &by_user, now(), PaginationMode::BeforeFilter)),
            vec![items[0].id]
        );

        let by_service = QueryWindow {
            service_name: Some("item 2".to_string()),
            ..QueryWindow::default()
        };
        assert_eq!(
            ids(&list_active(&items, &by_service, now(), PaginationMode::BeforeFilter)),
            vec![items[1].id]
        );
    }

    #[test]
    fn test_pagination_before_filter() {
        let items = fixture();
        let window = QueryWindow {
            offset: Some(1),
            limit: Some(2),
            ..QueryWindow::default()
        };

        let result = list_active(&items, &window, now(), PaginationMode::BeforeFilter);
        assert_eq!(ids(&result), vec![items[1].id, items[2].id]);
    }

    #[test]
    fn test_pagination_before_filter_can_drop_matches() {
        let items = fixture();
        // offset=1で先頭が落ちるため、利用者で絞ると何も残らない
        let window = QueryWindow {
            user_id: Some(items[0].user_id),
            offset: Some(1),
            ..QueryWindow::default()
        };

        assert!(list_active(&items, &window, now(), PaginationMode::BeforeFilter).is_empty());
    }

    #[test]
    fn test_pagination_after_filter() {
        let items = fixture();
        let window = QueryWindow {
            start_date: Some(now()),
            offset: Some(1),
            limit: Some(1),
            ..QueryWindow::default()
        };

        // 絞り込み後の [0, 1, 3] から2件目だけ
        let result = list_active(&items, &window, now(), PaginationMode::AfterFilter);
        assert_eq!(ids(&result), vec![items[1].id]);
    }

    #[test]
    fn test_offset_out_of_range_is_empty() {
        let items = fixture();
        let window = QueryWindow {
            offset: Some(100),
            ..QueryWindow::default()
        };

        assert!(list_active(&items, &window, now(), PaginationMode::BeforeFilter).is_empty());
        assert!(list_active(&items, &window, now(), PaginationMode::AfterFilter).is_empty());
    }

    #[test]
    fn test_default_end_excludes_current_month_starts() {
        let items = vec![
            subscription("old", 100, now().add_months(-1), None),
            subscription("new", 100, now(), None),
        ];

        let result = list_active(
            &items,
            &QueryWindow::default(),
            now(),
            PaginationMode::BeforeFilter,
        );
        assert_eq!(ids(&result), vec![items[0].id]);
    }

    #[test]
    fn test_explicit_end_bound_is_exclusive() {
        let items = vec![
            subscription("before", 100, ym(2024, 2), None),
            subscription("at", 100, ym(2024, 3), None),
        ];
        let window = QueryWindow {
            start_date: Some(ym(2024, 1)),
            end_date: Some(ym(2024, 3)),
            ..QueryWindow::default()
        };

        let result = list_active(&items, &window, now(), PaginationMode::BeforeFilter);
        assert_eq!(ids(&result), vec![items[0].id]);
    }

    #[test]
    fn test_ended_before_window_is_excluded() {
        let items = vec![
            subscription("ended", 100, ym(2023, 1), Some(ym(2023, 6))),
            subscription("ended at start", 100, ym(2023, 1), Some(ym(2024, 1))),
            subscription("ended after start", 100, ym(2023, 1), Some(ym(2024, 2))),
        ];
        let window = QueryWindow {
            start_date: Some(ym(2024, 1)),
            end_date: Some(ym(2024, 6)),
            ..QueryWindow::default()
        };

        let result = list_active(&items, &window, now(), PaginationMode::BeforeFilter);
        assert_eq!(ids(&result), vec![items[2].id]);
    }

    #[test]
    fn test_overlaps_without_start_bound() {
        let item = subscription("x", 1, ym(2020, 1), Some(ym(2020, 2)));
        assert!(overlaps(&item, None, ym(2020, 2)));
        assert!(!overlaps(&item, None, ym(2020, 1)));
    }

    fn arbitrary_items(seeds: &[(u8, u8, bool)]) -> Vec<Subscription> {
        seeds
            .iter()
            .map(|&(start, length, open)| {
                let start_date = now().add_months(-i64::from(start % 48));
                let end_date = (!open).then(|| start_date.add_months(i64::from(length % 24)));
                subscription("generated", 100, start_date, end_date)
            })
            .collect()
    }

    #[quickcheck]
    fn prop_future_start_always_empty(seeds: Vec<(u8, u8, bool)>, ahead: u8) -> bool {
        let items = arbitrary_items(&seeds);
        let window = QueryWindow {
            start_date: Some(now().add_months(i64::from(ahead) + 1)),
            ..QueryWindow::default()
        };

        list_active(&items, &window, now(), PaginationMode::BeforeFilter).is_empty()
    }

    #[quickcheck]
    fn prop_open_ended_passes_start_check(start: u8, window_start: u8) -> bool {
        let item = subscription("open", 1, now().add_months(-i64::from(start)), None);
        let start_bound = now().add_months(-i64::from(window_start));

        // 終了境界を十分先に置けば、継続中のものは必ず残る
        overlaps(&item, Some(start_bound), now().add_months(1))
    }

    #[quickcheck]
    fn prop_list_active_is_idempotent(seeds: Vec<(u8, u8, bool)>, offset: Option<u8>) -> bool {
        let items = arbitrary_items(&seeds);
        let snapshot = items.clone();
        let window = QueryWindow {
            start_date: Some(now().add_months(-6)),
            offset: offset.map(usize::from),
            ..QueryWindow::default()
        };

        let first = list_active(&items, &window, now(), PaginationMode::BeforeFilter);
        let second = list_active(&items, &window, now(), PaginationMode::BeforeFilter);

        first == second && items == snapshot
    }

    #[quickcheck]
    fn prop_results_are_subset_in_storage_order(seeds: Vec<(u8, u8, bool)>) -> bool {
        let items = arbitrary_items(&seeds);
        let result = list_active(
            &items,
            &QueryWindow::default(),
            now(),
            PaginationMode::AfterFilter,
        );

        let positions: Vec<usize> = result
            .iter()
            .filter_map(|found| items.iter().position(|item| item.id == found.id))
            .collect();

        positions.len() == result.len() && positions.windows(2).all(|pair| pair[0] < pair[1])
    }
}
