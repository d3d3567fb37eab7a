//! 按分集計
//!
//! サブスクリプションの有効期間と問い合わせ期間が重なる月数を数え、
//! `料金 × 月数` を合計する。

use super::models::{QueryWindow, Subscription};
use super::period::{months_inclusive, YearMonth};

/// 1件分の按分結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proration {
    /// 実際に数え始めた月
    pub effective_start: YearMonth,
    /// 実際に数え終えた月
    pub effective_end: YearMonth,
    /// 課金対象の月数
    pub months: u64,
    /// `料金 × 月数`
    pub amount: u64,
}

/// 1件のサブスクリプションを按分する
///
/// # 引数
/// * `subscription` - 対象のサブスクリプション
/// * `window` - 問い合わせ条件（日付のみ使用）
/// * `current_month` - 「今」が属する月
///
/// # 処理内容
/// 1. 開始 = max(問い合わせ開始, 契約開始)
/// 2. 終了 = 契約終了（なければ今月）と問い合わせ終了の早い方
/// 3. 開始が終了より後なら、開始を終了の翌月にする
/// 4. 両端を含む月数を数える
pub fn prorate(
    subscription: &Subscription,
    window: &QueryWindow,
    current_month: YearMonth,
) -> Proration {
    let effective_start = match window.start_date {
        Some(start) => start.max(subscription.start_date),
        None => subscription.start_date,
    };

    let contract_end = subscription.end_date.unwrap_or(current_month);
    let effective_end = match window.end_date {
        Some(end) => end.min(contract_end),
        None => contract_end,
    };

    let effective_start = if effective_start > effective_end {
        effective_end.add_months(1)
    } else {
        effective_start
    };

    // 上の補正により開始は終了の翌月以前なので負にはならない
    let months = months_inclusive(effective_start, effective_end).max(0) as u64;
    let amount = subscription.price.saturating_mul(months);

    Proration {
        effective_start,
        effective_end,
        months,
        amount,
    }
}

/// サブスクリプション群の費用合計を返す（空なら0）
pub fn total_cost(
    subscriptions: &[Subscription],
    window: &QueryWindow,
    current_month: YearMonth,
) -> u64 {
    subscriptions.iter().fold(0u64, |total, subscription| {
        let proration = prorate(subscription, window, current_month);

        log::debug!(
            "按分: id={}, start={}, end={}, months={}, amount={}",
            subscription.id,
            proration.effective_start,
            proration.effective_end,
            proration.months,
            proration.amount
        );

        total.saturating_add(proration.amount)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::filter::{list_active, PaginationMode};
    use quickcheck_macros::quickcheck;
    use uuid::Uuid;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    fn now() -> YearMonth {
        ym(2025, 10)
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

    fn fixture() -> Vec<Subscription> {
        vec![
            subscription("some item", 125, now().add_months(-17), None),
            subscription("item 2", 250, now().add_months(-2), None),
            subscription("nothing", 500, now().add_months(-1), Some(now())),
            subscription("variable", 1500, now().add_months(-3), None),
        ]
    }

    /// 集計の流れ: 利用者・サービス名だけで絞り込んでから按分する
    fn stats(items: &[Subscription], window: &QueryWindow) -> u64 {
        let candidates = list_active(
            items,
            &window.identity_only(),
            now(),
            PaginationMode::BeforeFilter,
        );
        total_cost(&candidates, window, now())
    }

    #[test]
    fn test_empty_set_is_zero() {
        assert_eq!(total_cost(&[], &QueryWindow::default(), now()), 0);
    }

    #[test]
    fn test_fixed_start_open_ended_counts_one_month() {
        let item = subscription("music", 125, ym(2023, 6), None);
        let window = QueryWindow {
            start_date: Some(now()),
            ..QueryWindow::default()
        };

        assert_eq!(total_cost(&[item], &window, now()), 125);
    }

    #[test]
    fn test_long_running_subscription_counts_one_month_from_now() {
        let item = subscription("video", 250, now().add_months(-14), None);
        let window = QueryWindow {
            start_date: Some(now()),
            ..QueryWindow::default()
        };

        assert_eq!(total_cost(&[item], &window, now()), 250);
    }

    #[test]
    fn test_stats_by_service_name() {
        let items = fixture();
        let window = QueryWindow {
            start_date: Some(now()),
            service_name: Some("nothing".to_string()),
            ..QueryWindow::default()
        };

        assert_eq!(stats(&items, &window), 500);
    }

    #[test]
    fn test_stats_by_user_id() {
        let items = fixture();
        let window = QueryWindow {
            start_date: Some(now()),
            user_id: Some(items[0].user_id),
            ..QueryWindow::default()
        };

        assert_eq!(stats(&items, &window), 125);
    }

    #[test]
    fn test_stats_reference_totals() {
        let items: Vec<Subscription> = fixture().into_iter().take(3).collect();

        // 今月から: 各1か月
        let from_now = QueryWindow {
            start_date: Some(now()),
            ..QueryWindow::default()
        };
        assert_eq!(stats(&items, &from_now), 125 + 250 + 500);

        // 先月から: 2か月
        let from_last_month = QueryWindow {
            start_date: Some(now().add_months(-1)),
            user_id: Some(items[0].user_id),
            ..QueryWindow::default()
        };
        assert_eq!(stats(&items, &from_last_month), 250);

        // 先月まで: 契約開始から17か月
        let until_last_month = QueryWindow {
            end_date: Some(now().add_months(-1)),
            user_id: Some(items[0].user_id),
            ..QueryWindow::default()
        };
        assert_eq!(stats(&items, &until_last_month), 2125);
    }

    #[test]
    fn test_stats_ignore_pagination() {
        let items = fixture();
        let window = QueryWindow {
            start_date: Some(now()),
            offset: Some(3),
            limit: Some(1),
            ..QueryWindow::default()
        };

        assert_eq!(stats(&items, &window), 125 + 250 + 500 + 1500);
    }

    #[test]
    fn test_degenerate_overlap_clamp() {
        // 問い合わせ開始より前に終わった契約
        let item = subscription("ended", 700, ym(2024, 1), Some(ym(2024, 3)));
        let window = QueryWindow {
            start_date: Some(ym(2024, 6)),
            ..QueryWindow::default()
        };

        let proration = prorate(&item, &window, now());

        assert_eq!(proration.effective_end, ym(2024, 3));
        assert_eq!(proration.effective_start, ym(2024, 4));
        assert_eq!(proration.months, 0);
        assert_eq!(proration.amount, 0);
    }

    #[test]
    fn test_clamp_across_year_boundary() {
        let item = subscription("ended", 10, ym(2023, 5), Some(ym(2023, 12)));
        let window = QueryWindow {
            start_date: Some(ym(2024, 2)),
            ..QueryWindow::default()
        };

        let proration = prorate(&item, &window, now());
        assert_eq!(proration.effective_start, ym(2024, 1));
        assert_eq!(proration.months, 0);
    }

    #[test]
    fn test_window_end_caps_open_ended() {
        let item = subscription("cloud", 300, ym(2024, 11), None);
        let window = QueryWindow {
            start_date: Some(ym(2024, 10)),
            end_date: Some(ym(2025, 2)),
            ..QueryWindow::default()
        };

        // 2024-11 〜 2025-02 の4か月
        let proration = prorate(&item, &window, now());
        assert_eq!(proration.months, 4);
        assert_eq!(proration.amount, 1200);
    }

    #[test]
    fn test_contract_end_before_window_end() {
        let item = subscription("gym", 50, ym(2024, 1), Some(ym(2024, 4)));
        let window = QueryWindow {
            end_date: Some(ym(2024, 12)),
            ..QueryWindow::default()
        };

        assert_eq!(prorate(&item, &window, now()).months, 4);
    }

    #[quickcheck]
    fn prop_months_are_bounded_by_contract(start_back: u8, length: u8, window_back: u8) -> bool {
        let start_date = now().add_months(-i64::from(start_back % 60));
        let end_date = start_date.add_months(i64::from(length % 36));
        let item = subscription("generated", 1, start_date, Some(end_date));
        let window = QueryWindow {
            start_date: Some(now().add_months(-i64::from(window_back % 60))),
            ..QueryWindow::default()
        };

        let proration = prorate(&item, &window, now());
        let contract_months = months_inclusive(start_date, end_date) as u64;

        proration.months <= contract_months && proration.amount == proration.months
    }

    #[quickcheck]
    fn prop_total_is_sum_of_prorations(prices: Vec<u16>) -> bool {
        let items: Vec<Subscription> = prices
            .iter()
            .enumerate()
            .map(|(i, &price)| {
                subscription(
                    "generated",
                    u64::from(price),
                    now().add_months(-(i as i64 % 30)),
                    None,
                )
            })
            .collect();
        let window = QueryWindow::default();

        let expected: u64 = items
            .iter()
            .map(|item| prorate(item, &window, now()).amount)
            .sum();

        total_cost(&items, &window, now()) == expected
    }
}
