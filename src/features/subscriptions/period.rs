use crate::shared::errors::{AppError, AppResult};
use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::fmt;
use std::str::FromStr;

/// `MM-YYYY` 形式（APIの日付表現）
static WIRE_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(0[1-9]|1[0-2])-(\d{4})$").expect("正規表現が不正です"));

/// `YYYY-MM` 形式（データベースの日付表現）
static STORAGE_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(0[1-9]|1[0-2])$").expect("正規表現が不正です"));

/// 年と月だけを持つ暦月
///
/// 日は意味を持たないため保持しない。フィールド順（年→月）がそのまま時系列順になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// 年と月から作成する（月が1〜12でなければNone）
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// 日付が属する月を返す
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// `months` か月後（負数なら前）の月を返す
    pub fn add_months(&self, months: i64) -> Self {
        let index = self.index() + months;
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// 通算の月番号（年×12＋月−1）
    fn index(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    /// `MM-YYYY` 形式の文字列を解析する
    ///
    /// # 引数
    /// * `value` - 日付文字列
    /// * `field` - エラーメッセージに含めるフィールド名
    pub fn parse_wire(value: &str, field: &str) -> AppResult<Self> {
        let captures = WIRE_FORMAT.captures(value).ok_or_else(|| {
            AppError::validation(format!("incorrect {field} format, expected MM-YYYY"))
        })?;

        let month = captures[1].parse::<u32>();
        let year = captures[2].parse::<i32>();

        match (year, month) {
            (Ok(year), Ok(month)) => Self::new(year, month).ok_or_else(|| {
                AppError::validation(format!("incorrect {field} format, expected MM-YYYY"))
            }),
            _ => Err(AppError::validation(format!(
                "incorrect {field} format, expected MM-YYYY"
            ))),
        }
    }

    /// `MM-YYYY` 形式で文字列化する
    pub fn to_wire(&self) -> String {
        format!("{:02}-{:04}", self.month, self.year)
    }
}

/// 期間の月数を数える（開始月と終了月を両方含む）
///
/// `(終了月 − 開始月 + 1) + 12 × (終了年 − 開始年)`。開始が終了のちょうど1か月後なら0になる。
pub fn months_inclusive(start: YearMonth, end: YearMonth) -> i64 {
    (i64::from(end.month) - i64::from(start.month) + 1)
        + 12 * (i64::from(end.year) - i64::from(start.year))
}

/// データベース保存用の `YYYY-MM` 形式
impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = STORAGE_FORMAT
            .captures(s)
            .ok_or_else(|| AppError::Database(format!("不正な月の値です: {s}")))?;

        let year = captures[1]
            .parse::<i32>()
            .map_err(|e| AppError::Database(format!("不正な年です: {s}: {e}")))?;
        let month = captures[2]
            .parse::<u32>()
            .map_err(|e| AppError::Database(format!("不正な月です: {s}: {e}")))?;

        Self::new(year, month).ok_or_else(|| AppError::Database(format!("不正な月の値です: {s}")))
    }
}

impl ToSql for YearMonth {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for YearMonth {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse::<YearMonth>()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// 現在時刻の取得元
///
/// 集計と絞り込みは「今」に依存するため、テストでは固定値を差し込む。
pub trait Clock: Send + Sync {
    /// 今日の日付
    fn today(&self) -> NaiveDate;

    /// 今日が属する月
    fn current_month(&self) -> YearMonth {
        YearMonth::from_date(self.today())
    }
}

/// システム時刻を指定タイムゾーンで読む時計
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}

/// 常に同じ日付を返す時計
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
