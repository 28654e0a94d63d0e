//! 日期范围与默认下载窗口

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 闭区间日期范围，保证 start <= end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = AppError;

    fn try_from(raw: RawDateRange) -> AppResult<Self> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if start > end {
            return Err(AppError::InvalidDateRange(format!(
                "开始日期 {} 晚于结束日期 {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// 单日范围
    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// 默认下载窗口：周一取上周五~周日，其余取昨天
    pub fn default_window(today: NaiveDate) -> Self {
        let yesterday = today - Duration::days(1);
        if today.weekday() == Weekday::Mon {
            Self {
                start: today - Duration::days(3),
                end: yesterday,
            }
        } else {
            Self::single(yesterday)
        }
    }

    /// 以本地日期计算默认窗口
    pub fn yesterday_or_weekend() -> Self {
        Self::default_window(Local::now().date_naive())
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// 覆盖的天数
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    /// 文件名使用的紧凑格式 (YYYYMMDD, YYYYMMDD)
    pub fn compact(&self) -> (String, String) {
        (
            self.start.format("%Y%m%d").to_string(),
            self.end.format("%Y%m%d").to_string(),
        )
    }

    /// 从紧凑格式解析
    pub fn from_compact(start: &str, end: &str) -> AppResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y%m%d")
                .map_err(|e| AppError::InvalidDateRange(format!("{}: {}", s, e)))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

/// 解析 `YYYY-MM-DD,YYYY-MM-DD` 或单个 `YYYY-MM-DD`
impl FromStr for DateRange {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|e| AppError::InvalidDateRange(format!("'{}': {}", s.trim(), e)))
        };
        match s.split_once(',') {
            Some((start, end)) => Self::new(parse(start)?, parse(end)?),
            None => Ok(Self::single(parse(s)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn monday_covers_previous_three_days() {
        // 2025-03-10 是周一
        let monday = date(2025, 3, 10);
        let range = DateRange::default_window(monday);
        assert_eq!(range.start(), date(2025, 3, 7));
        assert_eq!(range.end(), date(2025, 3, 9));
        assert_eq!(range.days(), 3);
    }

    #[test]
    fn other_weekdays_cover_yesterday_only() {
        let mut day = date(2025, 3, 11);
        for _ in 0..6 {
            let range = DateRange::default_window(day);
            assert!(range.is_single_day(), "{} 应为单日", day);
            assert_eq!(range.start(), day - Duration::days(1));
            day += Duration::days(1);
        }
    }

    #[test]
    fn monday_window_crosses_month_boundary() {
        let monday = date(2025, 9, 1);
        let range = DateRange::default_window(monday);
        assert_eq!(range.start(), date(2025, 8, 29));
        assert_eq!(range.end(), date(2025, 8, 31));
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(DateRange::new(date(2025, 3, 2), date(2025, 3, 1)).is_err());
        assert!("2025-03-02,2025-03-01".parse::<DateRange>().is_err());
    }

    #[test]
    fn parses_user_input() {
        let range: DateRange = " 2025-03-01 , 2025-03-03 ".parse().unwrap();
        assert_eq!(range.days(), 3);
        let single: DateRange = "2025-03-01".parse().unwrap();
        assert!(single.is_single_day());
    }

    #[test]
    fn deserialization_enforces_order() {
        let bad = r#"{"start":"2025-03-05","end":"2025-03-01"}"#;
        assert!(serde_json::from_str::<DateRange>(bad).is_err());
        let good = r#"{"start":"2025-03-01","end":"2025-03-05"}"#;
        assert_eq!(serde_json::from_str::<DateRange>(good).unwrap().days(), 5);
    }
}
