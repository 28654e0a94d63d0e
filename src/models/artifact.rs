//! 下载产物与规范文件名
//!
//! 文件名格式：`{platform}_{account}_{startYYYYMMDD}_{endYYYYMMDD}.xlsx`

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::DateRange;

/// 数据平台标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// 推广通 - 美团频道
    CpcMeituan,
    /// 推广通 - 点评频道
    CpcDianping,
    /// 经营数据报表
    Operation,
}

impl Platform {
    pub fn tag(self) -> &'static str {
        match self {
            Platform::CpcMeituan => "cpc-meituan",
            Platform::CpcDianping => "cpc-dianping",
            Platform::Operation => "operation",
        }
    }

    /// 下载目录下的子目录
    pub fn subdir(self) -> &'static str {
        match self {
            Platform::CpcMeituan | Platform::CpcDianping => "cpc_hourly_data",
            Platform::Operation => "operation_data",
        }
    }

    pub fn all() -> [Platform; 3] {
        [Platform::CpcMeituan, Platform::CpcDianping, Platform::Operation]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        Platform::all()
            .into_iter()
            .find(|p| p.tag() == s)
            .ok_or_else(|| AppError::Other(format!("未知平台标签: {}", s)))
    }
}

/// 规范文件名
pub fn canonical_filename(platform: Platform, account: &str, range: &DateRange) -> String {
    let (start, end) = range.compact();
    format!("{}_{}_{}_{}.xlsx", platform.tag(), account, start, end)
}

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<platform>[a-z-]+)_(?P<account>.+)_(?P<start>\d{8})_(?P<end>\d{8})\.xlsx$")
            .expect("filename pattern is valid")
    })
}

/// 从规范文件名解析 (平台, 账号, 日期范围)
pub fn parse_canonical_filename(name: &str) -> AppResult<(Platform, String, DateRange)> {
    let caps = filename_pattern()
        .captures(name)
        .ok_or_else(|| AppError::Other(format!("不是规范文件名: {}", name)))?;
    let platform: Platform = caps["platform"].parse()?;
    let range = DateRange::from_compact(&caps["start"], &caps["end"])?;
    Ok((platform, caps["account"].to_string(), range))
}

/// 一个已落盘的下载文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub account: String,
    pub platform: Platform,
    pub date_range: DateRange,
    pub path: PathBuf,
}

impl Artifact {
    pub fn filename(&self) -> String {
        canonical_filename(self.platform, &self.account, &self.date_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range(s: (i32, u32, u32), e: (i32, u32, u32)) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(s.0, s.1, s.2).unwrap(),
            NaiveDate::from_ymd_opt(e.0, e.1, e.2).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn filename_round_trips() {
        let cases = [
            ("Profile 27", range((2025, 3, 7), (2025, 3, 9))),
            ("my_odd_profile", range((2024, 12, 31), (2025, 1, 2))),
            ("三德", range((2025, 2, 28), (2025, 2, 28))),
        ];
        for platform in Platform::all() {
            for (account, r) in &cases {
                let name = canonical_filename(platform, account, r);
                let (p, a, parsed) = parse_canonical_filename(&name).unwrap();
                assert_eq!(p, platform);
                assert_eq!(&a, account);
                assert_eq!(&parsed, r);
            }
        }
    }

    #[test]
    fn filename_layout() {
        let name = canonical_filename(
            Platform::Operation,
            "Profile 27",
            &range((2025, 3, 7), (2025, 3, 9)),
        );
        assert_eq!(name, "operation_Profile 27_20250307_20250309.xlsx");
    }

    #[test]
    fn rejects_foreign_names() {
        assert!(parse_canonical_filename("推广报表_20250307_20250309_三德_美团.xlsx").is_err());
        assert!(parse_canonical_filename("operation_x_20250309_20250307.xlsx").is_err());
    }
}
