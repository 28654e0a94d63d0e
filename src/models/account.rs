//! 账号表
//!
//! 浏览器 Profile 与品牌、下载开关的映射，进程启动时加载一次，之后只读

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ConfigError};

/// 单个商户账号
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Chrome Profile 目录名（如 "Profile 27"）
    pub profile: String,
    /// 品牌名
    pub brand: String,
    /// 是否下载推广通（CPC）数据
    #[serde(default)]
    pub cpc: bool,
    /// 是否下载运营数据
    #[serde(default = "default_true")]
    pub operation: bool,
}

fn default_true() -> bool {
    true
}

impl Account {
    pub fn id(&self) -> &str {
        &self.profile
    }
}

/// 账号表（已校验）
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
pub(crate) struct RegistryFile {
    #[serde(default)]
    pub accounts: Vec<Account>,
}

impl AccountRegistry {
    /// 校验并构建账号表
    pub fn new(accounts: Vec<Account>) -> AppResult<Self> {
        if accounts.is_empty() {
            return Err(ConfigError::EmptyRegistry.into());
        }

        let mut seen = HashSet::new();
        for (index, account) in accounts.iter().enumerate() {
            let invalid = |reason: &str| ConfigError::InvalidAccount {
                index: index + 1,
                reason: reason.to_string(),
            };
            if account.profile.trim().is_empty() {
                return Err(invalid("profile 不能为空").into());
            }
            if account.profile.contains(['/', '\\']) {
                return Err(invalid("profile 不能包含路径分隔符").into());
            }
            // profile 会拼进工作副本路径
            if matches!(account.profile.trim(), "." | "..") {
                return Err(invalid("profile 不能是 . 或 ..").into());
            }
            // '#' 是任务 id 的分隔符
            if account.profile.contains('#') {
                return Err(invalid("profile 不能包含 '#'").into());
            }
            if account.brand.trim().is_empty() {
                return Err(invalid("brand 不能为空").into());
            }
            if !seen.insert(account.profile.as_str()) {
                return Err(ConfigError::DuplicateAccount(account.profile.clone()).into());
            }
            if !account.cpc && !account.operation {
                tracing::warn!("⚠️ 账号 {} ({}) 未开启任何下载", account.profile, account.brand);
            }
        }

        Ok(Self { accounts })
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, profile: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.profile == profile)
    }

    /// 按品牌名或 profile 选择账号子集，保持账号表顺序
    ///
    /// 空选择表示全部账号
    pub fn select(&self, names: &[String]) -> AppResult<Vec<Account>> {
        let names: Vec<&str> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Ok(self.accounts.clone());
        }

        for name in &names {
            if !self
                .accounts
                .iter()
                .any(|a| a.brand == *name || a.profile == *name)
            {
                return Err(ConfigError::UnknownSelection(name.to_string()).into());
            }
        }

        Ok(self
            .accounts
            .iter()
            .filter(|a| names.contains(&a.brand.as_str()) || names.contains(&a.profile.as_str()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(profile: &str, brand: &str) -> Account {
        Account {
            profile: profile.to_string(),
            brand: brand.to_string(),
            cpc: true,
            operation: true,
        }
    }

    #[test]
    fn rejects_duplicates_and_blanks() {
        assert!(AccountRegistry::new(vec![]).is_err());
        assert!(AccountRegistry::new(vec![account("Profile 1", "A"), account("Profile 1", "B")]).is_err());
        assert!(AccountRegistry::new(vec![account(" ", "A")]).is_err());
        assert!(AccountRegistry::new(vec![account("Profile 1", "")]).is_err());
        assert!(AccountRegistry::new(vec![account("a/b", "A")]).is_err());
    }

    #[test]
    fn rejects_profiles_that_escape_workspace_or_break_job_ids() {
        for bad in ["..", ".", "Profile#1"] {
            let err = AccountRegistry::new(vec![account(bad, "A")]).unwrap_err();
            assert!(
                matches!(err, crate::error::AppError::Config(ConfigError::InvalidAccount { index: 1, .. })),
                "{}: {:?}",
                bad,
                err
            );
        }
        // 名字里带点是合法的
        assert!(AccountRegistry::new(vec![account("Profile 1.5", "A")]).is_ok());
    }

    #[test]
    fn selects_by_brand_or_profile_in_registry_order() {
        let registry = AccountRegistry::new(vec![
            account("Profile 59", "青鹤谷"),
            account("Profile 41", "流杯酒肆"),
            account("Profile 27", "三德"),
        ])
        .unwrap();

        let picked = registry
            .select(&["三德".to_string(), "Profile 59".to_string()])
            .unwrap();
        let ids: Vec<_> = picked.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["Profile 59", "Profile 27"]);

        assert_eq!(registry.select(&[]).unwrap().len(), 3);
        assert!(registry.select(&["不存在".to_string()]).is_err());
    }
}
