use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Account, DateRange};

/// 配方种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeKind {
    /// 推广通小时报表
    Promotion,
    /// 经营数据报表
    Operation,
}

impl RecipeKind {
    pub fn tag(self) -> &'static str {
        match self {
            RecipeKind::Promotion => "cpc",
            RecipeKind::Operation => "operation",
        }
    }

    /// 该账号需要执行的配方（推广通在前，与门户操作顺序一致）
    pub fn enabled_for(account: &Account) -> Vec<RecipeKind> {
        let mut kinds = Vec::new();
        if account.cpc {
            kinds.push(RecipeKind::Promotion);
        }
        if account.operation {
            kinds.push(RecipeKind::Operation);
        }
        kinds
    }
}

impl fmt::Display for RecipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 任务 ID：`{account}#{recipe}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(account: &str, recipe: RecipeKind) -> Self {
        Self(format!("{}#{}", account, recipe.tag()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// (账号, 配方, 日期范围) 三元组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub account: String,
    pub recipe: RecipeKind,
    pub date_range: DateRange,
}

impl Job {
    pub fn new(account: &str, recipe: RecipeKind, date_range: DateRange) -> Self {
        Self {
            id: JobId::new(account, recipe),
            account: account.to_string(),
            recipe,
            date_range,
        }
    }

    /// 为一组账号规划任务，保持账号顺序
    pub fn plan(accounts: &[Account], date_range: DateRange) -> Vec<Job> {
        accounts
            .iter()
            .flat_map(|account| {
                RecipeKind::enabled_for(account)
                    .into_iter()
                    .map(move |kind| Job::new(account.id(), kind, date_range))
            })
            .collect()
    }
}
