//! 门户抓取配方
//!
//! 每个配方只描述"在哪个 frame 点什么、点完应该看到什么"，
//! 重试、恢复和下载都由流程层处理。

pub mod operations;
pub mod promotion;

use crate::error::AppResult;
use crate::infrastructure::{FramePath, Locator};
use crate::models::{Account, Job, RecipeKind};
use crate::workflow::{Condition, ExtractionRecipe, StepPolicy};

/// 根据任务生成配方
pub trait RecipeSource: Send + Sync {
    fn recipe_for(&self, job: &Job, account: &Account) -> AppResult<ExtractionRecipe>;
}

/// 配方公共参数
#[derive(Debug, Clone, Copy)]
pub struct RecipeSettings {
    pub policy: StepPolicy,
    pub max_recoveries: u32,
}

impl Default for RecipeSettings {
    fn default() -> Self {
        Self {
            policy: StepPolicy::default(),
            max_recoveries: 2,
        }
    }
}

/// 美团商家门户的两个配方
#[derive(Debug, Clone, Default)]
pub struct PortalRecipes {
    settings: RecipeSettings,
}

impl PortalRecipes {
    pub fn new(settings: RecipeSettings) -> Self {
        Self { settings }
    }
}

impl RecipeSource for PortalRecipes {
    fn recipe_for(&self, job: &Job, _account: &Account) -> AppResult<ExtractionRecipe> {
        Ok(match job.recipe {
            RecipeKind::Promotion => promotion::recipe(&job.date_range, &self.settings),
            RecipeKind::Operation => operations::recipe(&job.date_range, &self.settings),
        })
    }
}

/// 登录态失效时门户会跳转到扫码登录页
pub(crate) fn login_wall() -> Condition {
    Condition::visible(FramePath::main(), Locator::text_contains("扫码登录"))
}
