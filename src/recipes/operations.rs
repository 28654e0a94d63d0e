//! 经营数据报表配方
//!
//! 报表导出页：选日期、勾选全部指标、提交生成，
//! 刷新下载列表直到文件生成完毕后取回。

use std::time::Duration;

use chrono::{Datelike, NaiveDate};

use crate::infrastructure::{FramePath, Locator};
use crate::models::{DateRange, Platform};
use crate::recipes::{login_wall, RecipeSettings};
use crate::workflow::{Action, Condition, ExtractionRecipe, NavigationStep};

pub const EXPORT_URL: &str =
    "https://ecom.meituan.com/bizguide/portal?cate=100057652#https://ecom.meituan.com/bizguide/export";

const ACTIVE_PANEL: &str = ".mtd-date-calendar-content.active";
const DAY_WRAPPER: &str = "div.mtd-date-panel-data-wrapper:not(.not-current-month)";
const ACTION_TEXT: &str = ".report-form-module_actionText_v26Iw";
const MAIN_INDICATOR: &str = ".report-form-module_mainIndicator_Drhw9";
const LIST_ROW: &str = "tr.mtd-table-row";
/// 文件生成完成前的占位
const PLACEHOLDER: &str = "--";
const GENERATION_POLLS: u32 = 10;

fn export_frame() -> FramePath {
    FramePath::child(0)
}

fn export_step(name: &str, settings: &RecipeSettings) -> NavigationStep {
    NavigationStep::click(name)
        .in_frame(export_frame())
        .with_policy(settings.policy)
}

fn quick(step: NavigationStep) -> NavigationStep {
    step.optional()
        .attempts(1)
        .locate_timeout(Duration::from_millis(1500))
}

fn pick_day(name: &str, day: NaiveDate, settings: &RecipeSettings) -> NavigationStep {
    let year = format!("{}年", day.year());
    let month = format!("{:02}月", day.month());
    let label = day.day().to_string();
    let panel = Locator::css_has_text(ACTIVE_PANEL, &[year.as_str(), month.as_str()]);

    export_step(name, settings)
        .locate(panel.clone().within(Locator::css_exact_text(
            &format!("{0} button, {0} [role=button]", DAY_WRAPPER),
            &label,
        )))
        .locate(panel.within(Locator::css_exact_text(DAY_WRAPPER, &label)))
}

fn date_steps(range: &DateRange, settings: &RecipeSettings) -> Vec<NavigationStep> {
    let mut steps = vec![
        export_step("打开日期控件", settings)
            .locate(Locator::role("textbox", "开始日期 至 结束日期"))
            .locate(Locator::placeholder("开始日期"))
            .expect(Condition::visible(export_frame(), Locator::css(ACTIVE_PANEL))),
        pick_day("选择开始日期", range.start(), settings),
    ];

    let (start, end) = (range.start(), range.end());
    if (start.year(), start.month()) != (end.year(), end.month()) {
        steps.push(
            export_step("切换到下个月", settings)
                .locate(Locator::css(".mtd-date-calendar-month-switcher.right-switcher").nth(0)),
        );
    }
    steps.push(pick_day("选择结束日期", end, settings));
    steps
}

fn open_export_page(settings: &RecipeSettings) -> NavigationStep {
    NavigationStep::new("打开报表导出页", Action::Navigate(EXPORT_URL.to_string()))
        .with_policy(settings.policy)
        .expect(Condition::visible(export_frame(), Locator::css("body")))
}

pub fn recipe(range: &DateRange, settings: &RecipeSettings) -> ExtractionRecipe {
    let mut steps = vec![
        open_export_page(settings),
        quick(
            NavigationStep::click("进入报表")
                .with_policy(settings.policy)
                .locate(Locator::text("报表")),
        )
        .abort_if(login_wall())
        .checkpoint(),
        quick(export_step("关闭弹窗", settings).locate(Locator::css("button.mtd-modal-close"))),
        quick(export_step("重置筛选", settings).locate(Locator::text("点击重置"))),
    ];

    steps.extend(date_steps(range, settings));

    steps.extend([
        quick(
            NavigationStep::new("包含分来源数据", Action::Check)
                .in_frame(export_frame())
                .with_policy(settings.policy)
                .locate(Locator::role_contains("radio", "流量、交易指标需要包含分来源数据")),
        ),
        quick(
            NavigationStep::new("取消时间环比", Action::Uncheck)
                .in_frame(export_frame())
                .with_policy(settings.policy)
                .locate(Locator::role_contains("checkbox", "时间环比")),
        ),
        quick(
            NavigationStep::new("展开更多指标", Action::ClickAll(Some(4)))
                .in_frame(export_frame())
                .with_policy(settings.policy)
                .locate(Locator::css(ACTION_TEXT)),
        ),
        quick(
            NavigationStep::new("模块全选", Action::ClickAll(None))
                .in_frame(export_frame())
                .with_policy(settings.policy)
                .locate(Locator::css(&format!("{} {}", MAIN_INDICATOR, ACTION_TEXT))),
        ),
        quick(
            NavigationStep::new("勾选全部指标", Action::ClickAll(None))
                .in_frame(export_frame())
                .with_policy(settings.policy)
                .locate(Locator::text("全选")),
        ),
        export_step("立即下载", settings)
            .locate(Locator::role("button", "立即下载"))
            .expect(Condition::visible(
                export_frame(),
                Locator::role("button", "前往下载"),
            )),
        export_step("前往下载", settings)
            .locate(Locator::role("button", "前往下载"))
            .expect(Condition::visible(export_frame(), Locator::css(LIST_ROW))),
        // 列表中仍有占位符说明文件还在生成
        NavigationStep::new("等待文件生成", Action::Reload)
            .with_policy(settings.policy)
            .attempts(GENERATION_POLLS)
            .backoff(Duration::from_secs(2))
            .expect(Condition::All(vec![
                Condition::visible(export_frame(), Locator::css(LIST_ROW)),
                Condition::absent(export_frame(), Locator::text(PLACEHOLDER)),
            ])),
        NavigationStep::new("下载报表", Action::Download(Platform::Operation))
            .in_frame(export_frame())
            .with_policy(settings.policy)
            .locate(
                Locator::css(LIST_ROW)
                    .nth(0)
                    .within(Locator::css_has_text("span.report-list-module_btn_lyByD", &["下载"])),
            )
            .locate(Locator::css(LIST_ROW).nth(0).within(Locator::text("下载"))),
    ]);

    // 恢复：重新打开导出页，从"进入报表"重新配置
    ExtractionRecipe::new("经营数据报表")
        .steps(steps)
        .recovery(vec![open_export_page(settings)], settings.max_recoveries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(recipe: &ExtractionRecipe) -> Vec<&str> {
        recipe.step_list().iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn same_month_skips_switcher() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let recipe = recipe(&DateRange::single(day), &RecipeSettings::default());
        assert!(!names(&recipe).contains(&"切换到下个月"));
    }

    #[test]
    fn cross_month_switches_panel() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
        )
        .unwrap();
        let recipe = recipe(&range, &RecipeSettings::default());
        let names = names(&recipe);
        let switch = names.iter().position(|n| *n == "切换到下个月").unwrap();
        let start = names.iter().position(|n| *n == "选择开始日期").unwrap();
        let end = names.iter().position(|n| *n == "选择结束日期").unwrap();
        assert!(start < switch && switch < end);
    }

    #[test]
    fn generation_wait_polls_with_reload() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let recipe = recipe(&DateRange::single(day), &RecipeSettings::default());
        let wait = recipe
            .step_list()
            .iter()
            .find(|s| s.name == "等待文件生成")
            .unwrap();
        assert_eq!(wait.action, Action::Reload);
        assert_eq!(wait.policy.max_attempts, GENERATION_POLLS);
        assert!(!wait.optional);

        let last = recipe.step_list().last().unwrap();
        assert_eq!(last.action, Action::Download(Platform::Operation));
    }
}
