//! 推广通小时报表配方
//!
//! 外层门户 → 推广通 iframe → 数据报告 / 推广分析，
//! 先后为点评、美团两个频道生成"按时间拆分"的明细，
//! 再到下载记录里把两份文件取回来。

use std::time::Duration;

use chrono::Datelike;

use crate::infrastructure::{FramePath, Locator};
use crate::models::{DateRange, Platform};
use crate::recipes::{login_wall, RecipeSettings};
use crate::workflow::{Action, Condition, ExtractionRecipe, NavigationStep};

pub const HOME_URL: &str =
    "https://ecom.meituan.com/meishi/?cate=5348#https://midas.dianping.com/shopdiy/account/pcCpcEntry";

const CPC_FRAME_URL: &str = "midas.dianping.com/shopdiy/account/pcCpcEntry";
const MONTH_PANEL: &str = "div.merchant-date-picker-panel-calendar-month";
const DAY_CELL: &str = "div.merchant-date-picker-panel-calendar-month__date--current-month:not(.merchant-date-picker-panel-calendar-month__date--disabled) div.merchant-date-picker-panel-calendar-month__date-date";

/// 外层门户容器
fn portal_frame() -> FramePath {
    FramePath::child(0)
}

/// 推广通所在的内层 iframe
fn cpc_frame() -> FramePath {
    portal_frame().then_url(CPC_FRAME_URL)
}

fn cpc_step(name: &str, settings: &RecipeSettings) -> NavigationStep {
    NavigationStep::click(name)
        .in_frame(cpc_frame())
        .with_policy(settings.policy)
}

/// 日历面板中点选某一天
fn pick_day(name: &str, day: chrono::NaiveDate, settings: &RecipeSettings) -> NavigationStep {
    let month_label = format!("{}月", day.month());
    let day_label = day.day().to_string();
    cpc_step(name, settings)
        .locate(
            Locator::css_has_text(MONTH_PANEL, &[month_label.as_str()])
                .within(Locator::css_exact_text(DAY_CELL, &day_label)),
        )
        .locate(
            Locator::css_has_text(MONTH_PANEL, &[month_label.as_str()])
                .within(Locator::css_has_text(DAY_CELL, &[day_label.as_str()])),
        )
}

/// 在下拉里切换投放渠道
fn switch_channel(from: &str, to: &str, settings: &RecipeSettings) -> [NavigationStep; 2] {
    [
        cpc_step(&format!("展开渠道({})", from), settings).locate(Locator::css_exact_text("div", from)),
        cpc_step(&format!("选择渠道({})", to), settings)
            .locate(Locator::role("listitem", to))
            .locate(Locator::css_exact_text("li", to)),
    ]
}

/// 为当前渠道生成明细
fn request_detail(channel: &str, settings: &RecipeSettings) -> [NavigationStep; 2] {
    [
        cpc_step(&format!("下载明细({})", channel), settings)
            .locate(Locator::role_contains("button", "下载明细"))
            .locate(Locator::text_contains("下载明细")),
        cpc_step("关闭下载提示", settings)
            .locate(Locator::text("我知道了"))
            .optional()
            .attempts(1)
            .locate_timeout(Duration::from_millis(2000)),
    ]
}

/// 进入推广分析页并停在点评频道
fn enter_analysis(settings: &RecipeSettings) -> Vec<NavigationStep> {
    let mut steps = vec![
        cpc_step("打开数据报告", settings)
            .locate(Locator::text("数据报告"))
            .checkpoint(),
        cpc_step("打开推广分析", settings)
            .locate(Locator::text("推广分析"))
            .locate(Locator::text_contains("推广分析"))
            .locate(Locator::css_has_text("div", &["推广分析"])),
    ];
    steps.extend(switch_channel("美团+点评", "点评", settings));
    steps
}

fn open_portal(settings: &RecipeSettings) -> Vec<NavigationStep> {
    vec![
        NavigationStep::new("打开推广通入口", Action::Navigate(HOME_URL.to_string()))
            .with_policy(settings.policy),
        NavigationStep::click("进入推广通")
            .in_frame(portal_frame())
            .with_policy(settings.policy)
            .locate(Locator::text("推广通"))
            .locate(Locator::text_contains("推广通"))
            .abort_if(login_wall())
            .expect(Condition::visible(cpc_frame(), Locator::css("body"))),
    ]
}

pub fn recipe(range: &DateRange, settings: &RecipeSettings) -> ExtractionRecipe {
    let (date_flag, _) = range.compact();

    let mut steps = open_portal(settings);
    steps.extend(enter_analysis(settings));

    steps.push(
        cpc_step("打开日期选择", settings)
            .locate(Locator::css_has_text("div", &["自定义"]).within(Locator::placeholder("开始日期")))
            .locate(Locator::placeholder("开始日期"))
            .expect(Condition::visible(cpc_frame(), Locator::css(MONTH_PANEL))),
    );
    steps.push(pick_day("选择开始日期", range.start(), settings));
    steps.push(pick_day("选择结束日期", range.end(), settings));
    steps.push(cpc_step("确认日期", settings).locate(Locator::role("button", "确定")));

    steps.push(
        cpc_step("展开统计粒度", settings)
            .locate(Locator::text_contains("分天"))
            .optional()
            .attempts(1),
    );
    steps.push(
        cpc_step("选择分小时", settings)
            .locate(Locator::text("分小时"))
            .optional()
            .attempts(1),
    );
    steps.push(cpc_step("按时间拆分", settings).locate(Locator::text("按时间拆分")));

    steps.extend(request_detail("点评", settings));

    // 下拉框在页面顶部
    for _ in 0..2 {
        steps.push(
            NavigationStep::new("向上翻页", Action::PressKey("PageUp".to_string()))
                .with_policy(settings.policy),
        );
    }
    steps.extend(switch_channel("点评", "美团", settings));
    steps.extend(request_detail("美团", settings));

    let record_row = Locator::css_has_text("tr", &[date_flag.as_str(), "下载"]);
    steps.push(
        cpc_step("打开下载记录", settings)
            .locate(Locator::role_contains("button", "下载记录").nth(0))
            .locate(Locator::text_contains("下载记录").nth(0))
            .expect(Condition::visible(cpc_frame(), record_row.clone())),
    );

    // 下载记录按生成时间倒序，美团在前
    for (index, platform) in [Platform::CpcMeituan, Platform::CpcDianping].into_iter().enumerate() {
        steps.push(
            NavigationStep::new(format!("下载报表({})", platform), Action::Download(platform))
                .in_frame(cpc_frame())
                .with_policy(settings.policy)
                .locate(record_row.clone().nth(index).within(Locator::text("下载")))
                .locate(
                    Locator::role_contains("row", &date_flag)
                        .nth(index)
                        .within(Locator::text_contains("下载")),
                ),
        );
    }

    // 恢复：回到门户顶层重新进入推广通，再从"数据报告"继续
    let recovery = open_portal(settings);

    ExtractionRecipe::new("推广通小时报表")
        .steps(steps)
        .recovery(recovery, settings.max_recoveries)
}
