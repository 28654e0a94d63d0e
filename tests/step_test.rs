mod common;

use std::time::Duration;

use chrono::NaiveDate;
use common::*;

use portal_extract::infrastructure::{FramePath, Locator};
use portal_extract::models::{DateRange, Platform};
use portal_extract::services::{DownloadCapture, ExpectedArtifact};
use portal_extract::workflow::{Action, Condition, NavigationStep, StepContext, StepOutcome};

const ACCOUNT: &str = "Profile 27";

fn range() -> DateRange {
    DateRange::single(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
}

fn unused_capture() -> DownloadCapture {
    DownloadCapture::new("unused", Duration::from_millis(50))
}

#[tokio::test]
async fn step_succeeds_after_transient_failures() {
    let driver = ScriptedDriver::new();
    driver.show(&ok_locator()).fail_perform(&ok_locator(), 2);
    let capture = unused_capture();
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::click("确定")
        .with_policy(fast_policy())
        .locate(ok_locator());
    let run = step.run(&ctx).await;

    assert_eq!(run.outcome, StepOutcome::Success);
    assert_eq!(run.attempts, 3);
    assert_eq!(driver.performed_count(&ok_locator()), 1);
}

#[tokio::test]
async fn later_locator_strategy_is_used_when_earlier_ones_miss() {
    let fallback = Locator::css(".reportBtn");
    let driver = ScriptedDriver::new();
    driver.show(&fallback);
    let capture = unused_capture();
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::click("推广分析")
        .with_policy(fast_policy())
        .locate(missing_locator())
        .locate(fallback.clone());
    let run = step.run(&ctx).await;

    assert!(run.outcome.is_success());
    assert_eq!(run.attempts, 1);
    assert_eq!(driver.performed_count(&fallback), 1);
}

#[tokio::test]
async fn missing_element_exhausts_attempts() {
    let driver = ScriptedDriver::new();
    let capture = unused_capture();
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::click("数据报告")
        .with_policy(fast_policy())
        .locate(missing_locator());
    let run = step.run(&ctx).await;

    assert_eq!(run.attempts, 3);
    match run.outcome {
        StepOutcome::RetriableFailure(reason) => assert!(reason.contains("未找到元素"), "{}", reason),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn abort_condition_is_fatal_without_acting() {
    let wall = Locator::text_contains("扫码登录");
    let driver = ScriptedDriver::new();
    driver.show(&ok_locator()).show(&wall);
    let capture = unused_capture();
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::click("进入推广通")
        .with_policy(fast_policy())
        .locate(ok_locator())
        .abort_if(Condition::visible(FramePath::main(), wall));
    let run = step.run(&ctx).await;

    assert!(matches!(run.outcome, StepOutcome::FatalFailure(_)));
    assert_eq!(run.attempts, 1);
    assert_eq!(driver.performed_count(&ok_locator()), 0);
}

#[tokio::test]
async fn unmet_post_condition_is_retried() {
    let panel = Locator::css(".date-panel");
    let driver = ScriptedDriver::new();
    driver.show(&ok_locator());
    let capture = unused_capture();
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::click("打开日期面板")
        .with_policy(fast_policy())
        .locate(ok_locator())
        .expect(Condition::visible(FramePath::main(), panel));
    let run = step.run(&ctx).await;

    assert!(matches!(run.outcome, StepOutcome::RetriableFailure(ref r) if r.contains("后置条件未满足")));
    assert_eq!(driver.performed_count(&ok_locator()), 3);
}

#[tokio::test]
async fn post_condition_observes_effect_of_action() {
    let panel = Locator::css(".date-panel");
    let driver = ScriptedDriver::new();
    driver.show(&ok_locator()).reveal_on_click(&ok_locator(), &panel);
    let capture = unused_capture();
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::click("打开日期面板")
        .with_policy(fast_policy())
        .locate(ok_locator())
        .expect(Condition::visible(FramePath::main(), panel));
    let run = step.run(&ctx).await;

    assert_eq!(run.outcome, StepOutcome::Success);
    assert_eq!(run.attempts, 1);
}

#[tokio::test]
async fn post_condition_keeps_polling_through_transient_errors() {
    let panel = Locator::css(".date-panel");
    let driver = ScriptedDriver::new();
    driver
        .show(&ok_locator())
        .show(&panel)
        .fail_resolve(&panel, 1);
    let capture = unused_capture();
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::click("打开日期选择")
        .with_policy(fast_policy())
        .attempts(1)
        .verify_timeout(Duration::from_millis(500))
        .locate(ok_locator())
        .expect(Condition::visible(FramePath::main(), panel.clone()));
    let run = step.run(&ctx).await;

    assert_eq!(run.outcome, StepOutcome::Success);
    assert_eq!(run.attempts, 1);
    assert_eq!(driver.resolve_count(&panel), 2);
    assert_eq!(driver.performed_count(&ok_locator()), 1);
}

#[tokio::test]
async fn navigation_actions_do_not_need_an_element() {
    let driver = ScriptedDriver::new();
    let capture = unused_capture();
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::new("打开首页", Action::Navigate("https://ecom.meituan.com".into()))
        .with_policy(fast_policy());
    let run = step.run(&ctx).await;

    assert!(run.outcome.is_success());
    assert_eq!(
        driver.navigations.lock().unwrap().as_slice(),
        ["https://ecom.meituan.com".to_string()]
    );
}

#[tokio::test]
async fn download_lands_at_canonical_path_and_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");
    std::fs::create_dir_all(&staging).unwrap();

    let driver = ScriptedDriver::new();
    driver.serve_downloads_from(&staging).show(&download_locator());
    let capture = DownloadCapture::new(dir.path().join("out"), Duration::from_secs(5));
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::new("下载", Action::Download(Platform::Operation))
        .with_policy(fast_policy())
        .locate(download_locator());

    let first = step.run(&ctx).await;
    let second = step.run(&ctx).await;
    assert!(first.outcome.is_success());
    assert!(second.outcome.is_success());

    let expected = capture.destination(&ExpectedArtifact {
        account: ACCOUNT.to_string(),
        platform: Platform::Operation,
        date_range: range(),
    });
    let artifact = second.artifact.unwrap();
    assert_eq!(artifact.path, expected);
    assert_eq!(
        expected.file_name().unwrap().to_str().unwrap(),
        "operation_Profile 27_20250301_20250301.xlsx"
    );
    assert_eq!(std::fs::read_to_string(&expected).unwrap(), "report 1");

    let stored = std::fs::read_dir(expected.parent().unwrap()).unwrap().count();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn download_that_never_arrives_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let driver = ScriptedDriver::new();
    driver.block_downloads().show(&download_locator());
    let capture = DownloadCapture::new(dir.path(), Duration::from_millis(20));
    let ctx = StepContext::new(&driver, &capture, ACCOUNT, range());

    let step = NavigationStep::new("下载", Action::Download(Platform::CpcMeituan))
        .with_policy(fast_policy())
        .attempts(1)
        .locate(download_locator());
    let run = step.run(&ctx).await;

    match run.outcome {
        StepOutcome::RetriableFailure(reason) => assert!(reason.contains("等待下载超时"), "{}", reason),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(run.artifact.is_none());
}
