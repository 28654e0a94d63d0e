use portal_extract::config::Config;
use portal_extract::models::{load_account_registry, DateRange, Job, RecipeKind};
use portal_extract::recipes::{PortalRecipes, RecipeSettings, RecipeSource};
use portal_extract::services::{ChromeSessionFactory, DownloadCapture, SessionFactory};
use portal_extract::utils::logging;
use portal_extract::workflow::StepContext;

#[tokio::test]
#[ignore] // 默认忽略，需要本机 Chrome 与已登录的基线 Profile：cargo test -- --ignored
async fn test_open_and_close_session() {
    let _ = logging::init(true, None);

    let config = Config::from_env();
    let registry = load_account_registry(&config.accounts_file)
        .await
        .expect("加载账号表失败");
    let account = registry.accounts()[0].clone();

    let factory = ChromeSessionFactory::from_config(&config);
    let session = factory.open(&account).await.expect("打开会话失败");
    assert!(session.work_dir().exists());

    session.close().await.expect("关闭会话失败");
}

#[tokio::test]
#[ignore]
async fn test_operation_recipe_single_account() {
    let _ = logging::init(true, None);

    let config = Config::from_env();
    let registry = load_account_registry(&config.accounts_file)
        .await
        .expect("加载账号表失败");
    let account = registry
        .accounts()
        .iter()
        .find(|a| a.operation)
        .cloned()
        .expect("账号表中没有开启运营数据的账号");

    let job = Job::new(account.id(), RecipeKind::Operation, DateRange::yesterday_or_weekend());
    let recipes = PortalRecipes::new(RecipeSettings {
        policy: config.step_policy(),
        max_recoveries: config.recipe_recoveries,
    });
    let recipe = recipes.recipe_for(&job, &account).expect("生成配方失败");

    let capture = DownloadCapture::new(&config.download_dir, config.download_timeout());
    let factory = ChromeSessionFactory::from_config(&config);
    let session = factory.open(&account).await.expect("打开会话失败");

    let outcome = {
        let ctx = StepContext::new(session.driver(), &capture, account.id(), job.date_range);
        recipe.run(&ctx).await
    };
    session.close().await.expect("关闭会话失败");

    assert!(outcome.is_success(), "配方执行失败: {:?}", outcome.status);
    for artifact in &outcome.artifacts {
        assert!(artifact.path.exists());
    }
}
