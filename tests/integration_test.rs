use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;
use tokio_test::assert_ok;

use feed_sampler::catalog::{Catalog, CatalogStore, JsonFileStore, MemoryStore};
use feed_sampler::config::Config;
use feed_sampler::orchestrator::{DiscoveryStatus, RunScheduler};
use feed_sampler::services::DiscoveryMode;
use feed_sampler::testing::{
    feed_items, NavScript, ScriptedExtractor, ScriptedFactory, SessionScript,
};
use feed_sampler::ItemStatus;

const FEED: &str = "https://feed.example/";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn test_config(dir: &TempDir) -> Config {
    Config {
        feed_url: FEED.to_string(),
        warmup_url: None,
        catalog_path: dir.path().join("catalog.json").display().to_string(),
        snapshot_path: Some(dir.path().join("snapshot.json").display().to_string()),
        retry_jitter_ms: 0,
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_runs_full_discovery_and_persists() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let catalog = Catalog::open(JsonFileStore::new(&config.catalog_path));
    assert!(catalog.needs_discovery(day(1)));

    let mut scheduler = RunScheduler::new(
        &config,
        ScriptedFactory::new(),
        ScriptedExtractor::growing(&[12, 8, 0, 0, 0, 0]),
        catalog,
    );
    let mut rng = StdRng::seed_from_u64(42);

    let report = scheduler.run_once(day(1), &mut rng).await;

    assert!(matches!(
        report.discovery,
        DiscoveryStatus::Synced {
            mode: DiscoveryMode::Full,
            found: 20,
            added: 20,
            attempts: 1
        }
    ));
    assert!(report.planned >= config.min_per_run && report.planned <= config.max_per_run);
    assert_eq!(report.visited, report.planned);
    assert!(!report.unsaved);

    // 重新打开文件，内容与内存一致
    let reloaded = JsonFileStore::new(&config.catalog_path).load();
    assert_eq!(reloaded.items.len(), 20);
    assert_eq!(reloaded.last_sync_date, Some(day(1)));
    let read_today = reloaded
        .items
        .values()
        .filter(|item| item.last_read_date == Some(day(1)))
        .count();
    assert_eq!(read_today, report.visited);

    let snapshot = assert_ok!(std::fs::read_to_string(dir.path().join("snapshot.json")));
    let snapshot: serde_json::Value = assert_ok!(serde_json::from_str(&snapshot));
    assert_eq!(snapshot["count"], 20);
    assert_eq!(snapshot["source_url"], FEED);
}

#[tokio::test(start_paused = true)]
async fn test_second_run_same_day_skips_discovery_and_repeats() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        min_per_run: 4,
        max_per_run: 4,
        ..test_config(&dir)
    };

    let mut first = RunScheduler::new(
        &config,
        ScriptedFactory::new(),
        ScriptedExtractor::growing(&[6, 0, 0, 0, 0]),
        Catalog::open(JsonFileStore::new(&config.catalog_path)),
    );
    let mut rng = StdRng::seed_from_u64(7);
    let report = first.run_once(day(1), &mut rng).await;
    assert_eq!(report.visited, 4);

    let factory = ScriptedFactory::new();
    let mut second = RunScheduler::new(
        &config,
        factory,
        ScriptedExtractor::growing(&[]),
        Catalog::open(JsonFileStore::new(&config.catalog_path)),
    );
    let report = second.run_once(day(1), &mut rng).await;

    assert_eq!(report.discovery, DiscoveryStatus::Skipped);
    // 6 条中 4 条今天已读，只剩 2 条
    assert_eq!(report.planned, 2);
    assert_eq!(report.visited, 2);

    let log = second.orchestrator().factory().log();
    assert!(!log.navigations.iter().any(|url| url == FEED));
    let mut visited = log.navigations.clone();
    visited.sort();
    visited.dedup();
    assert_eq!(visited.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_warm_catalog_uses_incremental_discovery() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = MemoryStore::new();
    let mut catalog = Catalog::open(store.clone());
    catalog.merge(&feed_items(0..200));
    catalog.mark_synced(day(1));

    // 信息流一直在增长，增量模式在 30 条时就停止
    let mut scheduler = RunScheduler::new(
        &config,
        ScriptedFactory::new(),
        ScriptedExtractor::growing(&[10; 50]),
        catalog,
    );
    let mut rng = StdRng::seed_from_u64(3);

    let report = scheduler.run_once(day(2), &mut rng).await;

    assert!(matches!(
        report.discovery,
        DiscoveryStatus::Synced {
            mode: DiscoveryMode::Incremental,
            found: 30,
            added: 0,
            ..
        }
    ));
    assert_eq!(scheduler.catalog().len(), 200);
    assert_eq!(scheduler.catalog().last_sync_date(), Some(day(2)));
}

#[tokio::test(start_paused = true)]
async fn test_blocked_discovery_recovers_on_retry() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let factory = ScriptedFactory::new()
        .then(SessionScript::new().on_navigate(FEED, NavScript::Blocked))
        .then(SessionScript::new().on_navigate(FEED, NavScript::Transient));
    let mut scheduler = RunScheduler::new(
        &config,
        factory,
        ScriptedExtractor::growing(&[5, 0, 0, 0, 0]),
        Catalog::open(MemoryStore::new()),
    );
    let mut rng = StdRng::seed_from_u64(11);

    let report = scheduler.run_once(day(1), &mut rng).await;

    assert!(matches!(
        report.discovery,
        DiscoveryStatus::Synced { attempts: 3, .. }
    ));
    assert_eq!(scheduler.catalog().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_removed_items_are_invalidated_and_never_drawn_again() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        min_per_run: 3,
        max_per_run: 3,
        ..test_config(&dir)
    };
    let gone = "https://feed.example/w/1/";
    let mut catalog = Catalog::open(MemoryStore::new());
    catalog.merge(&feed_items(0..3));
    catalog.mark_synced(day(1));

    let factory = ScriptedFactory::new()
        .otherwise(SessionScript::new().on_navigate(gone, NavScript::NotFound));
    let mut scheduler = RunScheduler::new(
        &config,
        factory,
        ScriptedExtractor::growing(&[]),
        catalog,
    );
    let mut rng = StdRng::seed_from_u64(5);

    let report = scheduler.run_once(day(1), &mut rng).await;
    assert_eq!(report.invalidated, 1);
    assert_eq!(report.visited, 2);
    assert_eq!(
        scheduler.catalog().get(gone).unwrap().status,
        ItemStatus::Invalid
    );

    // 第二天：已同步过的目录不会再抽到失效条目
    let report = scheduler.run_once(day(2), &mut rng).await;
    assert!(report.planned <= 2);
    let navigations = scheduler.orchestrator().factory().log().navigations;
    assert_eq!(navigations.iter().filter(|url| url.as_str() == gone).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_visit_does_not_touch_item() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        min_per_run: 1,
        max_per_run: 1,
        ..test_config(&dir)
    };
    let url = "https://feed.example/w/0/";
    let mut catalog = Catalog::open(MemoryStore::new());
    catalog.merge(&feed_items(0..1));
    catalog.mark_synced(day(1));

    let factory =
        ScriptedFactory::new().otherwise(SessionScript::new().on_navigate(url, NavScript::Blocked));
    let mut scheduler = RunScheduler::new(
        &config,
        factory,
        ScriptedExtractor::growing(&[]),
        catalog,
    );
    let mut rng = StdRng::seed_from_u64(5);

    let report = scheduler.run_once(day(1), &mut rng).await;

    assert_eq!(report.abandoned, 1);
    let item = scheduler.catalog().get(url).unwrap();
    assert_eq!(item.status, ItemStatus::Active);
    assert_eq!(item.read_count, 0);
    assert_eq!(item.last_read_date, None);
}

#[tokio::test]
#[ignore] // 默认忽略，需要本机 Chrome 和网络：cargo test -- --ignored
async fn test_single_run_against_real_browser() {
    feed_sampler::utils::logging::init();

    let dir = TempDir::new().unwrap();
    let config = Config {
        catalog_path: dir.path().join("catalog.json").display().to_string(),
        snapshot_path: None,
        min_per_run: 1,
        max_per_run: 1,
        max_dwell_secs: 20.0,
        ..Config::load().expect("加载配置失败")
    };

    let app = feed_sampler::App::initialize(config)
        .await
        .expect("初始化失败");
    let report = assert_ok!(app.run().await);
    assert!(!report.unsaved);
}
