mod common;

use async_std::task;
use common::{test_settings, Harness};
use futures::StreamExt;
use rusty_curator_core::manifest::{Category, InstallKind};
use rusty_curator_core::protocol::CuratorEvent;
use rusty_curator_stem::{CatalogState, Route};
use std::time::Duration;

const TOOL_CATALOG: &str = r#"{
    "curated": [
        {
            "type": "upm",
            "category": "A",
            "packageId": "com.acme.tool",
            "git": "https://github.com/acme/tool",
            "name": "Acme Tool",
            "author": "Acme",
            "description": "A tool"
        }
    ],
    "other": []
}"#;

#[async_std::test]
async fn test_registry_package_with_newer_version_has_update() {
    let harness = Harness::new(TOOL_CATALOG);
    harness
        .registry
        .report("com.acme.tool", "1.0.0", "1.1.0", "Library/PackageCache/com.acme.tool");
    harness.catalog.load_now().await;

    let tool = harness.asset("Acme Tool");
    assert_eq!(tool.kind, InstallKind::RegistryPackage);
    assert_eq!(tool.category, Category::A);
    assert!(tool.is_installed());
    assert!(tool.has_update());
    assert!(!tool.is_busy());
    assert_eq!(tool.backend_path(), Some("Library/PackageCache/com.acme.tool"));
}

#[async_std::test]
async fn test_uninstalled_package_and_equal_versions() {
    let harness = Harness::loaded(TOOL_CATALOG).await;
    let tool = harness.asset("Acme Tool");
    assert!(!tool.is_installed());
    assert!(!tool.has_update());

    harness
        .registry
        .report("com.acme.tool", "1.1.0", "1.1.0", "Library/PackageCache/com.acme.tool");
    harness.catalog.load_now().await;
    let tool = harness.asset("Acme Tool");
    assert!(tool.is_installed());
    assert!(!tool.has_update());
}

#[async_std::test]
async fn test_groups_filtered_by_supported_category_and_sorted() {
    let catalog = r#"{
        "curated": [
            {"type": "upm", "category": "b", "packageId": "b.only", "name": "Bravo"},
            {"type": "UPM", "category": "a", "packageId": "a.zulu", "name": "zulu"},
            {"type": "upm", "category": "*", "packageId": "both.alpha", "name": "Alpha"},
            {"type": "upm", "category": "Z", "packageId": "bogus", "name": "Bogus"}
        ],
        "other": [
            {"type": "unitypackage", "category": "A", "guid": "g2", "name": "Mike"},
            {"type": "UnityPackage", "guid": "g1", "name": "kilo"}
        ]
    }"#;
    let settings = rusty_curator_core::manifest::Settings {
        supported_categories: vec![Category::A],
        ..test_settings()
    };
    let harness = Harness::with_settings(catalog, settings);
    harness.catalog.load_now().await;

    let supported = harness.catalog.context().settings().category_set();
    let curated = harness.catalog.curated_assets();
    let other = harness.catalog.other_assets();

    let names: Vec<_> = curated.iter().map(|a| a.display_name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "zulu"]);
    let names: Vec<_> = other.iter().map(|a| a.display_name.as_str()).collect();
    assert_eq!(names, vec!["kilo", "Mike"]);

    for asset in curated.iter().chain(other.iter()) {
        assert!(supported.supports(asset.category));
    }
}

#[async_std::test]
async fn test_archive_state_comes_from_store() {
    let catalog = r#"{
        "curated": [
            {"type": "unitypackage", "category": "A", "guid": "abc", "git": "https://github.com/acme/shader", "name": "Shader"},
            {"type": "unitypackage", "category": "A", "guid": "def", "git": "https://github.com/acme/other", "name": "Other"}
        ]
    }"#;
    let harness = Harness::new(catalog);
    harness.store.put("abc");
    harness.catalog.load_now().await;

    let shader = harness.asset("Shader");
    assert_eq!(shader.route(), Route::Archive);
    assert!(shader.is_installed());
    assert!(!harness.asset("Other").is_installed());
}

#[async_std::test]
async fn test_remote_install_state_is_never_trusted() {
    let catalog = r#"{
        "curated": [
            {"type": "upm", "category": "A", "packageId": "com.acme.tool", "name": "Acme Tool",
             "IsInstalled": true, "HasUpdate": true, "IsBeingModified": true}
        ]
    }"#;
    let harness = Harness::loaded(catalog).await;
    let tool = harness.asset("Acme Tool");
    assert!(!tool.is_installed());
    assert!(!tool.has_update());
    assert!(!tool.is_busy());
}

#[async_std::test]
async fn test_unknown_kind_is_skipped() {
    let catalog = r#"{
        "curated": [
            {"type": "npm", "category": "A", "packageId": "left-pad", "name": "Left Pad"},
            {"type": "vpm", "category": "A", "packageId": "com.acme.vpm", "name": "Vpm Tool"}
        ]
    }"#;
    let harness = Harness::loaded(catalog).await;
    let names: Vec<_> = harness
        .catalog
        .curated_assets()
        .into_iter()
        .map(|a| a.display_name)
        .collect();
    assert_eq!(names, vec!["Vpm Tool"]);
}

#[async_std::test]
async fn test_first_read_triggers_load_without_blocking() {
    let harness = Harness::new(TOOL_CATALOG);
    *harness.fetcher.catalog_delay.lock().unwrap() = Some(Duration::from_millis(50));
    assert_eq!(harness.catalog.context().state(), CatalogState::NotStarted);

    let first = harness.catalog.curated_assets();
    assert!(first.is_empty());
    assert!(harness.catalog.is_loading());

    // Later reads do not start another pass.
    let _ = harness.catalog.other_assets();

    for _ in 0..100 {
        if !harness.catalog.is_loading() {
            break;
        }
        task::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(harness.catalog.context().state(), CatalogState::Loaded);
    assert_eq!(harness.catalog.curated_assets().len(), 1);
    assert_eq!(harness.fetcher.catalog_fetches(), 1);
}

#[async_std::test]
async fn test_reloads_during_a_pass_are_serialized() {
    let harness = Harness::new(TOOL_CATALOG);
    *harness.fetcher.catalog_delay.lock().unwrap() = Some(Duration::from_millis(30));

    harness.catalog.force_reload();
    harness.catalog.force_reload();
    harness.catalog.force_reload();
    assert!(harness.catalog.is_loading());

    harness.catalog.load_now().await;
    assert_eq!(harness.catalog.context().state(), CatalogState::Loaded);
    // One pass plus one coalesced rerun.
    assert_eq!(harness.fetcher.catalog_fetches(), 2);
}

#[async_std::test]
async fn test_load_now_joins_a_running_pass() {
    let harness = Harness::new(TOOL_CATALOG);
    *harness.fetcher.catalog_delay.lock().unwrap() = Some(Duration::from_millis(30));

    harness.catalog.force_reload();
    harness.catalog.load_now().await;

    assert_eq!(harness.catalog.context().state(), CatalogState::Loaded);
    assert_eq!(harness.catalog.curated_assets().len(), 1);
    assert_eq!(harness.fetcher.catalog_fetches(), 1);
}

#[async_std::test]
async fn test_pass_never_overwrites_an_install_settled_during_it() {
    let harness = Harness::loaded(TOOL_CATALOG).await;
    *harness.fetcher.catalog_delay.lock().unwrap() = Some(Duration::from_millis(200));

    // The registry never reports the package, so this pass reads it as absent.
    harness.catalog.force_reload();
    harness.orchestrator.install(&harness.asset("Acme Tool")).unwrap();
    harness.registry.last_handle().succeed();
    harness.drain().await;
    assert!(harness.asset("Acme Tool").is_installed());

    for _ in 0..200 {
        if !harness.catalog.is_loading() {
            break;
        }
        task::sleep(Duration::from_millis(5)).await;
    }
    assert!(!harness.catalog.is_loading());
    let tool = harness.asset("Acme Tool");
    assert!(tool.is_installed());
    assert!(!tool.is_busy());
}

#[async_std::test]
async fn test_failed_fetch_keeps_previous_lists() {
    let harness = Harness::loaded(TOOL_CATALOG).await;
    let mut events = harness.catalog.context().subscribe();
    assert_eq!(harness.catalog.curated_assets().len(), 1);

    harness.fetcher.texts.lock().unwrap().clear();
    harness.catalog.load_now().await;

    assert_eq!(harness.catalog.context().state(), CatalogState::Loaded);
    assert_eq!(harness.catalog.curated_assets().len(), 1);
    match events.next().await {
        Some(CuratorEvent::CatalogFailed(error)) => assert!(error.contains("404")),
        other => panic!("expected CatalogFailed, got {:?}", other),
    }
}

#[async_std::test]
async fn test_malformed_catalog_fails_the_pass() {
    let harness = Harness::new("{ not json");
    let mut events = harness.catalog.context().subscribe();
    harness.catalog.load_now().await;

    assert!(harness.catalog.curated_assets().is_empty());
    assert!(matches!(
        events.next().await,
        Some(CuratorEvent::CatalogFailed(_))
    ));
}
