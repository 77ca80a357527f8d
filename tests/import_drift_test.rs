use anyhow::Result;
use httpmock::prelude::*;
use httpmock::Method::PATCH;
use neon_provisioner::domain::model::{PlannedAction, ResourceAddress, ResourceKind};
use neon_provisioner::{
    ApiClient, LocalStorage, PollPolicy, ProviderConfig, ProviderError, Reconciler,
    ResourceRegistry,
};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn engine(server: &MockServer, state_dir: &TempDir) -> Reconciler<LocalStorage> {
    let client = ApiClient::new(&server.base_url(), "test-key", Duration::from_secs(5))
        .unwrap()
        .with_retry(2, Duration::from_millis(0));
    let poll = PollPolicy {
        max_attempts: 2,
        interval: Duration::from_millis(0),
    };
    Reconciler::new(
        ResourceRegistry::new(client, poll),
        LocalStorage::new(state_dir.path().to_string_lossy().to_string()),
    )
}

fn manifest(server: &MockServer, body: &str) -> ProviderConfig {
    let content = format!(
        "[api]\nbase_url = \"{}\"\napi_key = \"test-key\"\n{}",
        server.base_url(),
        body
    );
    ProviderConfig::from_toml_str(&content).unwrap()
}

fn shared_branch() -> serde_json::Value {
    json!({
        "id": "br-shared",
        "project_id": "proj-9",
        "name": "shared",
        "current_state": "ready",
        "created_at": "2024-03-01T08:30:00Z"
    })
}

#[tokio::test]
async fn test_import_show_and_lookup() -> Result<()> {
    let server = MockServer::start_async().await;
    let state_dir = TempDir::new()?;
    let engine = engine(&server, &state_dir);

    server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/proj-9/branches/br-shared");
            then.status(200).json_body(json!({"branch": shared_branch()}));
        })
        .await;
    let endpoint_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/proj-9/endpoints/ep-9");
            then.status(200).json_body(json!({"endpoint": {
                "id": "ep-9", "project_id": "proj-9", "branch_id": "br-shared",
                "type": "read_write", "current_state": "idle"
            }}));
        })
        .await;

    let address: ResourceAddress = "branch.shared".parse()?;
    let record = assert_ok!(engine.import(&address, "br-shared/proj-9").await);
    assert_eq!(record.id, "br-shared/proj-9");
    assert_eq!(record.attributes["name"], "shared");
    assert_eq!(engine.show(&address).await?.id, "br-shared/proj-9");

    // 已有狀態時不能再次匯入
    let err = assert_err!(engine.import(&address, "br-shared/proj-9").await);
    assert!(matches!(err, ProviderError::StateError { .. }));

    // ID 格式錯誤
    let other: ResourceAddress = "branch.other".parse()?;
    let err = assert_err!(engine.import(&other, "br-shared").await);
    assert!(matches!(err, ProviderError::ImportIdError { .. }));

    let endpoint = engine.lookup(ResourceKind::Endpoint, "ep-9/proj-9").await?;
    endpoint_mock.assert_async().await;
    assert_eq!(endpoint["current_state"], "idle");
    assert!(!state_dir.path().join("endpoint.ep-9.json").exists());

    Ok(())
}

#[tokio::test]
async fn test_data_reference_and_recreate_after_remote_deletion() -> Result<()> {
    let server = MockServer::start_async().await;
    let state_dir = TempDir::new()?;
    let engine = engine(&server, &state_dir);
    let config = manifest(
        &server,
        r#"
[[data]]
kind = "branch"
name = "shared"
id = "br-shared/proj-9"

[[resources]]
kind = "role"
name = "reader"
[resources.attributes]
project_id = "{{data.branch.shared.project_id}}"
branch_id = "{{data.branch.shared.id}}"
name = "reader"
"#,
    );

    server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/proj-9/branches/br-shared");
            then.status(200).json_body(json!({"branch": shared_branch()}));
        })
        .await;
    let create_role = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/projects/proj-9/branches/br-shared/roles")
                .json_body(json!({"role": {"name": "reader"}}));
            then.status(201).json_body(json!({"role": {
                "branch_id": "br-shared", "name": "reader", "password": "pw-1"
            }}));
        })
        .await;
    let gone = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/projects/proj-9/branches/br-shared/roles/reader");
            then.status(404).json_body(json!({"code": "", "message": "role not found"}));
        })
        .await;

    let first = engine.apply(&config).await?;
    assert_eq!(first[0].action, PlannedAction::Create);
    assert_eq!(first[0].id.as_deref(), Some("proj-9/br-shared/reader"));

    // 遠端已刪除：plan 顯示重新建立，apply 再建一次
    let plan = engine.plan(&config).await?;
    assert_eq!(plan[0].action, PlannedAction::Create);

    let second = engine.apply(&config).await?;
    assert_eq!(second[0].action, PlannedAction::Create);
    create_role.assert_hits_async(2).await;
    assert!(gone.hits_async().await >= 2);

    Ok(())
}

#[tokio::test]
async fn test_update_and_replace_project() -> Result<()> {
    let server = MockServer::start_async().await;
    let state_dir = TempDir::new()?;
    let engine = engine(&server, &state_dir);

    let remote = json!({
        "id": "proj-1", "name": "main", "region_id": "aws-us-east-2", "pg_version": 15
    });
    server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/proj-1");
            then.status(200).json_body(json!({"project": remote}));
        })
        .await;
    let address: ResourceAddress = "project.main".parse()?;
    engine.import(&address, "proj-1").await?;

    // 改名 → 原地更新
    let rename = manifest(
        &server,
        r#"
[[resources]]
kind = "project"
name = "main"
[resources.attributes]
name = "renamed"
region_id = "aws-us-east-2"
"#,
    );
    let patch = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/projects/proj-1")
                .json_body(json!({"project": {"name": "renamed"}}));
            then.status(200).json_body(json!({"project": {
                "id": "proj-1", "name": "renamed", "region_id": "aws-us-east-2", "pg_version": 15
            }}));
        })
        .await;

    let results = engine.apply(&rename).await?;
    patch.assert_async().await;
    assert_eq!(
        results[0].action,
        PlannedAction::Update {
            changed: vec!["name".to_string()]
        }
    );

    // 變更 pg_version → 刪除後重建
    let upgrade = manifest(
        &server,
        r#"
[[resources]]
kind = "project"
name = "main"
[resources.attributes]
name = "main"
pg_version = 14
"#,
    );
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/projects/proj-1");
            then.status(200).json_body(json!({"project": remote}));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/projects")
                .json_body_partial(r#"{"project": {"pg_version": 14}}"#);
            then.status(201).json_body(json!({"project": {
                "id": "proj-2", "name": "main", "region_id": "aws-us-east-2", "pg_version": 14
            }}));
        })
        .await;

    let results = engine.apply(&upgrade).await?;
    delete.assert_async().await;
    create.assert_async().await;
    assert!(matches!(results[0].action, PlannedAction::Replace { .. }));
    assert_eq!(results[0].id.as_deref(), Some("proj-2"));
    assert_eq!(engine.show(&address).await?.id, "proj-2");

    Ok(())
}

#[tokio::test]
async fn test_locked_project_is_retried_before_failing() -> Result<()> {
    let server = MockServer::start_async().await;
    let state_dir = TempDir::new()?;
    let engine = engine(&server, &state_dir);

    let locked = server
        .mock_async(|when, then| {
            when.method(POST).path("/projects");
            then.status(423)
                .json_body(json!({"message": "project already has running operations"}));
        })
        .await;

    let address: ResourceAddress = "project.main".parse()?;
    let err = assert_err!(engine.create(&address, &json!({"name": "main"})).await);

    // 1 次原始請求 + 2 次重試
    locked.assert_hits_async(3).await;
    assert!(err.is_locked());
    assert!(engine.load_state(&address).await?.is_none());

    Ok(())
}
