use anyhow::Result;
use httpmock::prelude::*;
use neon_provisioner::domain::model::{PlannedAction, ResourceAddress};
use neon_provisioner::utils::validation::Validate;
use neon_provisioner::{
    ApiClient, LocalStorage, PollPolicy, ProviderConfig, Reconciler, ResourceRegistry,
};
use serde_json::json;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[api]
base_url = "__BASE_URL__"
api_key = "test-key"
retry_delay_seconds = 0

[polling]
max_attempts = 3
interval_seconds = 0

[state]
path = "__STATE_PATH__"

[[resources]]
kind = "project"
name = "main"
[resources.attributes]
name = "main"
region_id = "aws-us-east-2"
pg_version = 15

[[resources]]
kind = "branch"
name = "dev"
[resources.attributes]
project_id = "{{project.main.id}}"
parent_id = "{{project.main.branch.id}}"
name = "dev"

[[resources]]
kind = "endpoint"
name = "ro"
[resources.attributes]
project_id = "{{project.main.id}}"
branch_id = "{{branch.dev.id}}"
type = "read_only"
autoscaling_limit_max_cu = 1

[[resources]]
kind = "role"
name = "app"
[resources.attributes]
project_id = "{{branch.dev.project_id}}"
branch_id = "{{branch.dev.id}}"
name = "app"

[[resources]]
kind = "database"
name = "appdb"
[resources.attributes]
project_id = "{{project.main.id}}"
branch_id = "{{branch.dev.id}}"
name = "appdb"
owner_name = "{{role.app.name}}"
"#;

fn load_manifest(server: &MockServer, state_dir: &TempDir) -> Result<ProviderConfig> {
    let state_path = state_dir.path().to_string_lossy().replace('\\', "/");
    let content = MANIFEST
        .replace("__BASE_URL__", &server.base_url())
        .replace("__STATE_PATH__", &state_path);
    let config = ProviderConfig::from_toml_str(&content)?;
    config.validate()?;
    Ok(config)
}

fn engine(config: &ProviderConfig) -> Result<Reconciler<LocalStorage>> {
    let client = ApiClient::from_config(config)?;
    let registry = ResourceRegistry::new(client, PollPolicy::from_config(config));
    Ok(Reconciler::new(
        registry,
        LocalStorage::new(config.state.path.clone()),
    ))
}

fn project() -> serde_json::Value {
    json!({
        "id": "proj-1",
        "name": "main",
        "region_id": "aws-us-east-2",
        "provisioner": "k8s-neonvm",
        "pg_version": 15,
        "created_at": "2024-01-01T00:00:00Z"
    })
}

fn branch() -> serde_json::Value {
    json!({
        "id": "br-dev",
        "project_id": "proj-1",
        "parent_id": "br-root",
        "name": "dev",
        "current_state": "ready"
    })
}

fn endpoint(state: &str) -> serde_json::Value {
    json!({
        "id": "ep-ro",
        "host": "ep-ro.neon.tech",
        "project_id": "proj-1",
        "branch_id": "br-dev",
        "type": "read_only",
        "autoscaling_limit_max_cu": 1,
        "current_state": state
    })
}

fn role() -> serde_json::Value {
    json!({"branch_id": "br-dev", "name": "app", "protected": false})
}

fn database() -> serde_json::Value {
    json!({"id": 11, "branch_id": "br-dev", "name": "appdb", "owner_name": "app"})
}

/// 完整生命週期：apply → plan（無變更）→ destroy
#[tokio::test]
async fn test_apply_plan_destroy_full_stack() -> Result<()> {
    let server = MockServer::start_async().await;
    let state_dir = TempDir::new()?;
    let config = load_manifest(&server, &state_dir)?;
    let engine = engine(&config)?;

    // 建立
    let create_project = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/projects")
                .header("Authorization", "Bearer test-key")
                .json_body_partial(r#"{"project": {"name": "main", "region_id": "aws-us-east-2", "pg_version": 15}}"#);
            then.status(201).json_body(json!({
                "project": project(),
                "connection_uris": [{"connection_uri": "postgres://owner@ep-root/neondb"}],
                "roles": [{"branch_id": "br-root", "name": "owner", "password": "pw"}],
                "databases": [{"id": 1, "branch_id": "br-root", "name": "neondb", "owner_name": "owner"}],
                "branch": {"id": "br-root", "project_id": "proj-1", "name": "main", "current_state": "ready"},
                "endpoints": []
            }));
        })
        .await;
    let create_branch = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/projects/proj-1/branches")
                .json_body_partial(r#"{"branch": {"parent_id": "br-root", "name": "dev"}}"#);
            then.status(201).json_body(json!({"branch": branch(), "endpoints": []}));
        })
        .await;
    let create_endpoint = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/projects/proj-1/endpoints")
                .json_body_partial(r#"{"endpoint": {"branch_id": "br-dev", "type": "read_only"}}"#);
            then.status(201).json_body(json!({"endpoint": endpoint("init")}));
        })
        .await;
    let create_role = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/projects/proj-1/branches/br-dev/roles")
                .json_body(json!({"role": {"name": "app"}}));
            then.status(201).json_body(json!({"role": {"branch_id": "br-dev", "name": "app", "password": "generated"}}));
        })
        .await;
    let create_database = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/projects/proj-1/branches/br-dev/databases")
                .json_body(json!({"database": {"name": "appdb", "owner_name": "app"}}));
            then.status(201).json_body(json!({"database": database()}));
        })
        .await;

    // 讀取
    server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/proj-1");
            then.status(200).json_body(json!({"project": project()}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/proj-1/branches/br-dev");
            then.status(200).json_body(json!({"branch": branch()}));
        })
        .await;
    let get_endpoint = server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/proj-1/endpoints/ep-ro");
            then.status(200).json_body(json!({"endpoint": endpoint("active")}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/projects/proj-1/branches/br-dev/roles/app");
            then.status(200).json_body(json!({"role": role()}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/projects/proj-1/branches/br-dev/databases/appdb");
            then.status(200).json_body(json!({"database": database()}));
        })
        .await;

    let results = engine.apply(&config).await?;

    create_project.assert_async().await;
    create_branch.assert_async().await;
    create_endpoint.assert_async().await;
    create_role.assert_async().await;
    create_database.assert_async().await;
    // 端點建立後輪詢一次即離開 init
    get_endpoint.assert_hits_async(1).await;

    let addresses: Vec<&str> = results.iter().map(|r| r.address.as_str()).collect();
    assert_eq!(
        addresses,
        vec!["project.main", "branch.dev", "endpoint.ro", "role.app", "database.appdb"]
    );
    assert!(results.iter().all(|r| r.action == PlannedAction::Create));
    assert_eq!(results[1].id.as_deref(), Some("br-dev/proj-1"));
    assert_eq!(results[4].id.as_deref(), Some("proj-1/br-dev/appdb"));

    let summary = Reconciler::<LocalStorage>::apply_summary(&results);
    assert_eq!(summary["created"], json!(5));

    assert!(state_dir.path().join("project.main.json").exists());
    let role_state = engine.show(&"role.app".parse::<ResourceAddress>()?).await?;
    assert_eq!(role_state.attributes["password"], "generated");
    assert_eq!(role_state.attributes["project_id"], "proj-1");

    // 沒有變更時 plan 全為 no-op
    let plan = engine.plan(&config).await?;
    assert_eq!(plan.len(), 5);
    assert!(plan.iter().all(|change| change.action.is_noop()), "{:?}", plan);

    // 重新 apply 不應再建立任何資源，且刷新後密碼仍保留
    let results = engine.apply(&config).await?;
    assert!(results.iter().all(|r| r.action.is_noop()));
    create_project.assert_hits_async(1).await;
    let role_state = engine.show(&"role.app".parse::<ResourceAddress>()?).await?;
    assert_eq!(role_state.attributes["password"], "generated");

    // 刪除
    let mut delete_mocks = Vec::new();
    for path in [
        "/projects/proj-1/branches/br-dev/databases/appdb",
        "/projects/proj-1/branches/br-dev/roles/app",
        "/projects/proj-1/endpoints/ep-ro",
        "/projects/proj-1/branches/br-dev",
        "/projects/proj-1",
    ] {
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path(path);
                then.status(200).json_body(json!({}));
            })
            .await;
        delete_mocks.push(mock);
    }

    let destroyed = engine.destroy(&config).await?;
    for mock in &delete_mocks {
        mock.assert_async().await;
    }

    let addresses: Vec<&str> = destroyed.iter().map(|r| r.address.as_str()).collect();
    assert_eq!(
        addresses,
        vec!["database.appdb", "role.app", "endpoint.ro", "branch.dev", "project.main"]
    );
    assert!(destroyed.iter().all(|r| r.action == PlannedAction::Delete));
    assert!(!state_dir.path().join("project.main.json").exists());

    Ok(())
}

#[tokio::test]
async fn test_plan_before_apply_reports_creates_without_calls() -> Result<()> {
    let server = MockServer::start_async().await;
    let state_dir = TempDir::new()?;
    let config = load_manifest(&server, &state_dir)?;
    let engine = engine(&config)?;

    let any_call = server
        .mock_async(|when, then| {
            when.path_contains("/projects");
            then.status(500);
        })
        .await;

    let plan = engine.plan(&config).await?;

    any_call.assert_hits_async(0).await;
    assert_eq!(plan.len(), 5);
    assert!(plan.iter().all(|change| change.action == PlannedAction::Create));
    Ok(())
}
