//! End-to-end deployment tests against the recording mock API

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use notion_client::{MockApi, MockCall, ObjectKind};
use notion_deploy::{
    load_document, DatabaseDef, DeployConfig, Deployer, DeploymentState, Document, PageDef,
    UnresolvedPolicy,
};

fn page(title: &str, parent: Option<&str>) -> PageDef {
    PageDef {
        title: title.to_string(),
        parent: parent.map(str::to_string),
        blocks: vec![json!({"type": "paragraph", "content": format!("About {}", title)})],
        ..Default::default()
    }
}

fn database(title: &str, properties: Value) -> DatabaseDef {
    DatabaseDef {
        title: title.to_string(),
        properties,
        ..Default::default()
    }
}

fn deployer(api: &Arc<MockApi>, config: DeployConfig) -> Deployer {
    Deployer::new(api.clone(), config, "root-page")
}

fn projects_and_tasks() -> Document {
    Document {
        databases: vec![
            database(
                "Projects",
                json!({
                    "Name": "title",
                    "Tasks": {"type": "relation", "database": "Tasks"},
                    "Task Count": {
                        "type": "rollup",
                        "relation_property": "Tasks",
                        "rollup_property": "Name",
                        "function": "count"
                    }
                }),
            ),
            database("Tasks", json!({"Name": "title", "Hours": "number"})),
        ],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_rollup_only_in_one_patch() {
    let api = Arc::new(MockApi::new());
    let mut state = DeploymentState::new();

    deployer(&api, DeployConfig::default())
        .deploy(&projects_and_tasks(), &mut state)
        .await
        .unwrap();

    for body in api.created_databases() {
        let text = body.to_string();
        assert!(!text.contains("\"rollup\""), "rollup sent at creation: {}", text);
    }

    let projects_id = state.database_id("Projects").unwrap().to_string();
    let rollup_patches: Vec<(String, Value)> = api
        .database_updates()
        .into_iter()
        .filter(|(_, body)| body["properties"].get("Task Count").is_some())
        .collect();
    assert_eq!(rollup_patches.len(), 1);
    assert_eq!(rollup_patches[0].0, projects_id);
    assert_eq!(
        rollup_patches[0].1["properties"]["Task Count"],
        json!({"rollup": {
            "relation_property_name": "Tasks",
            "rollup_property_name": "Name",
            "function": "count"
        }})
    );

    // Relation to the later database is patched before the rollup
    let updates = api.database_updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(
        updates[0].1["properties"]["Tasks"]["relation"]["database_id"],
        state.database_id("Tasks").unwrap()
    );
    assert_eq!(state.pending_count(), 0);
    assert_eq!(state.stats.relations_patched, 1);
    assert_eq!(state.stats.rollups_patched, 1);
}

#[tokio::test]
async fn test_rerun_creates_nothing() {
    let mut document = projects_and_tasks();
    document.pages = vec![page("Home", None), page("Guide", Some("Home"))];
    document.databases[1].seed_rows = vec![json!({"Name": "Write docs", "Hours": 3})
        .as_object()
        .unwrap()
        .clone()];

    let mut state = DeploymentState::new();
    let first = Arc::new(MockApi::new());
    deployer(&first, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();
    assert_eq!(first.create_count(), 5);

    let second = Arc::new(MockApi::new());
    deployer(&second, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();
    assert_eq!(second.create_count(), 0);
    assert!(second.database_updates().is_empty());
    assert_eq!(state.stats.created(), 0);
    assert_eq!(state.stats.existing(), 5);
}

#[tokio::test]
async fn test_chain_created_parents_first() {
    let document = Document {
        pages: vec![
            page("Child", Some("Parent")),
            page("Parent", Some("Grandparent")),
            page("Grandparent", None),
        ],
        ..Default::default()
    };
    let api = Arc::new(MockApi::new());
    let mut state = DeploymentState::new();
    deployer(&api, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();

    assert_eq!(api.created_page_titles(), vec!["Grandparent", "Parent", "Child"]);

    let bodies: Vec<Value> = api
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::CreatePage(body) => Some(body),
            _ => None,
        })
        .collect();
    assert_eq!(bodies[0]["parent"]["page_id"], "root-page");
    assert_eq!(bodies[1]["parent"]["page_id"], state.page_id("Grandparent").unwrap());
    assert_eq!(bodies[2]["parent"]["page_id"], state.page_id("Parent").unwrap());
}

#[tokio::test]
async fn test_failed_parent_skips_child_until_rerun() {
    let document = Document {
        pages: vec![page("Top", None), page("Parent", Some("Top")), page("Child", Some("Parent"))],
        ..Default::default()
    };
    let mut state = DeploymentState::new();

    let failing = Arc::new(MockApi::new().with_failure("Parent"));
    deployer(&failing, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();
    assert_eq!(failing.created_page_titles(), vec!["Top", "Parent"]);
    assert!(state.page_id("Child").is_none());
    assert_eq!(state.stats.pages_failed, 2);
    assert!(state
        .errors
        .iter()
        .any(|e| e.name == "Child" && e.message.contains("Parent")));

    let healthy = Arc::new(MockApi::new());
    deployer(&healthy, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();
    assert_eq!(healthy.created_page_titles(), vec!["Parent", "Child"]);
    assert!(state.errors.is_empty());
}

#[tokio::test]
async fn test_cycle_fails_without_requests() {
    let document = Document {
        pages: vec![page("A", Some("B")), page("B", Some("A")), page("Fine", None)],
        ..Default::default()
    };
    let api = Arc::new(MockApi::new());
    let mut state = DeploymentState::new();
    let issues = deployer(&api, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();

    assert_eq!(api.created_page_titles(), vec!["Fine"]);
    assert_eq!(state.stats.pages_failed, 2);
    assert!(state
        .errors
        .iter()
        .all(|e| e.message == "circular parent reference"));
    assert!(issues.iter().any(|i| i.message == "circular parent reference"));
}

#[tokio::test]
async fn test_failed_rollup_patch_stays_pending() {
    // Projects is created second (database-2) once Tasks exists
    let document = Document {
        databases: vec![
            database("Tasks", json!({"Name": "title"})),
            database(
                "Projects",
                json!({
                    "Name": "title",
                    "Tasks": {"type": "relation", "database": "Tasks"},
                    "Open": {"type": "rollup", "relation_property": "Tasks", "rollup_property": "Name"}
                }),
            ),
        ],
        ..Default::default()
    };
    let mut state = DeploymentState::new();

    let failing = Arc::new(MockApi::new().with_failing_update("database-2"));
    deployer(&failing, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();
    // The relation resolved at creation; only the rollup was deferred
    let created = failing.created_databases();
    assert!(created[1]["properties"].get("Tasks").is_some());
    assert_eq!(state.pending_rollups["Projects"].len(), 1);
    assert_eq!(state.stats.patches_failed, 1);

    let healthy = Arc::new(MockApi::new());
    deployer(&healthy, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();
    assert_eq!(healthy.create_count(), 0);
    let updates = healthy.database_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "database-2");
    assert_eq!(updates[0].1["properties"]["Open"]["rollup"]["function"], "count");
    assert_eq!(state.pending_count(), 0);
}

#[tokio::test]
async fn test_seed_rows_relations_and_links() {
    let mut projects = database("Projects", json!({"Name": "title"}));
    projects.seed_rows = vec![json!({"Name": "Apollo"}).as_object().unwrap().clone()];
    let mut tasks = database(
        "Tasks",
        json!({
            "Name": "title",
            "Project": {"type": "relation", "database": "Projects"},
            "Done": "checkbox"
        }),
    );
    tasks.parent = Some("Home".to_string());
    tasks.seed_rows = vec![json!({"Name": "Launch", "Project": "Apollo", "Done": true})
        .as_object()
        .unwrap()
        .clone()];

    let mut home = page("Home", None);
    home.database_link = Some("Tasks".to_string());

    let document = Document {
        pages: vec![home],
        databases: vec![projects, tasks],
        ..Default::default()
    };
    let api = Arc::new(MockApi::new());
    let mut state = DeploymentState::new();
    deployer(&api, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();

    let apollo = state.row_id("Projects", "Apollo").unwrap().to_string();
    let launch_body = api
        .calls()
        .into_iter()
        .find_map(|c| match c {
            MockCall::CreatePage(body) if body["properties"].get("Project").is_some() => Some(body),
            _ => None,
        })
        .unwrap();
    assert_eq!(launch_body["parent"]["database_id"], state.database_id("Tasks").unwrap());
    assert_eq!(launch_body["properties"]["Project"], json!({"relation": [{"id": apollo}]}));
    assert_eq!(launch_body["properties"]["Done"], json!({"checkbox": true}));

    // The Tasks database sits under Home
    assert_eq!(
        api.created_databases()[1]["parent"]["page_id"],
        state.page_id("Home").unwrap()
    );

    let links: Vec<MockCall> = api
        .calls()
        .into_iter()
        .filter(|c| matches!(c, MockCall::AppendChildren { .. }))
        .collect();
    assert_eq!(links.len(), 1);
    if let MockCall::AppendChildren { block_id, children } = &links[0] {
        assert_eq!(block_id, state.page_id("Home").unwrap());
        assert_eq!(
            children[0]["link_to_page"]["database_id"],
            state.database_id("Tasks").unwrap()
        );
    }
    assert!(state.linked_pages.contains("Home"));
}

#[tokio::test]
async fn test_lookup_before_create_adopts_existing() {
    let document = Document {
        pages: vec![page("Home", None), page("New", None)],
        ..Default::default()
    };
    let api = Arc::new(MockApi::new().with_existing(ObjectKind::Page, "Home", "page-77"));
    let config = DeployConfig {
        lookup_before_create: true,
        ..Default::default()
    };
    let mut state = DeploymentState::new();
    deployer(&api, config).deploy(&document, &mut state).await.unwrap();

    assert_eq!(state.page_id("Home"), Some("page-77"));
    assert_eq!(api.created_page_titles(), vec!["New"]);
    assert_eq!(state.stats.pages_existing, 1);
}

#[tokio::test]
async fn test_long_page_appends_remaining_blocks() {
    let mut long = page("Long", None);
    long.blocks = (0..250)
        .map(|i| json!({"type": "paragraph", "content": format!("line {}", i)}))
        .collect();
    let document = Document {
        pages: vec![long],
        ..Default::default()
    };
    let api = Arc::new(MockApi::new());
    let mut state = DeploymentState::new();
    deployer(&api, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();

    let calls = api.calls();
    let MockCall::CreatePage(body) = &calls[0] else {
        panic!("expected page creation first, got {:?}", calls[0]);
    };
    assert_eq!(body["children"].as_array().unwrap().len(), 100);

    let appended: Vec<usize> = calls
        .iter()
        .filter_map(|c| match c {
            MockCall::AppendChildren { children, .. } => Some(children.len()),
            _ => None,
        })
        .collect();
    assert_eq!(appended, vec![100, 50]);
}

#[tokio::test]
async fn test_directory_deploy_with_checkpoint() {
    let yaml = TempDir::new().unwrap();
    std::fs::write(
        yaml.path().join("01_pages.yaml"),
        r#"
globals:
  NOTION_DEPLOY_IT_COMPANY: Acme
  icons_map:
    handbook: "📘"
pages:
  - title: Handbook
    icon: handbook
    blocks:
      - type: H2
        heading: "Welcome to ${NOTION_DEPLOY_IT_COMPANY}"
      - type: embed
letters:
  - title: Welcome Letter
    parent: Handbook
    to: New hires
    body: "Hello.\n\nWelcome aboard."
acceptance:
  - check: Handbook renders
    role: Reviewer
"#,
    )
    .unwrap();
    std::fs::write(
        yaml.path().join("02_db.yaml"),
        r#"
db.schemas:
  Team:
    properties:
      Name: title
      Role: select
"#,
    )
    .unwrap();
    std::fs::write(yaml.path().join("03_broken.yaml"), "pages: [oops\n").unwrap();

    let loaded = load_document(yaml.path(), UnresolvedPolicy::Keep).unwrap();
    assert_eq!(loaded.skipped.len(), 1);

    let work = TempDir::new().unwrap();
    let state_path = work.path().join(".deploy_state.json");

    let api = Arc::new(MockApi::new());
    let mut state = DeploymentState::new();
    deployer(&api, DeployConfig::default())
        .with_checkpoint(&state_path)
        .deploy(&loaded.document, &mut state)
        .await
        .unwrap();

    assert_eq!(
        api.created_page_titles(),
        vec!["Handbook", "Acceptance Checklist", "Welcome Letter"]
    );
    let handbook = match &api.calls()[0] {
        MockCall::CreatePage(body) => body.clone(),
        other => panic!("unexpected call {:?}", other),
    };
    assert_eq!(handbook["icon"]["emoji"], "📘");
    assert_eq!(
        handbook["children"][0],
        json!({"heading_2": {"rich_text": [{"text": {"content": "Welcome to Acme"}}]}})
    );
    let embed_text = handbook["children"][1]["paragraph"]["rich_text"][0]["text"]["content"]
        .as_str()
        .unwrap();
    assert!(embed_text.contains("EMBED") && embed_text.contains("No valid URL"));

    let saved = DeploymentState::load(&state_path).unwrap();
    assert_eq!(saved.created_pages.len(), 3);
    assert!(saved.database_id("Team").is_some());

    // A new process resuming from the checkpoint creates nothing
    let mut resumed = DeploymentState::load(&state_path).unwrap();
    let again = Arc::new(MockApi::new());
    deployer(&again, DeployConfig::default())
        .with_checkpoint(&state_path)
        .deploy(&loaded.document, &mut resumed)
        .await
        .unwrap();
    assert_eq!(again.create_count(), 0);
}

fn appended_to(api: &MockApi, block_id: &str) -> Vec<Value> {
    api.calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::AppendChildren { block_id: id, children } if id == block_id => Some(children),
            _ => None,
        })
        .flatten()
        .collect()
}

#[tokio::test]
async fn test_title_links_resolved_after_targets_exist() {
    let yaml = TempDir::new().unwrap();
    std::fs::write(
        yaml.path().join("pages.yaml"),
        r#"
pages:
  - title: Home
    blocks:
      - Start here
      - type: link_to_page
        database: Tasks
      - type: link_to_page
        page: Later
      - type: child_page
        title: Appendix
        children:
          - Extra notes
  - title: Later
databases:
  - title: Tasks
    parent: Home
    properties:
      Name: title
"#,
    )
    .unwrap();
    let loaded = load_document(yaml.path(), UnresolvedPolicy::Keep).unwrap();

    let api = Arc::new(MockApi::new());
    let mut state = DeploymentState::new();
    deployer(&api, DeployConfig::default())
        .deploy(&loaded.document, &mut state)
        .await
        .unwrap();

    assert_eq!(api.created_page_titles(), vec!["Home", "Later", "Appendix"]);
    let home = match &api.calls()[0] {
        MockCall::CreatePage(body) => body.clone(),
        other => panic!("unexpected call {:?}", other),
    };
    assert_eq!(
        home["children"],
        json!([{"paragraph": {"rich_text": [{"text": {"content": "Start here"}}]}}])
    );

    let home_id = state.page_id("Home").unwrap().to_string();
    let appendix = api
        .calls()
        .into_iter()
        .find_map(|c| match c {
            MockCall::CreatePage(body) if body["parent"]["page_id"] == home_id.as_str() => Some(body),
            _ => None,
        })
        .unwrap();
    assert_eq!(appendix["properties"]["title"]["title"][0]["text"]["content"], "Appendix");

    let links = appended_to(&api, &home_id);
    assert_eq!(
        links,
        vec![
            json!({"link_to_page": {"type": "database_id", "database_id": state.database_id("Tasks").unwrap()}}),
            json!({"link_to_page": {"type": "page_id", "page_id": state.page_id("Later").unwrap()}}),
        ]
    );
    assert_eq!(state.stats.links_created, 2);
    assert!(state.pending_links.is_empty());
    assert!(state.errors.is_empty(), "{:?}", state.errors);

    // Nothing is created or appended again
    let again = Arc::new(MockApi::new());
    deployer(&again, DeployConfig::default())
        .deploy(&loaded.document, &mut state)
        .await
        .unwrap();
    assert!(again.calls().is_empty(), "{:?}", again.calls());
}

#[tokio::test]
async fn test_link_to_missing_target_stays_pending() {
    let mut home = page("Home", None);
    home.blocks
        .push(json!({"type": "link_to_page", "database": "Roadmap"}));
    let mut document = Document {
        pages: vec![home],
        ..Default::default()
    };

    let api = Arc::new(MockApi::new());
    let mut state = DeploymentState::new();
    deployer(&api, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();
    assert_eq!(state.pending_link_count(), 1);
    assert_eq!(state.errors.len(), 1);
    assert!(state.errors[0].message.contains("Roadmap"));

    // Once the database exists the held-back link is appended
    document.databases = vec![database("Roadmap", json!({"Name": "title"}))];
    let again = Arc::new(MockApi::new());
    deployer(&again, DeployConfig::default())
        .deploy(&document, &mut state)
        .await
        .unwrap();
    let links = appended_to(&again, state.page_id("Home").unwrap());
    assert_eq!(
        links[0]["link_to_page"]["database_id"],
        state.database_id("Roadmap").unwrap()
    );
    assert_eq!(state.pending_link_count(), 0);
}
