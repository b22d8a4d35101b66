mod common;

use common::*;
use naturale_core::models::{HostShape, ProjectTarget};
use naturale_core::store::SnapshotDatabase;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target() -> ProjectTarget {
    ProjectTarget::new(ORG, PROJECT, HostShape::PathEmbedded)
}

#[tokio::test]
async fn fetches_full_snapshot() {
    let server = MockServer::start().await;
    mount_backend(&server).await;

    let snapshot = store(&server, None).get_snapshot(&target()).await;

    assert!(!snapshot.is_fallback);
    assert_eq!(
        snapshot.work_item_types.keys().cloned().collect::<Vec<_>>(),
        vec!["Bug", "Task", "User Story"]
    );
    assert_eq!(
        snapshot.allowed_values("Microsoft.VSTS.Common.Severity"),
        vec!["1 - Critical", "2 - High", "3 - Medium", "4 - Low"]
    );
    assert_eq!(
        snapshot.allowed_values("Microsoft.VSTS.Common.Priority"),
        vec!["1", "2", "3", "4"]
    );
    let area_paths: Vec<&str> = snapshot.areas.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(
        area_paths,
        vec!["web", "web\\Frontend", "web\\Frontend\\Checkout", "web\\Backend"]
    );
    assert_eq!(
        snapshot
            .current_iteration(chrono::Utc::now())
            .map(|it| it.name.as_str()),
        Some("Sprint 2")
    );
}

#[tokio::test]
async fn team_members_are_deduplicated_across_teams() {
    let server = MockServer::start().await;
    mount_backend(&server).await;

    let snapshot = store(&server, None).get_snapshot(&target()).await;

    assert_eq!(snapshot.team_members.len(), 2);
    let ana = snapshot
        .team_members
        .iter()
        .find(|m| m.unique_name == "ana@acme.com")
        .unwrap();
    assert_eq!(ana.teams, vec!["Web Team", "Ops"]);
}

#[tokio::test]
async fn failed_iterations_leave_other_slices_intact() {
    let server = MockServer::start().await;
    mount_status(&server, project_path("work/teamsettings/iterations"), 500).await;
    mount_backend_except(&server, Some("iterations")).await;

    let snapshot = store(&server, None).get_snapshot(&target()).await;

    assert!(!snapshot.is_fallback);
    assert!(!snapshot.work_item_types.is_empty());
    assert!(snapshot.iterations.is_empty());
    assert_eq!(snapshot.team_members.len(), 2);
}

#[tokio::test]
async fn failed_team_member_list_is_skipped() {
    let server = MockServer::start().await;
    mount_status(
        &server,
        org_path(&format!("projects/{PROJECT}/teams/t1/members")),
        503,
    )
    .await;
    mount_backend(&server).await;

    let snapshot = store(&server, None).get_snapshot(&target()).await;

    let names: Vec<&str> = snapshot
        .team_members
        .iter()
        .map(|m| m.unique_name.as_str())
        .collect();
    assert_eq!(names, vec!["ana@acme.com", "bob@acme.com"]);
}

#[tokio::test]
async fn unreachable_backend_yields_uncached_fallback() {
    let server = MockServer::start().await;
    let store = store(&server, None);

    let snapshot = store.get_snapshot(&target()).await;

    assert!(snapshot.is_fallback);
    assert_eq!(snapshot.organization, ORG);
    assert!(store.cache_status_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_callers_share_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(project_path("wit/workitemtypes")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(work_item_types())
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_backend_except(&server, Some("types")).await;

    let store = store(&server, None);
    let t = target();
    let (a, b, c) = tokio::join!(
        store.get_snapshot(&t),
        store.get_snapshot(&t),
        store.get_snapshot(&t)
    );
    assert_eq!(a.work_item_types.len(), 3);
    assert_eq!(a, b);
    assert_eq!(b, c);

    store.get_snapshot(&t).await;
    server.verify().await;
}

#[tokio::test]
async fn persisted_snapshot_is_reused_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = SnapshotDatabase::new(dir.path().join("metadata.db")).unwrap();
    db.init_schema().unwrap();

    let live = MockServer::start().await;
    mount_backend(&live).await;
    let first = store(&live, Some(db.clone())).get_snapshot(&target()).await;

    let offline = MockServer::start().await;
    let restarted = store(&offline, Some(db));
    let second = restarted.get_snapshot(&target()).await;

    assert_eq!(second.work_item_types, first.work_item_types);
    assert!(!second.is_fallback);
    assert!(offline.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn refresh_keeps_snapshot_when_backend_goes_away() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let store = store(&server, None);
    let before = store.get_snapshot(&target()).await;

    server.reset().await;
    let after = store.refresh(&target()).await;

    assert_eq!(after.work_item_types, before.work_item_types);
    let status = store.cache_status(&target().key).await.unwrap().unwrap();
    assert!(status.in_memory);
    assert!(!status.persisted);
    assert!(!status.is_stale);
    assert_eq!(status.counts.work_item_types, 3);
}
