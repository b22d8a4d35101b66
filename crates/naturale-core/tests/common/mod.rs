#![allow(dead_code)]

use std::sync::Arc;

use naturale_core::backend::{BackendClient, MetadataSource};
use naturale_core::config::{BackendConfig, CacheConfig};
use naturale_core::resolve::AiCollaborator;
use naturale_core::store::SnapshotDatabase;
use naturale_core::{MetadataStore, Translator};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ORG: &str = "acme";
pub const PROJECT: &str = "web";

pub fn backend_config(server: &MockServer) -> BackendConfig {
    BackendConfig {
        endpoint_override: Some(server.uri()),
        ..BackendConfig::default()
    }
}

pub fn source(server: &MockServer) -> Arc<dyn MetadataSource> {
    Arc::new(BackendClient::new(&backend_config(server)).unwrap())
}

pub fn store(server: &MockServer, database: Option<SnapshotDatabase>) -> MetadataStore {
    MetadataStore::new(source(server), CacheConfig::default().ttl(), database)
}

pub fn translator(server: &MockServer, ai: Option<Arc<dyn AiCollaborator>>) -> Translator {
    Translator::new(store(server, None), source(server), ai)
}

pub fn project_path(endpoint: &str) -> String {
    format!("/{ORG}/{PROJECT}/_apis/{endpoint}")
}

pub fn org_path(endpoint: &str) -> String {
    format!("/{ORG}/_apis/{endpoint}")
}

pub async fn mount_json(server: &MockServer, route: String, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, route: String, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string("backend unavailable"))
        .mount(server)
        .await;
}

pub fn work_item_types() -> Value {
    json!({
        "value": [
            {
                "name": "Bug",
                "referenceName": "Microsoft.VSTS.WorkItemTypes.Bug",
                "fields": [
                    {"name": "Title", "referenceName": "System.Title", "type": "string"},
                    {
                        "name": "State",
                        "referenceName": "System.State",
                        "type": "string",
                        "allowedValues": ["New", "Active", "Resolved", "Closed"]
                    },
                    {
                        "name": "Priority",
                        "referenceName": "Microsoft.VSTS.Common.Priority",
                        "type": "integer",
                        "allowedValues": [1, 2, 3, 4]
                    }
                ]
            },
            {
                "name": "User Story",
                "referenceName": "Microsoft.VSTS.WorkItemTypes.UserStory",
                "fields": [
                    {
                        "name": "State",
                        "referenceName": "System.State",
                        "type": "string",
                        "allowedValues": ["New", "Active", "Resolved", "Closed"]
                    },
                    {
                        "name": "Story Points",
                        "referenceName": "Microsoft.VSTS.Scheduling.StoryPoints",
                        "type": "double"
                    }
                ]
            },
            {
                "name": "Task",
                "referenceName": "Microsoft.VSTS.WorkItemTypes.Task",
                "fields": []
            }
        ]
    })
}

pub fn fields() -> Value {
    json!({
        "value": [
            {"name": "Title", "referenceName": "System.Title", "type": "string"},
            {"name": "Assigned To", "referenceName": "System.AssignedTo", "type": "string", "isIdentity": true},
            {"name": "Priority", "referenceName": "Microsoft.VSTS.Common.Priority", "type": "integer"},
            {
                "name": "Severity",
                "referenceName": "Microsoft.VSTS.Common.Severity",
                "type": "string",
                "isPicklist": true,
                "picklistId": "sev-list"
            }
        ]
    })
}

pub fn iterations() -> Value {
    json!({
        "value": [
            {"id": "it-1", "name": "Sprint 1", "path": "web\\Sprint 1", "attributes": {"timeFrame": "past"}},
            {"id": "it-2", "name": "Sprint 2", "path": "web\\Sprint 2", "attributes": {"timeFrame": "current"}}
        ]
    })
}

pub fn areas() -> Value {
    json!({
        "id": 1,
        "name": "web",
        "children": [
            {"id": 2, "name": "Frontend", "children": [{"id": 3, "name": "Checkout"}]},
            {"id": 4, "name": "Backend"}
        ]
    })
}

/// Every metadata endpoint, with Ana on both teams.
pub async fn mount_backend(server: &MockServer) {
    mount_backend_except(server, None).await;
}

/// Every metadata endpoint except `skip`, which is left unmounted.
pub async fn mount_backend_except(server: &MockServer, skip: Option<&str>) {
    let routes = [
        ("types", project_path("wit/workitemtypes"), work_item_types()),
        ("fields", project_path("wit/fields"), fields()),
        ("iterations", project_path("work/teamsettings/iterations"), iterations()),
        ("areas", project_path("wit/classificationnodes/areas"), areas()),
        (
            "teams",
            org_path(&format!("projects/{PROJECT}/teams")),
            json!({"value": [{"id": "t1", "name": "Web Team"}, {"id": "t2", "name": "Ops"}]}),
        ),
    ];
    for (name, route, body) in routes {
        if skip == Some(name) {
            continue;
        }
        mount_json(server, route, body).await;
    }
    mount_json(
        server,
        org_path("work/processes/lists/sev-list"),
        json!({"items": ["1 - Critical", "2 - High", "3 - Medium", "4 - Low"]}),
    )
    .await;
    mount_json(
        server,
        org_path(&format!("projects/{PROJECT}/teams/t1/members")),
        json!({"value": [{"identity": {"displayName": "Ana Lima", "uniqueName": "ana@acme.com"}}]}),
    )
    .await;
    mount_json(
        server,
        org_path(&format!("projects/{PROJECT}/teams/t2/members")),
        json!({"value": [
            {"identity": {"displayName": "Ana Lima", "uniqueName": "ana@acme.com"}},
            {"identity": {"displayName": "Bob Stone", "uniqueName": "bob@acme.com"}}
        ]}),
    )
    .await;
}
