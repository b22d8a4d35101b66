//! Backend metadata API.

pub mod client;
pub mod wire;

use async_trait::async_trait;

use crate::errors::NaturaleResult;
use crate::models::{Area, FieldInfo, Iteration, ProjectTarget, TeamMember, WorkItemTypeInfo};

pub use client::BackendClient;
pub use wire::WorkItemReference;

/// Source of project schema. Each call is one independently failing slice of
/// a snapshot.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn work_item_types(&self, target: &ProjectTarget) -> NaturaleResult<Vec<WorkItemTypeInfo>>;

    async fn fields(&self, target: &ProjectTarget) -> NaturaleResult<Vec<FieldInfo>>;

    async fn picklist_values(&self, target: &ProjectTarget, picklist_id: &str) -> NaturaleResult<Vec<String>>;

    async fn iterations(&self, target: &ProjectTarget) -> NaturaleResult<Vec<Iteration>>;

    async fn areas(&self, target: &ProjectTarget) -> NaturaleResult<Vec<Area>>;

    /// Members of every team, de-duplicated by unique name.
    async fn team_members(&self, target: &ProjectTarget) -> NaturaleResult<Vec<TeamMember>>;

    async fn execute_wiql(&self, target: &ProjectTarget, wiql: &str) -> NaturaleResult<Vec<WorkItemReference>>;
}
