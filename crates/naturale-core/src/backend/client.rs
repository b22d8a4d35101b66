//! reqwest implementation of [`MetadataSource`].

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::backend::wire::{
    flatten_areas, ListResponse, WireClassificationNode, WireField, WireIteration, WirePicklist,
    WireTeam, WireTeamMember, WireWorkItemType, WiqlRequest, WiqlResponse, WorkItemReference,
};
use crate::backend::MetadataSource;
use crate::config::BackendConfig;
use crate::errors::{NaturaleError, NaturaleResult};
use crate::models::{Area, FieldInfo, Iteration, ProjectTarget, TeamMember, WorkItemTypeInfo};
use crate::query::guards::MAX_AREA_DEPTH;

pub struct BackendClient {
    client: Client,
    api_version: String,
    endpoint_override: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> NaturaleResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            api_version: config.api_version.clone(),
            endpoint_override: config
                .endpoint_override
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    fn org_root(&self, target: &ProjectTarget) -> String {
        match &self.endpoint_override {
            Some(endpoint) => format!("{endpoint}/{}", urlencoding::encode(&target.key.organization)),
            None => target.shape.site_root(&target.key.organization),
        }
    }

    /// `{org root}/{project}/_apis/{endpoint}`
    fn project_api(&self, target: &ProjectTarget, endpoint: &str) -> String {
        format!(
            "{}/{}/_apis/{endpoint}",
            self.org_root(target),
            urlencoding::encode(&target.key.project)
        )
    }

    /// `{org root}/_apis/{endpoint}`
    fn org_api(&self, target: &ProjectTarget, endpoint: &str) -> String {
        format!("{}/_apis/{endpoint}", self.org_root(target))
    }

    async fn check(response: reqwest::Response) -> NaturaleResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NaturaleError::Server {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> NaturaleResult<T> {
        debug!(url, "backend GET");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .query(&[("api-version", self.api_version.as_str())])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn teams(&self, target: &ProjectTarget) -> NaturaleResult<Vec<WireTeam>> {
        let url = self.org_api(
            target,
            &format!("projects/{}/teams", urlencoding::encode(&target.key.project)),
        );
        let teams: ListResponse<WireTeam> = self.get_json(&url, &[]).await?;
        Ok(teams.value)
    }

    async fn members_of(&self, target: &ProjectTarget, team: &WireTeam) -> NaturaleResult<Vec<WireTeamMember>> {
        let url = self.org_api(
            target,
            &format!(
                "projects/{}/teams/{}/members",
                urlencoding::encode(&target.key.project),
                urlencoding::encode(&team.id)
            ),
        );
        let members: ListResponse<WireTeamMember> = self.get_json(&url, &[]).await?;
        Ok(members.value)
    }
}

#[async_trait]
impl MetadataSource for BackendClient {
    async fn work_item_types(&self, target: &ProjectTarget) -> NaturaleResult<Vec<WorkItemTypeInfo>> {
        let url = self.project_api(target, "wit/workitemtypes");
        let types: ListResponse<WireWorkItemType> = self.get_json(&url, &[("$expand", "fields")]).await?;
        Ok(types.value.into_iter().map(WorkItemTypeInfo::from).collect())
    }

    async fn fields(&self, target: &ProjectTarget) -> NaturaleResult<Vec<FieldInfo>> {
        let url = self.project_api(target, "wit/fields");
        let fields: ListResponse<WireField> = self.get_json(&url, &[]).await?;
        Ok(fields.value.into_iter().map(FieldInfo::from).collect())
    }

    async fn picklist_values(&self, target: &ProjectTarget, picklist_id: &str) -> NaturaleResult<Vec<String>> {
        let url = self.org_api(
            target,
            &format!("work/processes/lists/{}", urlencoding::encode(picklist_id)),
        );
        let picklist: WirePicklist = self.get_json(&url, &[]).await?;
        Ok(picklist.into_values())
    }

    async fn iterations(&self, target: &ProjectTarget) -> NaturaleResult<Vec<Iteration>> {
        let url = self.project_api(target, "work/teamsettings/iterations");
        let iterations: ListResponse<WireIteration> = self.get_json(&url, &[]).await?;
        Ok(iterations.value.into_iter().map(Iteration::from).collect())
    }

    async fn areas(&self, target: &ProjectTarget) -> NaturaleResult<Vec<Area>> {
        let url = self.project_api(target, "wit/classificationnodes/areas");
        let depth = MAX_AREA_DEPTH.to_string();
        let root: WireClassificationNode = self.get_json(&url, &[("$depth", depth.as_str())]).await?;
        Ok(flatten_areas(&root))
    }

    async fn team_members(&self, target: &ProjectTarget) -> NaturaleResult<Vec<TeamMember>> {
        let teams = self.teams(target).await?;
        let mut members: IndexMap<String, TeamMember> = IndexMap::new();
        for team in &teams {
            let team_members = match self.members_of(target, team).await {
                Ok(team_members) => team_members,
                Err(err) => {
                    warn!(team = %team.name, error = %err, "skipping team members");
                    continue;
                }
            };
            for member in team_members {
                let identity = member.identity;
                if identity.unique_name.is_empty() {
                    continue;
                }
                let entry = members
                    .entry(identity.unique_name.clone())
                    .or_insert_with(|| TeamMember {
                        display_name: identity.display_name.clone(),
                        unique_name: identity.unique_name.clone(),
                        teams: Vec::new(),
                    });
                if !entry.teams.contains(&team.name) {
                    entry.teams.push(team.name.clone());
                }
            }
        }
        Ok(members.into_values().collect())
    }

    async fn execute_wiql(&self, target: &ProjectTarget, wiql: &str) -> NaturaleResult<Vec<WorkItemReference>> {
        let url = self.project_api(target, "wit/wiql");
        debug!(url, "backend POST");
        let response = self
            .client
            .post(&url)
            .query(&[("api-version", self.api_version.as_str())])
            .json(&WiqlRequest { query: wiql })
            .send()
            .await?;
        let result: WiqlResponse = Self::check(response).await?.json().await?;
        Ok(result.work_items)
    }
}
