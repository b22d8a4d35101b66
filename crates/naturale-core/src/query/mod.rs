pub mod analyzer;
pub mod compiler;
pub mod guards;
pub mod hosting;
pub mod patterns;
pub mod structured;
pub mod validate;

/// Reference names of the fields the engine reasons about directly.
pub mod fields {
    pub const ID: &str = "System.Id";
    pub const TITLE: &str = "System.Title";
    pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
    pub const STATE: &str = "System.State";
    pub const ASSIGNED_TO: &str = "System.AssignedTo";
    pub const CREATED_BY: &str = "System.CreatedBy";
    pub const CHANGED_BY: &str = "System.ChangedBy";
    pub const CREATED_DATE: &str = "System.CreatedDate";
    pub const CHANGED_DATE: &str = "System.ChangedDate";
    pub const ITERATION_PATH: &str = "System.IterationPath";
    pub const AREA_PATH: &str = "System.AreaPath";
    pub const DESCRIPTION: &str = "System.Description";
    pub const TAGS: &str = "System.Tags";
    pub const PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
    pub const SEVERITY: &str = "Microsoft.VSTS.Common.Severity";
    pub const STORY_POINTS: &str = "Microsoft.VSTS.Scheduling.StoryPoints";
    pub const EFFORT: &str = "Microsoft.VSTS.Scheduling.Effort";

    /// Identity-typed fields that accept `@Me`.
    pub const IDENTITY_FIELDS: &[&str] = &[ASSIGNED_TO, CREATED_BY, CHANGED_BY];

    pub fn is_date(reference_name: &str) -> bool {
        reference_name == CREATED_DATE || reference_name == CHANGED_DATE
    }
}
