use crate::authz::cache::{MetadataCache, MetadataSource};
use crate::authz::errors::AuthzError;
use crate::authz::types::ResourceType;

/// Where an RBAC action's instances live: the action's system and its single
/// related ("native") resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionScope {
    pub action_pk: i64,
    pub system: String,
    pub resource_type_id: String,
    pub resource_type_pk: i64,
}

/// How a granted resource type relates to the action's native type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceMatch {
    Native,
    Ancestor(ResourceType),
}

/// Resolves the native resource type of an action.
///
/// Fails with [`AuthzError::InvalidActionResourceTypes`] unless the action
/// relates to exactly one resource type.
pub async fn resolve_action_scope<S: MetadataSource>(
    cache: &MetadataCache<S>,
    action_pk: i64,
) -> Result<ActionScope, AuthzError> {
    let action = cache.action(action_pk).await?;
    let detail = cache.action_detail(&action.system, &action.id).await?;

    let [related] = detail.resource_types.as_slice() else {
        return Err(AuthzError::InvalidActionResourceTypes {
            action_pk,
            count: detail.resource_types.len(),
        });
    };

    let resource_type_pk = cache.resource_type_pk(&related.system, &related.id).await?;

    Ok(ActionScope {
        action_pk,
        system: action.system,
        resource_type_id: related.id.clone(),
        resource_type_pk,
    })
}

impl ActionScope {
    pub async fn classify<S: MetadataSource>(
        &self,
        cache: &MetadataCache<S>,
        granted_resource_type_pk: i64,
    ) -> Result<ResourceMatch, AuthzError> {
        if granted_resource_type_pk == self.resource_type_pk {
            return Ok(ResourceMatch::Native);
        }
        let rt = cache.resource_type(granted_resource_type_pk).await?;
        Ok(ResourceMatch::Ancestor(rt))
    }

    /// `<system>.<rt>.id`
    pub fn id_attribute(&self) -> String {
        format!("{}.{}.id", self.system, self.resource_type_id)
    }

    /// `<system>.<rt>._bk_iam_path_`
    pub fn path_attribute(&self) -> String {
        format!(
            "{}.{}.{}",
            self.system,
            self.resource_type_id,
            crate::authz::types::IAM_PATH_ATTRIBUTE
        )
    }
}

/// Path fragment matching every descendant of an ancestor instance.
pub fn path_fragment(ancestor_type_id: &str, resource_id: &str) -> String {
    format!("/{},{}/", ancestor_type_id, resource_id)
}
