pub mod action;
pub mod action_resource_type;
pub mod expression;
pub mod job_execution;
pub mod policy;
pub mod rbac_policy;
pub mod resource_type;
pub mod subject;
pub mod subject_action_expression;
pub mod subject_action_group_resource;

pub use action::Entity as Action;
pub use action_resource_type::Entity as ActionResourceType;
pub use expression::Entity as Expression;
pub use job_execution::Entity as JobExecution;
pub use policy::Entity as Policy;
pub use rbac_policy::Entity as RbacPolicy;
pub use resource_type::Entity as ResourceType;
pub use subject::Entity as Subject;
pub use subject_action_expression::Entity as SubjectActionExpression;
pub use subject_action_group_resource::Entity as SubjectActionGroupResource;
