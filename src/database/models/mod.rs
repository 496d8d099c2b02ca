pub mod activity;
pub mod application;
pub mod audit;
pub mod client;
pub mod follow_up;
pub mod job;
pub mod lead;
pub mod notification;
pub mod onboarding;
pub mod rule;
pub mod user;

pub use activity::{Activity, ActivityType};
pub use application::{Application, ApplicationStage};
pub use audit::AuditLog;
pub use client::{Client, ClientStatus};
pub use follow_up::FollowUp;
pub use job::{Job, JobSource};
pub use lead::{Lead, LeadDocument, LeadStatus};
pub use notification::{Notification, NotificationChannel, NotificationType};
pub use onboarding::{FieldType, FormField, OnboardingForm, OnboardingSubmission};
pub use rule::{ActionType, AutomationRule, ConditionOperator, RuleAction, RuleCondition, RuleEntity};
pub use user::{User, UserRole, UserSummary};
