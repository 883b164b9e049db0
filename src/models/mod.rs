use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod access;
pub mod message;
pub mod project;
pub mod task;
pub mod tenant;
pub mod user;
pub mod workspace;

/// Resource visibility. Workspace visibility is the default; private
/// resources are disclosed only to their creator, explicit grantees, and
/// tenant admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Workspace,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Workspace => "workspace",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "workspace" => Some(Visibility::Workspace),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Visibility::Private)
    }
}
