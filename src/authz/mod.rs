//! Per-resource access control.
//!
//! [`resolver`] answers "may user X view or manage resource Y" for a single
//! task or project; [`visibility`] computes the bulk-endpoint filter sets so
//! private resources never leak through enumeration even when per-item
//! checks are not re-run on every list row.

pub mod resolver;
pub mod visibility;

pub use resolver::{
    can_edit_project, can_edit_task, can_manage_project_access, can_manage_task_access,
    can_view_project, can_view_task,
};
pub use visibility::{
    accessible_private_project_ids, accessible_private_task_ids, VisibilityFlags,
};
