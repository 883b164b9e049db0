use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::impersonation;
use crate::models;
use crate::routes;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::projects::list_projects,
        routes::projects::create_project,
        routes::projects::get_project,
        routes::projects::update_project,
        routes::projects::delete_project,
        routes::tasks::list_tasks,
        routes::tasks::create_task,
        routes::tasks::get_task,
        routes::tasks::update_task,
        routes::tasks::delete_task,
        routes::access::list_project_access,
        routes::access::invite_project_access,
        routes::access::update_project_access,
        routes::access::revoke_project_access,
        routes::access::list_task_access,
        routes::access::invite_task_access,
        routes::access::update_task_access,
        routes::access::revoke_task_access,
        routes::admin::start_tenant_impersonation,
        routes::admin::impersonate_login,
        routes::admin::exit_impersonation,
        routes::admin::impersonation_status,
        routes::messages::create_conversation,
        routes::messages::list_messages,
        routes::messages::post_message,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::auth::MeResponse,
            routes::admin::ImpersonateStartRequest,
            models::Visibility,
            models::tenant::Tenant,
            models::tenant::TenantStatus,
            models::user::User,
            models::user::UserRole,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::workspace::Workspace,
            models::project::Project,
            models::project::ProjectCreateRequest,
            models::project::ProjectUpdateRequest,
            models::task::Task,
            models::task::TaskCreateRequest,
            models::task::TaskUpdateRequest,
            models::access::AccessGrant,
            models::access::AccessRole,
            models::access::AccessInviteRequest,
            models::access::AccessUpdateRequest,
            models::message::Conversation,
            models::message::ConversationCreateRequest,
            models::message::ConversationResponse,
            models::message::ChatMessage,
            models::message::MessageCreateRequest,
            impersonation::ImpersonationSession,
            impersonation::ImpersonationStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Authentication and tenant signup"),
        (name = "Projects", description = "Project management"),
        (name = "Tasks", description = "Task management"),
        (name = "Access", description = "Per-resource access grants"),
        (name = "Impersonation", description = "Super-user impersonation"),
        (name = "Messaging", description = "Tenant-scoped conversations"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![utoipa::openapi::ServerBuilder::new()
        .url(format!("http://localhost:{port}"))
        .build()]);
    doc
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", doc))
}
