use std::sync::Arc;

use axum::http::Method;
use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::VisibilityFlags;
use crate::errors::AppError;
use crate::impersonation::ImpersonationStore;
use crate::jwt::JwtConfig;
use crate::routes::{access, admin, auth, health, messages, projects, tasks};
use crate::tenancy::middleware::reject_client_tenant_id;
use crate::tenancy::{GuardMode, InMemoryWorkspaceCache, TenancyGuard, WorkspaceCache};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub guard: Arc<TenancyGuard>,
    pub impersonation: Arc<ImpersonationStore>,
    pub workspace_cache: Arc<dyn WorkspaceCache>,
    pub visibility: VisibilityFlags,
}

/// Everything configurable from the environment, injected explicitly so
/// tests can pin guard modes and flags without touching process state.
pub struct AppOptions {
    pub jwt: JwtConfig,
    pub guard_mode: GuardMode,
    pub visibility: VisibilityFlags,
}

impl AppOptions {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            jwt: JwtConfig::from_env()?,
            guard_mode: GuardMode::from_env(),
            visibility: VisibilityFlags::from_env(),
        })
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    create_app_with(pool, AppOptions::from_env()?).await
}

pub async fn create_app_with(pool: SqlitePool, options: AppOptions) -> Result<Router, AppError> {
    let state = AppState {
        pool,
        jwt: Arc::new(options.jwt),
        guard: Arc::new(TenancyGuard::new(options.guard_mode)),
        impersonation: Arc::new(ImpersonationStore::new()),
        workspace_cache: Arc::new(InMemoryWorkspaceCache::default()),
        visibility: options.visibility,
    };

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects))
        .route("/", post(projects::create_project))
        .route("/:project_id", get(projects::get_project))
        .route("/:project_id", patch(projects::update_project))
        .route("/:project_id", delete(projects::delete_project));

    // Tasks are scoped to a project: /projects/:project_id/tasks
    let task_routes = Router::new()
        .route("/", get(tasks::list_tasks))
        .route("/", post(tasks::create_task))
        .route("/:id", get(tasks::get_task))
        .route("/:id", patch(tasks::update_task))
        .route("/:id", delete(tasks::delete_task));

    let project_access_routes = Router::new()
        .route("/", get(access::list_project_access))
        .route("/", post(access::invite_project_access))
        .route("/:user_id", patch(access::update_project_access))
        .route("/:user_id", delete(access::revoke_project_access));

    let task_access_routes = Router::new()
        .route("/", get(access::list_task_access))
        .route("/", post(access::invite_task_access))
        .route("/:user_id", patch(access::update_task_access))
        .route("/:user_id", delete(access::revoke_task_access));

    let conversation_routes = Router::new()
        .route("/", post(messages::create_conversation))
        .route("/:id/messages", get(messages::list_messages))
        .route("/:id/messages", post(messages::post_message));

    // Tenant-scoped surface is screened for client-supplied tenant ids. The
    // impersonation routes stay outside the screen; /impersonate/start
    // legitimately carries a tenant id.
    let tenant_scoped = Router::new()
        .nest("/projects", project_routes)
        .nest("/projects/:project_id/tasks", task_routes)
        .nest("/projects/:project_id/access", project_access_routes)
        .nest("/tasks/:task_id/access", task_access_routes)
        .nest("/conversations", conversation_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            reject_client_tenant_id,
        ));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .route("/impersonate/start", post(admin::start_tenant_impersonation))
        .route("/impersonate/stop", post(admin::exit_impersonation))
        .route("/impersonation/exit", post(admin::exit_impersonation))
        .route("/impersonation/status", get(admin::impersonation_status))
        .route(
            "/users/:user_id/impersonate-login",
            post(admin::impersonate_login),
        )
        .merge(tenant_scoped)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
