use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::jwt::Identity;
use crate::models::message::{
    ChatMessage, Conversation, ConversationCreateRequest, ConversationResponse,
    MessageCreateRequest,
};
use crate::tenancy::tenant_room;
use crate::utils::utc_now;

#[utoipa::path(
    post,
    path = "/conversations",
    tag = "Messaging",
    request_body = ConversationCreateRequest,
    responses(
        (status = 201, description = "Conversation created", body = ConversationResponse),
        (status = 400, description = "A member does not belong to this tenant")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_conversation(
    State(state): State<AppState>,
    ident: Identity,
    Json(payload): Json<ConversationCreateRequest>,
) -> AppResult<(StatusCode, Json<ConversationResponse>)> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;

    // Member enrollment is a grant-like operation; cross-tenant members are
    // rejected outright.
    for member_id in &payload.member_ids {
        let member_tenant: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT tenant_id FROM users WHERE id = ?")
                .bind(member_id)
                .fetch_optional(&state.pool)
                .await?;
        match member_tenant {
            None => return Err(AppError::not_found("member user not found")),
            Some(Some(t)) if t == tenant_id => {}
            Some(_) => {
                return Err(AppError::bad_request(
                    "member does not belong to this tenant",
                ))
            }
        }
    }

    let now = utc_now();
    let conversation = Conversation {
        id: Uuid::new_v4(),
        tenant_id,
        subject: payload.subject,
        created_by: ident.user_id,
        created_at: now,
    };

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO conversations (id, tenant_id, subject, created_by, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(conversation.id)
    .bind(conversation.tenant_id)
    .bind(&conversation.subject)
    .bind(conversation.created_by)
    .bind(conversation.created_at)
    .execute(&mut *tx)
    .await?;

    let mut members = payload.member_ids.clone();
    if !members.contains(&ident.user_id) {
        members.push(ident.user_id);
    }
    for member_id in &members {
        sqlx::query(
            "INSERT OR IGNORE INTO conversation_members (conversation_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(conversation.id)
        .bind(member_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let room = tenant_room(tenant_id, conversation.id);
    state.guard.assert_tenant_scoped_room(&room, tenant_id)?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse { conversation, room }),
    ))
}

#[utoipa::path(
    get,
    path = "/conversations/{id}/messages",
    tag = "Messaging",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Messages in the conversation", body = [ChatMessage]),
        (status = 403, description = "Not a member or cross-tenant access"),
        (status = 404, description = "Conversation not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_messages(
    State(state): State<AppState>,
    ident: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    require_membership(&state, &ident, tenant_id, id).await?;

    let messages = sqlx::query_as::<_, ChatMessage>(
        "SELECT id, tenant_id, conversation_id, sender_id, body, created_at \
         FROM messages WHERE conversation_id = ? ORDER BY created_at ASC",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(messages))
}

#[utoipa::path(
    post,
    path = "/conversations/{id}/messages",
    tag = "Messaging",
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = MessageCreateRequest,
    responses(
        (status = 201, description = "Message posted", body = ChatMessage),
        (status = 403, description = "Not a member or cross-tenant access")
    ),
    security(("bearerAuth" = []))
)]
pub async fn post_message(
    State(state): State<AppState>,
    ident: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<MessageCreateRequest>,
) -> AppResult<(StatusCode, Json<ChatMessage>)> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    require_membership(&state, &ident, tenant_id, id).await?;

    let message = ChatMessage {
        id: Uuid::new_v4(),
        tenant_id,
        conversation_id: id,
        sender_id: ident.user_id,
        body: payload.body,
        created_at: utc_now(),
    };

    // The room a client would receive this on is validated before insert so
    // a misconstructed name can never fan out across tenants.
    let room = tenant_room(tenant_id, id);
    state.guard.assert_tenant_scoped_room(&room, tenant_id)?;

    sqlx::query(
        "INSERT INTO messages (id, tenant_id, conversation_id, sender_id, body, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(message.id)
    .bind(message.tenant_id)
    .bind(message.conversation_id)
    .bind(message.sender_id)
    .bind(&message.body)
    .bind(message.created_at)
    .execute(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn require_membership(
    state: &AppState,
    ident: &Identity,
    tenant_id: Uuid,
    conversation_id: Uuid,
) -> AppResult<()> {
    let conversation_tenant: Option<Uuid> =
        sqlx::query_scalar("SELECT tenant_id FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(&state.pool)
            .await?;
    let conversation_tenant =
        conversation_tenant.ok_or_else(|| AppError::not_found("conversation not found"))?;

    let member_ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM conversation_members WHERE conversation_id = ?",
    )
    .bind(conversation_id)
    .fetch_all(&state.pool)
    .await?;

    state.guard.assert_chat_membership(
        conversation_tenant,
        tenant_id,
        &member_ids,
        ident.user_id,
        conversation_id,
    )
}
