use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConversationCreateRequest {
    #[schema(example = "Kickoff coordination")]
    pub subject: String,
    /// Members to enroll besides the creator.
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MessageCreateRequest {
    #[schema(example = "Agenda attached.")]
    pub body: String,
}

/// Response wrapper carrying the realtime room name alongside the
/// conversation so clients subscribe to a tenant-scoped channel.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationResponse {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub room: String,
}
