use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::notification::{
    Notification, NotificationChannel, NotificationType, NOTIFICATION_COLUMNS,
};
use crate::services::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    const LIST_LIMIT: i64 = 50;

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist, dispatch and mark the notification sent
    pub async fn send(&self, data: NewNotification) -> ServiceResult<Notification> {
        let id: (Uuid,) = sqlx::query_as(
            "INSERT INTO notifications (user_id, notification_type, channel, title, message, metadata, sent) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE) RETURNING id",
        )
        .bind(data.user_id)
        .bind(data.notification_type)
        .bind(data.channel)
        .bind(&data.title)
        .bind(&data.message)
        .bind(&data.metadata)
        .fetch_one(&self.pool)
        .await?;

        dispatch(&data);

        let notification = sqlx::query_as::<_, Notification>(&format!(
            "UPDATE notifications SET sent = TRUE, sent_at = $2 WHERE id = $1 RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(id.0)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(notification)
    }

    /// Send the same notification to several users
    pub async fn send_to_many(
        &self,
        user_ids: &[Uuid],
        template: &NewNotification,
    ) -> ServiceResult<Vec<Notification>> {
        let sends = user_ids.iter().map(|user_id| {
            let mut data = template.clone();
            data.user_id = *user_id;
            self.send(data)
        });
        futures::future::try_join_all(sends).await
    }

    pub async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> ServiceResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE user_id = $1 {} ORDER BY created_at DESC LIMIT $2",
            NOTIFICATION_COLUMNS,
            if unread_only { "AND read = FALSE" } else { "" }
        );
        let rows = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(Self::LIST_LIMIT)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Only the recipient may mark a notification read
    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> ServiceResult<Notification> {
        sqlx::query_as::<_, Notification>(&format!(
            "UPDATE notifications SET read = TRUE, read_at = COALESCE(read_at, NOW()) \
             WHERE id = $1 AND user_id = $2 RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Notification"))
    }
}

/// Outbound delivery hook. Email and WhatsApp transports are not wired up,
/// so every channel is logged and treated as delivered.
fn dispatch(data: &NewNotification) {
    match data.channel {
        NotificationChannel::Whatsapp => {
            tracing::info!(user_id = %data.user_id, "[whatsapp] {}", data.message)
        }
        NotificationChannel::Email => {
            tracing::info!(user_id = %data.user_id, "[email] {}: {}", data.title, data.message)
        }
        NotificationChannel::InApp => {
            tracing::debug!(user_id = %data.user_id, "[in-app] {}", data.title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_wire_names() {
        let data: NewNotification = serde_json::from_value(json!({
            "userId": Uuid::nil(),
            "type": "FOLLOW_UP_REMINDER",
            "channel": "IN_APP",
            "title": "Follow up",
            "message": "Call the client"
        }))
        .unwrap();
        assert_eq!(data.notification_type, NotificationType::FollowUpReminder);
        assert_eq!(data.channel, NotificationChannel::InApp);
        assert!(data.metadata.is_none());
    }
}
