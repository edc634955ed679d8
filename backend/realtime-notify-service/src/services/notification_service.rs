use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use super::chat_store::ChatStore;
use super::event_publisher::EventPublisher;
use super::publisher::PublishOutcome;

/// Domain-level notifications raised by business logic.
///
/// Thin layer over [`EventPublisher`] that fixes event names and payload
/// shapes, each payload carrying a human-readable `message`.
#[derive(Clone)]
pub struct NotificationService {
    events: EventPublisher,
    chat_store: Arc<dyn ChatStore>,
}

impl NotificationService {
    pub fn new(events: EventPublisher, chat_store: Arc<dyn ChatStore>) -> Self {
        Self { events, chat_store }
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub async fn notify_user(&self, user_id: &str, event_type: &str, payload: Value) -> PublishOutcome {
        self.events.notify_user(user_id, event_type, payload).await
    }

    pub async fn notify_role(&self, role: &str, event_type: &str, payload: Value) -> PublishOutcome {
        self.events.notify_role(role, event_type, payload).await
    }

    pub async fn notify_hr_all(&self, event_type: &str, payload: Value) -> PublishOutcome {
        self.events.notify_hr_all(event_type, payload).await
    }

    pub async fn notify_application_status_change(
        &self,
        candidate_user_id: &str,
        job_title: &str,
        new_status: &str,
    ) -> PublishOutcome {
        let payload = json!({
            "job_title": job_title,
            "new_status": new_status,
            "message": format!("Your application for '{job_title}' has been updated to {new_status}."),
        });
        self.notify_user(candidate_user_id, "application_status_changed", payload)
            .await
    }

    pub async fn notify_profile_viewed(
        &self,
        candidate_user_id: &str,
        viewer_name: &str,
        company_name: &str,
    ) -> PublishOutcome {
        let payload = json!({
            "viewer": viewer_name,
            "company": company_name,
            "message": format!("{viewer_name} from {company_name} viewed your profile."),
        });
        self.notify_user(candidate_user_id, "profile_viewed", payload)
            .await
    }

    pub async fn notify_new_job_posted(
        &self,
        job_id: &str,
        job_title: &str,
        company: &str,
        location: &str,
    ) -> PublishOutcome {
        let payload = json!({
            "job_id": job_id,
            "title": job_title,
            "company": company,
            "location": location,
            "message": format!("New job: {job_title} at {company} in {location}"),
        });
        self.notify_role("candidate", "new_job_posted", payload).await
    }

    /// Unread chat messages for `user_id`; 0 when the store is unavailable.
    pub async fn unread_count(&self, user_id: &str) -> i64 {
        match self.chat_store.total_unread(user_id).await {
            Ok(count) => count.max(0),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "unread count unavailable");
                0
            }
        }
    }
}
