use common::error::Res;
use db::models::watch::ReminderDue;
use notifier::{Email, Notifier, templates};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::JobContext;

#[derive(Debug, Default, Serialize)]
pub struct EventStartReport {
    pub events_started: usize,
    pub lots_started: u64,
    pub reminders_sent: usize,
}

fn reminder_email(notifier: &Notifier, due: &ReminderDue) -> Email {
    templates::event_starting(
        &due.first_name,
        &due.event_title,
        &due.starts_at,
        &notifier.url(&format!("events/{}", due.event_id)),
    )
}

/// Opens the event and its upcoming lots together, so a failure leaves the
/// event scheduled for the next run. `None` when someone else started it.
async fn start_event(pool: &PgPool, event_id: Uuid) -> Res<Option<u64>> {
    let mut tx = pool.begin().await?;
    if db::event::start_event(&mut *tx, event_id).await?.is_none() {
        return Ok(None);
    }
    let lots = db::lot::start_lots_for_event(&mut *tx, event_id).await?;
    tx.commit().await?;
    Ok(Some(lots))
}

/// Opens events whose start time has passed, then sends the reminders of
/// events starting within the lead window. Reminders are claimed before
/// sending, so each goes out at most once.
pub async fn run(ctx: &JobContext) -> Res<EventStartReport> {
    let pool = ctx.pool.as_ref();
    let mut report = EventStartReport::default();

    for event in db::event::due_to_start(pool).await? {
        match start_event(pool, event.id).await {
            Ok(Some(lots)) => {
                log::info!("Event {} is live with {} lots", event.id, lots);
                report.events_started += 1;
                report.lots_started += lots;
            }
            Ok(None) => {}
            Err(e) => log::error!("Failed to start event {}: {}", event.id, e),
        }
    }

    let due = db::watch::claim_due_reminders(pool, ctx.config.jobs.reminder_lead_minutes).await?;
    for reminder in &due {
        ctx.notifier
            .send(&reminder.email, reminder_email(&ctx.notifier, reminder))
            .await;
    }
    report.reminders_sent = due.len();

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use api_auctions::testing;
    use chrono::{Duration, Utc};
    use common::{
        env_config::Config,
        misc::{EventStatus, LotStatus},
        payments::testing::FakeGateway,
    };
    use notifier::testing::RecordingMailer;

    use super::*;

    #[test]
    fn reminder_links_to_the_event() {
        let notifier = Notifier::new(Arc::new(RecordingMailer::default()), "https://bid.example");
        let due = ReminderDue {
            user_id: Uuid::new_v4(),
            email: "buyer@example.com".to_string(),
            first_name: "Sam".to_string(),
            event_id: Uuid::new_v4(),
            event_title: "Plant closure: Dayton".to_string(),
            starts_at: Utc::now(),
        };

        let email = reminder_email(&notifier, &due);
        assert!(email.subject.contains("Plant closure: Dayton"));
        assert!(email
            .html
            .contains(&format!("https://bid.example/events/{}", due.event_id)));
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn due_event_opens_with_its_upcoming_lots(pool: PgPool) {
        let now = Utc::now();
        let due = testing::event(
            &pool,
            EventStatus::Scheduled,
            0,
            now - Duration::minutes(5),
            now + Duration::days(1),
        )
        .await;
        let later = testing::event(
            &pool,
            EventStatus::Scheduled,
            0,
            now + Duration::days(1),
            now + Duration::days(2),
        )
        .await;
        let ends_at = now + Duration::days(1);
        let upcoming = testing::lot(&pool, due.id, LotStatus::Upcoming, 10_000, ends_at).await;
        let draft = testing::lot(&pool, due.id, LotStatus::Draft, 10_000, ends_at).await;

        let (notifier, _) = testing::notifier();
        let ctx = JobContext {
            pool: Arc::new(pool.clone()),
            gateway: Arc::new(FakeGateway::default()),
            notifier,
            config: Config::for_tests(),
        };

        let report = run(&ctx).await.unwrap();
        assert_eq!(report.events_started, 1);
        assert_eq!(report.lots_started, 1);

        let status = |id: Uuid| {
            let pool = pool.clone();
            async move { db::lot::get_lot_by_id(&pool, id).await.unwrap().status }
        };
        assert_eq!(status(upcoming.id).await, LotStatus::Live.as_str());
        assert_eq!(status(draft.id).await, LotStatus::Draft.as_str());
        let due = db::event::get_event_by_id(&pool, due.id).await.unwrap();
        assert_eq!(due.status, EventStatus::Live.as_str());
        let later = db::event::get_event_by_id(&pool, later.id).await.unwrap();
        assert_eq!(later.status, EventStatus::Scheduled.as_str());

        let again = run(&ctx).await.unwrap();
        assert_eq!(again.events_started, 0);
    }
}
