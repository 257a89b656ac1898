use common::error::Res;
use db::models::watch::WatchlistDue;
use notifier::{Email, Notifier, templates};
use serde::Serialize;

use crate::JobContext;

#[derive(Debug, Default, Serialize)]
pub struct WatchlistReport {
    pub notified: usize,
}

fn closing_email(notifier: &Notifier, due: &WatchlistDue) -> Email {
    templates::watchlist_closing(
        &due.first_name,
        &due.lot_title,
        due.current_price,
        &due.ends_at,
        &notifier.url(&format!("lots/{}", due.auction_id)),
    )
}

/// Tells watchers about lots closing within the lead window, once per lot.
pub async fn run(ctx: &JobContext) -> Res<WatchlistReport> {
    let due = db::watch::claim_watchlist_closing(
        ctx.pool.as_ref(),
        ctx.config.jobs.watchlist_lead_minutes,
    )
    .await?;

    for watcher in &due {
        ctx.notifier
            .send(&watcher.email, closing_email(&ctx.notifier, watcher))
            .await;
    }

    if !due.is_empty() {
        log::info!("notify-watchlist-closing: sent {} notices", due.len());
    }
    Ok(WatchlistReport {
        notified: due.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use notifier::testing::RecordingMailer;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn closing_notice_shows_price_and_link() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(mailer.clone(), "https://bid.example");
        let due = WatchlistDue {
            user_id: Uuid::new_v4(),
            email: "watcher@example.com".to_string(),
            first_name: "Lee".to_string(),
            auction_id: Uuid::new_v4(),
            lot_title: "Forklift <Hyster>".to_string(),
            current_price: 425_000,
            ends_at: Utc::now() + Duration::minutes(45),
        };

        notifier.send(&due.email, closing_email(&notifier, &due)).await;

        let sent = mailer.sent.lock().unwrap();
        let (to, subject, html) = &sent[0];
        assert_eq!(to, "watcher@example.com");
        assert!(subject.starts_with("Closing soon"));
        assert!(html.contains("$4,250.00"));
        assert!(html.contains("Forklift &lt;Hyster&gt;"));
        assert!(html.contains(&format!("/lots/{}", due.auction_id)));
    }
}
