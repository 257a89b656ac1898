use chrono::{DateTime, Utc};
use common::misc::format_cents;

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub subject: String,
    pub html: String,
}

/// Escapes user supplied text for inclusion in HTML bodies and attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%b %-d, %Y %H:%M UTC").to_string()
}

fn greeting(first_name: &str) -> String {
    if first_name.trim().is_empty() {
        "Hello,".to_string()
    } else {
        format!("Hi {},", escape_html(first_name.trim()))
    }
}

fn button(href: &str, label: &str) -> String {
    format!(
        r#"<p><a href="{}" style="display:inline-block;padding:10px 18px;background:#1f4e79;color:#ffffff;text-decoration:none;border-radius:4px">{}</a></p>"#,
        escape_html(href),
        label
    )
}

/// Wraps body markup in the shared layout. `body` must already be escaped.
fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family:Arial,Helvetica,sans-serif;color:#222;background:#f4f4f4;margin:0;padding:24px">
<table role="presentation" width="100%" style="max-width:560px;margin:0 auto;background:#ffffff;border-radius:6px">
<tr><td style="padding:24px">
<h2 style="margin-top:0">{}</h2>
{}
<p style="color:#888;font-size:12px;margin-top:32px">You are receiving this email because you have an account on our auction marketplace.</p>
</td></tr>
</table>
</body>
</html>"#,
        escape_html(title),
        body
    )
}

fn email(subject: String, title: &str, body: String) -> Email {
    Email {
        subject,
        html: layout(title, &body),
    }
}

pub fn outbid(
    first_name: &str,
    lot_title: &str,
    your_amount: i64,
    current_price: i64,
    lot_url: &str,
) -> Email {
    let body = format!(
        "<p>{}</p><p>Your bid of <strong>{}</strong> on <strong>{}</strong> has been outbid. \
         The current price is <strong>{}</strong>. The hold on your card for this bid has been released.</p>{}",
        greeting(first_name),
        format_cents(your_amount),
        escape_html(lot_title),
        format_cents(current_price),
        button(lot_url, "Bid again"),
    );
    email(format!("You've been outbid on {}", lot_title), "You've been outbid", body)
}

/// `paid` tells whether the winning hold was captured already.
pub fn auction_won(
    first_name: &str,
    lot_title: &str,
    amount: i64,
    paid: bool,
    purchases_url: &str,
) -> Email {
    let payment = if paid {
        "Your card has been charged and the lot is ready for pickup scheduling."
    } else {
        "We will contact you to complete payment."
    };
    let body = format!(
        "<p>{}</p><p>Congratulations! You won <strong>{}</strong> for <strong>{}</strong>.</p><p>{}</p>{}",
        greeting(first_name),
        escape_html(lot_title),
        format_cents(amount),
        payment,
        button(purchases_url, "View your purchases"),
    );
    email(format!("You won {}", lot_title), "You won!", body)
}

pub fn payment_failed(
    first_name: &str,
    lot_title: &str,
    amount: i64,
    reason: &str,
    purchases_url: &str,
) -> Email {
    let body = format!(
        "<p>{}</p><p>We could not charge <strong>{}</strong> for <strong>{}</strong>.</p>\
         <p>Reason: {}</p><p>Please update your payment method. Our team will follow up.</p>{}",
        greeting(first_name),
        format_cents(amount),
        escape_html(lot_title),
        escape_html(reason),
        button(purchases_url, "Review purchase"),
    );
    email(format!("Payment failed for {}", lot_title), "Payment failed", body)
}

pub fn registration_confirmed(
    first_name: &str,
    event_title: &str,
    deposit_amount: i64,
    starts_at: &DateTime<Utc>,
    event_url: &str,
) -> Email {
    let deposit = if deposit_amount > 0 {
        format!(
            "<p>A refundable deposit hold of <strong>{}</strong> has been placed on your card. \
             It is released after the event unless you win a lot and leave it unpaid.</p>",
            format_cents(deposit_amount)
        )
    } else {
        String::new()
    };
    let body = format!(
        "<p>{}</p><p>You are registered to bid in <strong>{}</strong>, starting {}.</p>{}{}",
        greeting(first_name),
        escape_html(event_title),
        format_time(starts_at),
        deposit,
        button(event_url, "View event"),
    );
    email(
        format!("Registration confirmed: {}", event_title),
        "You're registered",
        body,
    )
}

pub fn event_starting(
    first_name: &str,
    event_title: &str,
    starts_at: &DateTime<Utc>,
    event_url: &str,
) -> Email {
    let body = format!(
        "<p>{}</p><p><strong>{}</strong> starts {}. Bidding opens for every lot at that time.</p>{}",
        greeting(first_name),
        escape_html(event_title),
        format_time(starts_at),
        button(event_url, "Browse lots"),
    );
    email(format!("{} is starting soon", event_title), "Starting soon", body)
}

pub fn watchlist_closing(
    first_name: &str,
    lot_title: &str,
    current_price: i64,
    ends_at: &DateTime<Utc>,
    lot_url: &str,
) -> Email {
    let body = format!(
        "<p>{}</p><p><strong>{}</strong> on your watchlist closes {}. The current price is <strong>{}</strong>.</p>{}",
        greeting(first_name),
        escape_html(lot_title),
        format_time(ends_at),
        format_cents(current_price),
        button(lot_url, "Place a bid"),
    );
    email(format!("Closing soon: {}", lot_title), "Closing soon", body)
}

pub fn refund_issued(first_name: &str, lot_title: &str, amount: i64, full: bool) -> Email {
    let kind = if full { "A full refund" } else { "A partial refund" };
    let body = format!(
        "<p>{}</p><p>{} of <strong>{}</strong> for <strong>{}</strong> has been issued to your card. \
         It may take 5 to 10 business days to appear.</p>",
        greeting(first_name),
        kind,
        format_cents(amount),
        escape_html(lot_title),
    );
    email(format!("Refund issued for {}", lot_title), "Refund issued", body)
}

pub fn pickup_confirmed(
    first_name: &str,
    lot_title: &str,
    starts_at: &DateTime<Utc>,
    ends_at: &DateTime<Utc>,
    location: Option<&str>,
) -> Email {
    let location = location
        .map(|l| format!("<p>Location: {}</p>", escape_html(l)))
        .unwrap_or_default();
    let body = format!(
        "<p>{}</p><p>Your pickup of <strong>{}</strong> is booked between {} and {}.</p>{}\
         <p>Please bring a photo ID and any equipment needed to load the item.</p>",
        greeting(first_name),
        escape_html(lot_title),
        format_time(starts_at),
        format_time(ends_at),
        location,
    );
    email(format!("Pickup confirmed: {}", lot_title), "Pickup confirmed", body)
}

pub fn otp_code(first_name: &str, code: &str, ttl_minutes: i64) -> Email {
    let body = format!(
        "<p>{}</p><p>Your sign-in code is</p>\
         <p style=\"font-size:28px;letter-spacing:6px;font-weight:bold\">{}</p>\
         <p>It expires in {} minutes. If you did not request it, ignore this email.</p>",
        greeting(first_name),
        escape_html(code),
        ttl_minutes,
    );
    email("Your sign-in code".to_string(), "Sign-in code", body)
}

pub fn magic_link(first_name: &str, link: &str, ttl_minutes: i64) -> Email {
    let body = format!(
        "<p>{}</p><p>Use the button below to sign in. The link expires in {} minutes and works once.</p>{}",
        greeting(first_name),
        ttl_minutes,
        button(link, "Sign in"),
    );
    email("Your sign-in link".to_string(), "Sign in", body)
}

pub fn password_reset(first_name: &str, link: &str, ttl_minutes: i64) -> Email {
    let body = format!(
        "<p>{}</p><p>We received a request to reset your password. The link expires in {} minutes.</p>{}\
         <p>If you did not ask for this, you can ignore this email.</p>",
        greeting(first_name),
        ttl_minutes,
        button(link, "Reset password"),
    );
    email("Reset your password".to_string(), "Password reset", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("x") & 'y'</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;) &amp; &#39;y&#39;&lt;/script&gt;"
        );
        assert_eq!(escape_html("Lathe 3000"), "Lathe 3000");
    }

    #[test]
    fn user_data_is_escaped_in_body() {
        let email = outbid(
            "<b>Eve</b>",
            "Press <img src=x>",
            10_000,
            12_500,
            "https://bid.example/lots/1",
        );
        assert!(!email.html.contains("<img src=x>"));
        assert!(email.html.contains("Press &lt;img src=x&gt;"));
        assert!(email.html.contains("Hi &lt;b&gt;Eve&lt;/b&gt;,"));
        assert!(email.html.contains("$100.00"));
        assert!(email.html.contains("$125.00"));
    }

    #[test]
    fn won_mentions_payment_state() {
        let paid = auction_won("Ann", "Forklift", 250_000, true, "https://x/purchases");
        assert_eq!(paid.subject, "You won Forklift");
        assert!(paid.html.contains("has been charged"));

        let pending = auction_won("Ann", "Forklift", 250_000, false, "https://x/purchases");
        assert!(pending.html.contains("complete payment"));
    }

    #[test]
    fn registration_without_deposit_skips_hold_text() {
        let starts = Utc.with_ymd_and_hms(2026, 3, 5, 15, 0, 0).unwrap();
        let none = registration_confirmed("Ann", "Plant closure", 0, &starts, "https://x/e/1");
        assert!(!none.html.contains("deposit hold"));
        assert!(none.html.contains("Mar 5, 2026 15:00 UTC"));

        let held = registration_confirmed("Ann", "Plant closure", 50_000, &starts, "https://x/e/1");
        assert!(held.html.contains("$500.00"));
    }

    #[test]
    fn link_templates_carry_escaped_link() {
        let email = magic_link("", "https://x/auth/magic?token=a&b", 15);
        assert!(email.html.contains("Hello,"));
        assert!(email.html.contains("https://x/auth/magic?token=a&amp;b"));
        assert!(password_reset("Ann", "https://x/r", 60).html.contains("60 minutes"));
    }

    #[test]
    fn refund_distinguishes_partial() {
        assert!(refund_issued("Ann", "Lathe", 500, false).html.contains("A partial refund"));
        assert!(refund_issued("Ann", "Lathe", 500, true).html.contains("A full refund"));
    }
}
