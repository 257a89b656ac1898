use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Res};

/// Declares a string-backed status enum stored as TEXT in the database.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn from_str(s: &str) -> Res<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(AppError::BadRequest(format!(
                        "Invalid {}: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

text_enum!(
    /// Role stored on the profile and carried in the JWT.
    Role {
        Bidder => "bidder",
        Admin => "admin",
    }
);

text_enum!(
    EventStatus {
        Draft => "draft",
        Scheduled => "scheduled",
        Live => "live",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

text_enum!(
    /// Lifecycle of a lot. `Closing` marks a lot claimed by a settler.
    LotStatus {
        Draft => "draft",
        Upcoming => "upcoming",
        Live => "live",
        Closing => "closing",
        Sold => "sold",
        Unsold => "unsold",
        Cancelled => "cancelled",
    }
);

text_enum!(
    BidStatus {
        Active => "active",
        Outbid => "outbid",
        Won => "won",
        Lost => "lost",
    }
);

text_enum!(
    /// State of the card hold backing a bid.
    HoldStatus {
        NoHold => "none",
        Held => "held",
        Released => "released",
        Captured => "captured",
        ReleaseFailed => "release_failed",
    }
);

text_enum!(
    RegistrationStatus {
        Authorized => "authorized",
        Released => "released",
        Captured => "captured",
        Cancelled => "cancelled",
    }
);

text_enum!(
    SaleStatus {
        Pending => "pending",
        Paid => "paid",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
);

text_enum!(
    TokenPurpose {
        Otp => "otp",
        MagicLink => "magic_link",
        PasswordReset => "password_reset",
    }
);

/// Hex encoded SHA-256 of the input. Used for one-time tokens at rest.
pub fn hash_str(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Formats an amount in cents for humans, e.g. `123456` -> `$1,234.56`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let dollars = (abs / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}${}.{:02}", sign, grouped, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_parse_their_own_text() {
        for status in [
            LotStatus::Draft,
            LotStatus::Upcoming,
            LotStatus::Live,
            LotStatus::Closing,
            LotStatus::Sold,
            LotStatus::Unsold,
            LotStatus::Cancelled,
        ] {
            assert_eq!(LotStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert_eq!(HoldStatus::from_str("release_failed").unwrap(), HoldStatus::ReleaseFailed);
        assert_eq!(TokenPurpose::MagicLink.to_string(), "magic_link");
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            SaleStatus::from_str("shipped"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"bidder\"").unwrap();
        assert_eq!(role, Role::Bidder);
    }

    #[test]
    fn format_cents_groups_thousands() {
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(100), "$1.00");
        assert_eq!(format_cents(123456), "$1,234.56");
        assert_eq!(format_cents(100000000), "$1,000,000.00");
        assert_eq!(format_cents(-2550), "-$25.50");
    }

    #[test]
    fn hash_str_is_stable_hex() {
        let h = hash_str("123456");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_str("123456"));
        assert_ne!(h, hash_str("654321"));
    }
}
