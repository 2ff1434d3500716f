use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    EmailVerification,
    PinReset,
    PinChange,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::EmailVerification => "email_verification",
            OtpPurpose::PinReset => "pin_reset",
            OtpPurpose::PinChange => "pin_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email_verification" => Some(OtpPurpose::EmailVerification),
            "pin_reset" => Some(OtpPurpose::PinReset),
            "pin_change" => Some(OtpPurpose::PinChange),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Otp {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub purpose: String,
    pub otp_code: String,
    pub expires_at: NaiveDateTime,
    pub is_used: bool,
    pub created_at: NaiveDateTime,
}

impl Otp {
    /// Validity check mirrored by the conditional UPDATE that consumes the
    /// code; kept here so the rule is testable without a database.
    pub fn is_valid(&self, purpose: OtpPurpose, code: &str, now: NaiveDateTime) -> bool {
        !self.is_used && self.purpose == purpose.as_str() && self.otp_code == code && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn otp(used: bool, expires_in_minutes: i64) -> Otp {
        let now = Utc::now().naive_utc();
        Otp {
            id: "o1".to_string(),
            user_id: "u1".to_string(),
            email: "user@example.com".to_string(),
            purpose: "pin_reset".to_string(),
            otp_code: "493021".to_string(),
            expires_at: now + Duration::minutes(expires_in_minutes),
            is_used: used,
            created_at: now,
        }
    }

    #[test]
    fn valid_code_accepted_once() {
        let now = Utc::now().naive_utc();
        let fresh = otp(false, 10);
        assert!(fresh.is_valid(OtpPurpose::PinReset, "493021", now));

        let used = otp(true, 10);
        assert!(!used.is_valid(OtpPurpose::PinReset, "493021", now));
    }

    #[test]
    fn purpose_must_match() {
        let now = Utc::now().naive_utc();
        assert!(!otp(false, 10).is_valid(OtpPurpose::PinChange, "493021", now));
        assert!(!otp(false, 10).is_valid(OtpPurpose::EmailVerification, "493021", now));
    }

    #[test]
    fn expired_code_rejected() {
        let now = Utc::now().naive_utc();
        assert!(!otp(false, -1).is_valid(OtpPurpose::PinReset, "493021", now));
    }

    #[test]
    fn wrong_code_rejected() {
        let now = Utc::now().naive_utc();
        assert!(!otp(false, 10).is_valid(OtpPurpose::PinReset, "000000", now));
    }
}
