use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub wallet_pin: Option<String>,
    pub pin_attempts: i32,
    pub pin_locked_until: Option<NaiveDateTime>,
    pub last_pin_attempt: Option<NaiveDateTime>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn has_pin(&self) -> bool {
        self.wallet_pin.is_some()
    }

    pub fn pin_locked_at(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self.pin_locked_until {
            Some(until) if now < until => Some(until),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub phone_number: String,
    pub password: String,
    pub referral_code: Option<String>,
}

/// Lockout policy for wallet PIN checks: after `max_attempts` consecutive
/// failures the account is locked for `lock_minutes`.
#[derive(Clone, Copy, Debug)]
pub struct PinPolicy {
    pub max_attempts: i32,
    pub lock_minutes: i64,
}

impl PinPolicy {
    pub fn lock_until(&self, failed_attempts: i32, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if failed_attempts >= self.max_attempts {
            Some(now + Duration::minutes(self.lock_minutes))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user_with_lock(until: Option<NaiveDateTime>) -> User {
        let now = Utc::now().naive_utc();
        User {
            id: "u1".to_string(),
            email: "user@example.com".to_string(),
            phone_number: "254700000000".to_string(),
            password_hash: String::new(),
            referral_code: "ABCD1234".to_string(),
            referred_by: None,
            email_verified: true,
            wallet_pin: Some("salt$hash".to_string()),
            pin_attempts: 0,
            pin_locked_until: until,
            last_pin_attempt: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lock_applies_until_expiry() {
        let now = Utc::now().naive_utc();
        let until = now + Duration::minutes(10);
        let user = user_with_lock(Some(until));

        assert_eq!(user.pin_locked_at(now), Some(until));
        assert_eq!(user.pin_locked_at(until + Duration::seconds(1)), None);
    }

    #[test]
    fn no_lock_when_field_unset() {
        let user = user_with_lock(None);
        assert_eq!(user.pin_locked_at(Utc::now().naive_utc()), None);
    }

    #[test]
    fn policy_locks_only_at_threshold() {
        let policy = PinPolicy {
            max_attempts: 3,
            lock_minutes: 15,
        };
        let now = Utc::now().naive_utc();

        assert!(policy.lock_until(2, now).is_none());
        assert_eq!(policy.lock_until(3, now), Some(now + Duration::minutes(15)));
        assert!(policy.lock_until(4, now).is_some());
    }
}
