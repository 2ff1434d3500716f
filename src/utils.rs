use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Referral codes are short, uppercase and unambiguous enough to read over
/// the phone. Uniqueness is enforced by the database constraint.
pub fn generate_referral_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

pub fn generate_otp_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", code)
}

fn digest_with_salt(secret: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Salted hash in `salt$digest` form, used for both passwords and wallet PINs.
pub fn hash_secret(secret: &str) -> String {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let salt = hex::encode(salt);
    let digest = digest_with_salt(secret, &salt);
    format!("{}${}", salt, digest)
}

pub fn verify_secret(secret: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => digest_with_salt(secret, salt) == digest,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referral_codes_have_requested_length() {
        let code = generate_referral_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn otp_codes_are_six_digits() {
        for _ in 0..32 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn secret_round_trip() {
        let stored = hash_secret("1234");
        assert!(verify_secret("1234", &stored));
        assert!(!verify_secret("4321", &stored));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(hash_secret("1234"), hash_secret("1234"));
    }

    #[test]
    fn malformed_stored_value_never_verifies() {
        assert!(!verify_secret("1234", "not-a-salted-hash"));
        assert!(!verify_secret("1234", ""));
    }
}
