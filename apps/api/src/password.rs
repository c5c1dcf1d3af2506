//! PBKDF2-HMAC-SHA256 password hashes, stored as `<rounds>$<salt hex>$<key hex>`.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[cfg(not(test))]
const ROUNDS: u32 = 600_000;
// Unoptimized test builds would spend seconds per signup.
#[cfg(test)]
const ROUNDS: u32 = 1_000;

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive(password, &salt, ROUNDS);
    format!("{ROUNDS}${}${}", hex::encode(salt), hex::encode(key))
}

/// Checks against the rounds recorded in `stored`, so raising `ROUNDS`
/// keeps older hashes valid.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(rounds), Some(salt_hex), Some(key_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(rounds), Ok(salt), Ok(expected)) = (
        rounds.parse::<u32>(),
        hex::decode(salt_hex),
        hex::decode(key_hex),
    ) else {
        return false;
    };
    if rounds == 0 || expected.len() != KEY_LEN {
        return false;
    }
    let actual = derive(password, &salt, rounds);
    // Constant time.
    actual
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn derive(password: &str, salt: &[u8], rounds: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut key);
    key
}
