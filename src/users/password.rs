/// Password and token hashing
///
/// Passwords are stored as `pbkdf2-sha256$<rounds>$<salt hex>$<hash hex>`: PBKDF2-HMAC-SHA256
/// over a random 16-byte salt. The round count travels with the hash, so raising it only
/// affects new passwords. Refresh tokens are stored as a plain SHA-256 hex digest so a
/// leaked table cannot be replayed.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str, rounds: u32) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(password.as_bytes(), &salt, rounds);
    format!("{}${}${}${}", SCHEME, rounds, hex::encode(salt), hex::encode(hash))
}

/// Check a password against a stored hash; malformed hashes never verify
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(rounds), Some(salt), Some(hash), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let (Ok(rounds), Ok(salt), Ok(expected)) = (rounds.parse::<u32>(), hex::decode(salt), hex::decode(hash)) else {
        return false;
    };
    if rounds == 0 {
        return false;
    }

    let hash = derive(password.as_bytes(), &salt, rounds);
    hash[..].ct_eq(&expected[..]).into()
}

/// Digest under which a refresh token is persisted
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Compare a presented refresh token with its stored digest
pub fn verify_token(token: &str, stored_hash: &str) -> bool {
    hash_token(token).as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

fn derive(password: &[u8], salt: &[u8], rounds: u32) -> [u8; HASH_LEN] {
    let mut hash = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut hash);
    hash
}
