//! Time-based one-time passwords (RFC 6238) for two-factor sign-in.
//!
//! HMAC-SHA1, 30 second steps, 6 digits: the parameters every authenticator
//! app supports by default. Secrets travel as unpadded RFC 4648 base32.

use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

pub const STEP_SECS: u64 = 30;
pub const DIGITS: u32 = 6;
const SECRET_LEN: usize = 20;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TotpError {
    #[error("invalid base32 secret")]
    InvalidSecret,
}

/// Generate a fresh 160-bit secret, base32 encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    base32_encode(&bytes)
}

/// The code for `unix_time`.
pub fn code_at(secret: &str, unix_time: u64) -> Result<String, TotpError> {
    let key = base32_decode(secret)?;
    Ok(hotp(&key, unix_time / STEP_SECS))
}

/// Check `code` against the window `[-skew, +skew]` steps around `unix_time`.
///
/// Anything that is not exactly six ASCII digits is simply not a match.
pub fn verify(secret: &str, code: &str, unix_time: u64, skew: u64) -> Result<bool, TotpError> {
    Ok(matching_step(secret, code, unix_time, skew)?.is_some())
}

/// The time step `code` belongs to, if it falls inside the skew window.
///
/// Callers persist the returned step to refuse replays of the same code.
pub fn matching_step(
    secret: &str,
    code: &str,
    unix_time: u64,
    skew: u64,
) -> Result<Option<u64>, TotpError> {
    let key = base32_decode(secret)?;
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }

    let counter = unix_time / STEP_SECS;
    let first = counter.saturating_sub(skew);
    let last = counter.saturating_add(skew);
    Ok((first..=last).find(|&c| constant_time_eq(hotp(&key, c).as_bytes(), code.as_bytes())))
}

/// `otpauth://` URI understood by authenticator apps (rendered as a QR code).
pub fn provisioning_uri(issuer: &str, account: &str, secret: &str) -> String {
    let issuer_enc = urlencoding::encode(issuer);
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        issuer_enc,
        urlencoding::encode(account),
        secret,
        issuer_enc,
        DIGITS,
        STEP_SECS
    )
}

/// One-shot recovery codes (8 upper-case alphanumerics each).
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            (0..8)
                .map(|_| (rng.sample(Alphanumeric) as char).to_ascii_uppercase())
                .collect()
        })
        .collect()
}

fn hotp(key: &[u8], counter: u64) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha1::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    format!("{:0width$}", binary % 10u32.pow(DIGITS), width = DIGITS as usize)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            let idx = (buffer >> (bits - 5)) & 0x1f;
            out.push(BASE32_ALPHABET[idx as usize] as char);
            bits -= 5;
        }
    }
    if bits > 0 {
        let idx = (buffer << (5 - bits)) & 0x1f;
        out.push(BASE32_ALPHABET[idx as usize] as char);
    }
    out
}

fn base32_decode(input: &str) -> Result<Vec<u8>, TotpError> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    let mut seen = 0usize;
    for c in input.chars() {
        if c == '=' || c == ' ' || c == '-' {
            continue;
        }
        let upper = c.to_ascii_uppercase() as u8;
        let value = BASE32_ALPHABET
            .iter()
            .position(|&a| a == upper)
            .ok_or(TotpError::InvalidSecret)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        seen += 1;
        if bits >= 8 {
            out.push((buffer >> (bits - 8)) as u8);
            bits -= 8;
        }
    }
    if seen == 0 {
        return Err(TotpError::InvalidSecret);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B seed for SHA1: ASCII "12345678901234567890".
    fn rfc_secret() -> String {
        base32_encode(b"12345678901234567890")
    }

    #[test]
    fn base32_matches_rfc4648_vectors() {
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
        assert_eq!(base32_decode("MZXW6YTBOI").unwrap(), b"foobar");
        assert_eq!(base32_decode("mzxw6ytboi======").unwrap(), b"foobar");
    }

    #[test]
    fn rfc6238_reference_codes() {
        let secret = rfc_secret();
        assert_eq!(code_at(&secret, 59).unwrap(), "287082");
        assert_eq!(code_at(&secret, 1_111_111_109).unwrap(), "081804");
        assert_eq!(code_at(&secret, 1_234_567_890).unwrap(), "005924");
        assert_eq!(code_at(&secret, 2_000_000_000).unwrap(), "279037");
    }

    #[test]
    fn verify_accepts_neighbouring_steps_only_within_skew() {
        let secret = rfc_secret();
        let code = code_at(&secret, 1_111_111_109).unwrap();
        assert!(verify(&secret, &code, 1_111_111_109 + STEP_SECS, 1).unwrap());
        assert!(!verify(&secret, &code, 1_111_111_109 + 3 * STEP_SECS, 1).unwrap());
    }

    #[test]
    fn matching_step_reports_the_code_step() {
        let secret = rfc_secret();
        let step = 1_111_111_109 / STEP_SECS;
        let code = code_at(&secret, 1_111_111_109).unwrap();
        assert_eq!(
            matching_step(&secret, &code, 1_111_111_109 + STEP_SECS, 1).unwrap(),
            Some(step)
        );
        assert_eq!(matching_step(&secret, "12345a", 1_111_111_109, 1).unwrap(), None);
    }

    #[test]
    fn malformed_codes_never_match() {
        let secret = rfc_secret();
        assert!(!verify(&secret, "12345", 59, 1).unwrap());
        assert!(!verify(&secret, "abcdef", 59, 1).unwrap());
        assert!(!verify(&secret, "", 59, 1).unwrap());
    }

    #[test]
    fn invalid_secret_is_an_error() {
        assert_eq!(code_at("not base32!", 0), Err(TotpError::InvalidSecret));
        assert_eq!(code_at("", 0), Err(TotpError::InvalidSecret));
    }

    #[test]
    fn generated_secret_round_trips() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert_eq!(base32_decode(&secret).unwrap().len(), SECRET_LEN);
        let code = code_at(&secret, 1_700_000_000).unwrap();
        assert!(verify(&secret, &code, 1_700_000_000, 0).unwrap());
    }

    #[test]
    fn provisioning_uri_escapes_labels() {
        let uri = provisioning_uri("Agency Hub", "a@b.co", "ABC");
        assert!(uri.starts_with("otpauth://totp/Agency%20Hub:a%40b.co?secret=ABC"));
        assert!(uri.contains("digits=6"));
    }

    #[test]
    fn backup_codes_shape() {
        let codes = generate_backup_codes(10);
        assert_eq!(codes.len(), 10);
        for c in codes {
            assert_eq!(c.len(), 8);
            assert!(c.chars().all(|ch| ch.is_ascii_digit() || ch.is_ascii_uppercase()));
        }
    }
}
