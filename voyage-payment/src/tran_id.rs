use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;
use voyage_core::ReservationError;

/// Fewest unique characters a transaction id may keep after truncation.
pub const MIN_SUFFIX_LEN: usize = 4;

const RANDOM_LEN: usize = 8;

/// Caller-meaningful part of a transaction id: `BK` plus the head of the booking id.
pub fn booking_prefix(booking_id: &Uuid) -> String {
    let simple = booking_id.simple().to_string();
    format!("BK{}", simple[..8].to_ascii_uppercase())
}

/// Random characters first, then the millisecond clock in base 36, so that
/// truncation from the right drops the least unique characters.
pub fn unique_suffix() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_LEN)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("{}{}", random, to_base36(chrono::Utc::now().timestamp_millis() as u64))
}

/// Join prefix and suffix under the provider's length cap. Only the suffix is ever cut.
pub fn compose_tran_id(prefix: &str, suffix: &str, max_len: usize) -> Result<String, ReservationError> {
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(ReservationError::Validation(format!(
            "transaction id prefix must be ASCII alphanumeric: {:?}",
            prefix
        )));
    }
    if !suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(ReservationError::Validation(format!(
            "transaction id suffix must be ASCII alphanumeric: {:?}",
            suffix
        )));
    }

    let room = max_len.saturating_sub(prefix.len());
    if room < MIN_SUFFIX_LEN || suffix.len() < MIN_SUFFIX_LEN {
        return Err(ReservationError::Validation(format!(
            "transaction id prefix {:?} leaves no room for a unique suffix within {} characters",
            prefix, max_len
        )));
    }

    let keep = room.min(suffix.len());
    Ok(format!("{}{}", prefix, &suffix[..keep]))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
