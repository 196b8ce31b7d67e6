// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Serial and code generation plus case normalization.
//!
//! Identifiers only need to be unique, not unguessable, so a thread-local
//! PRNG is used. Uniqueness is enforced by the table's unique constraints.

use rand::Rng;

/// Alphabet for redemption codes (no `i`/`o` to avoid confusion with digits).
pub const CODE_ALPHABET: &[u8] = b"abcdefghjklmnpqrstuvwxyz0123456789";

const DIGITS: &[u8] = b"0123456789";

/// Length of a redemption code.
pub const CODE_LEN: usize = 16;

const SERIAL_PREFIX: &str = "df";
const SERIAL_SUFFIX: &str = "r";
const SERIAL_DIGITS: usize = 15;

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Generate a storage-form serial: `df` + 15 digits + `r`.
pub fn generate_serial() -> String {
    format!(
        "{}{}{}",
        SERIAL_PREFIX,
        random_string(DIGITS, SERIAL_DIGITS),
        SERIAL_SUFFIX
    )
}

/// Generate a storage-form redemption code.
pub fn generate_code() -> String {
    random_string(CODE_ALPHABET, CODE_LEN)
}

/// Storage form of a serial.
pub fn normalize_serial(serial: &str) -> String {
    serial.trim().to_lowercase()
}

/// Storage form of a code; display dashes are dropped.
pub fn normalize_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Display form of a serial or code.
pub fn display_form(value: &str) -> String {
    value.to_uppercase()
}

/// Display form of a handed-out code: upper-case, grouped by four.
pub fn grouped_code(code: &str) -> String {
    let upper = display_form(code);
    upper
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}
