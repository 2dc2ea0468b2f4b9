//! Input validation for workflow steps
//!
//! Every check returns [`ValidationError`]; step functions turn that into a
//! re-prompt within the same state.

use chrono::{Datelike, NaiveDate};
use lazy_regex::regex_is_match;

use crate::core::error::ValidationError;

/// Upper bound for any single points or money amount typed by staff
pub const MAX_AMOUNT: i64 = 1_000_000;

/// Normalizes a phone number to `+7XXXXXXXXXX` where the digits allow it.
///
/// `8XXXXXXXXXX` and `7XXXXXXXXXX` (11 digits) and bare 10-digit numbers are
/// rewritten; anything else is returned as `+<digits>` so validation can reject it.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 11 && digits.starts_with('8') {
        format!("+7{}", &digits[1..])
    } else if digits.len() == 11 && digits.starts_with('7') {
        format!("+{}", digits)
    } else if digits.len() == 10 {
        format!("+7{}", digits)
    } else {
        format!("+{}", digits)
    }
}

/// Normalizes and validates a phone number.
pub fn validate_phone(raw: &str) -> Result<String, ValidationError> {
    let normalized = normalize_phone(raw);
    if regex_is_match!(r"^\+7\d{10}$", &normalized) {
        Ok(normalized)
    } else {
        Err(ValidationError::Phone(raw.to_string()))
    }
}

/// A full name is at least two words of letters or hyphens, 5+ characters overall.
pub fn validate_full_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let words = name.split(' ').filter(|w| !w.is_empty()).count();

    if name.chars().count() < 5 || words < 2 || !regex_is_match!(r"^[\p{L} -]+$", &name) {
        return Err(ValidationError::Name(raw.to_string()));
    }
    Ok(name)
}

/// Parses `DD.MM.YYYY`. The date must be after 1900 and strictly before `today`.
pub fn parse_birth_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let trimmed = raw.trim();
    if !regex_is_match!(r"^\d{2}\.\d{2}\.\d{4}$", trimmed) {
        return Err(ValidationError::BirthDate(raw.to_string()));
    }

    let date = NaiveDate::parse_from_str(trimmed, "%d.%m.%Y").map_err(|_| ValidationError::BirthDate(raw.to_string()))?;
    if date.year() <= 1900 || date >= today {
        return Err(ValidationError::BirthDate(raw.to_string()));
    }
    Ok(date)
}

/// Parses a strictly positive integer amount (points or money).
pub fn parse_amount(raw: &str) -> Result<i64, ValidationError> {
    match raw.trim().parse::<i64>() {
        Ok(amount) if amount > 0 && amount <= MAX_AMOUNT => Ok(amount),
        _ => Err(ValidationError::Amount(raw.to_string())),
    }
}

/// Parses the number of points a client wants to redeem; zero is allowed.
pub fn parse_points_to_redeem(raw: &str) -> Result<i64, ValidationError> {
    match raw.trim().parse::<i64>() {
        Ok(points) if (0..=MAX_AMOUNT).contains(&points) => Ok(points),
        _ => Err(ValidationError::Amount(raw.to_string())),
    }
}

/// Yes/no answer typed instead of pressing a button. `None` means "neither".
pub fn parse_confirmation(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "да" | "yes" | "y" | "+" | "ок" | "ok" | "подтвердить" => Some(true),
        "нет" | "no" | "n" | "-" | "отмена" => Some(false),
        _ => None,
    }
}
