// File: doxguard-core/src/validators.rs
//! Programmatic validation functions for specific sensitive data types.
//!
//! This module provides additional validation logic beyond regular expression matching
//! for numbers such as SSNs and payment cards. These checks keep the pattern catalog
//! from over-firing on arbitrary digit runs that merely look like personal data.
//!
//! License: MIT OR APACHE 2.0

/// Helper function to validate SSN based on US Social Security Administration rules.
///
/// Accepts the `XXX-XX-XXXX` and `XXX XX XXXX` layouts. The structural components are
/// checked against the known-invalid ranges (area 000, 666 and 900-999, group 00,
/// serial 0000).
pub fn is_valid_ssn_programmatically(ssn: &str) -> bool {
    let mut parts = ssn.split(|c| c == '-' || c == ' ');

    let (Some(area), Some(group), Some(serial), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    if area.len() != 3 || group.len() != 2 || serial.len() != 4 {
        return false;
    }

    let Some(area_num) = area.parse::<u16>().ok() else { return false; };
    let Some(group_num) = group.parse::<u8>().ok() else { return false; };
    let Some(serial_num) = serial.parse::<u16>().ok() else { return false; };

    let invalid_area = (area_num == 0) || (area_num == 666) || (area_num >= 900);
    let invalid_group = group_num == 0;
    let invalid_serial = serial_num == 0;

    !(invalid_area || invalid_group || invalid_serial)
}

/// Validates a number using the Luhn algorithm.
///
/// # Arguments
///
/// * `num_str` - A string slice containing only digits.
///
/// # Returns
///
/// `true` if the number is valid according to the Luhn algorithm, `false` otherwise.
pub fn is_valid_luhn(num_str: &str) -> bool {
    let mut sum = 0;
    let mut alternate = false;

    for c in num_str.chars().rev() {
        let Some(mut digit) = c.to_digit(10) else { return false; };

        if alternate {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        alternate = !alternate;
    }

    sum % 10 == 0
}

/// Validates a payment card number: 13 to 19 digits after separators are stripped,
/// passing the Luhn checksum.
pub fn is_valid_credit_card_programmatically(cc_number: &str) -> bool {
    let digits: String = cc_number.chars().filter(|c| c.is_ascii_digit()).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    is_valid_luhn(&digits)
}

/// Rejects phone candidates whose digits are all identical (`000-000-0000`,
/// `5555555555`), which show up constantly in chat as placeholders.
pub fn is_plausible_phone_number(phone: &str) -> bool {
    let mut digits = phone.chars().filter(|c| c.is_ascii_digit());
    let Some(first) = digits.next() else { return false; };
    digits.any(|d| d != first)
}
