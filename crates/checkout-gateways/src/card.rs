//! Card shape checks shared by the card-network providers.

use chrono::{Datelike, NaiveDate};

use checkout_core::PaymentData;

/// Luhn checksum over ASCII digits
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// 12-19 digits passing Luhn
pub fn valid_card_number(digits: &str) -> bool {
    (12..=19).contains(&digits.len()) && luhn_valid(digits)
}

/// Parse `MM/YY` or `MM/YYYY` into (month, four-digit year)
pub fn parse_expiry(expiry: &str) -> Option<(u32, i32)> {
    let (month, year) = expiry.trim().split_once('/')?;
    let month: u32 = month.trim().parse().ok()?;
    let year = year.trim();
    let year: i32 = match year.len() {
        2 => 2000 + year.parse::<i32>().ok()?,
        4 => year.parse().ok()?,
        _ => return None,
    };
    (1..=12).contains(&month).then_some((month, year))
}

/// A card is usable through the last day of its expiry month
pub fn expiry_valid(expiry: &str, today: NaiveDate) -> bool {
    parse_expiry(expiry).is_some_and(|(month, year)| {
        (year, month) >= (today.year(), today.month())
    })
}

pub fn cvv_valid(cvv: &str) -> bool {
    (3..=4).contains(&cvv.len()) && cvv.bytes().all(|b| b.is_ascii_digit())
}

/// Card number, expiry and CVV all present and well-formed
pub fn card_fields_valid(data: &PaymentData, today: NaiveDate) -> bool {
    let (Some(number), Some(expiry), Some(cvv)) =
        (data.card_digits(), data.expiry.as_deref(), data.cvv.as_deref())
    else {
        return false;
    };
    valid_card_number(&number) && expiry_valid(expiry, today) && cvv_valid(cvv.trim())
}

/// Card-like providers accept either well-formed card fields or a stored token
pub fn card_payload_valid(data: &PaymentData, today: NaiveDate) -> bool {
    if data.has_card_fields() {
        card_fields_valid(data, today)
    } else {
        data.has_token()
    }
}

/// Network brand from the leading digits
pub fn card_brand(digits: &str) -> &'static str {
    let prefix = |n: usize| digits.get(..n).and_then(|p| p.parse::<u32>().ok());
    match (prefix(1), prefix(2), prefix(4)) {
        (Some(4), _, _) => "visa",
        (_, Some(34 | 37), _) => "amex",
        (_, Some(51..=55), _) | (_, _, Some(2221..=2720)) => "mastercard",
        (_, _, Some(3528..=3589)) => "jcb",
        _ => "card",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4242424242424242"));
        assert!(luhn_valid("4000000000000002"));
        assert!(luhn_valid("5555555555554444"));
        assert!(!luhn_valid("4242424242424241"));
        assert!(!luhn_valid("4242x24242424242"));
        assert!(!luhn_valid(""));
    }

    #[test]
    fn test_card_number_length() {
        assert!(!valid_card_number("0"));
        assert!(valid_card_number("378282246310005"));
        assert!(!valid_card_number("42424242424242424242"));
    }

    #[test]
    fn test_expiry() {
        assert_eq!(parse_expiry("07/29"), Some((7, 2029)));
        assert_eq!(parse_expiry("7/2029"), Some((7, 2029)));
        assert_eq!(parse_expiry("13/29"), None);
        assert_eq!(parse_expiry("0729"), None);

        assert!(expiry_valid("10/26", today()));
        assert!(!expiry_valid("09/26", today()));
        assert!(expiry_valid("01/2027", today()));
    }

    #[test]
    fn test_cvv() {
        assert!(cvv_valid("123"));
        assert!(cvv_valid("1234"));
        assert!(!cvv_valid("12"));
        assert!(!cvv_valid("12a"));
    }

    #[test]
    fn test_payload_rules() {
        let card = PaymentData::card("4242 4242 4242 4242", "12/30", "123");
        assert!(card_payload_valid(&card, today()));

        let mut partial = card.clone();
        partial.cvv = None;
        assert!(!card_payload_valid(&partial, today()));

        let token = PaymentData {
            token: Some("pm_card_visa".into()),
            ..Default::default()
        };
        assert!(card_payload_valid(&token, today()));

        assert!(!card_payload_valid(&PaymentData::wallet("a@b.co", ""), today()));
    }

    #[test]
    fn test_brand() {
        assert_eq!(card_brand("4242424242424242"), "visa");
        assert_eq!(card_brand("5555555555554444"), "mastercard");
        assert_eq!(card_brand("2223003122003222"), "mastercard");
        assert_eq!(card_brand("378282246310005"), "amex");
        assert_eq!(card_brand("6011111111111117"), "card");
    }
}
