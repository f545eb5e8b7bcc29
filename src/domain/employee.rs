use rand::Rng;

const EMPLOYEE_NUMBER_PREFIX: &str = "EMP";
pub const FIRST_EMPLOYEE_NUMBER: &str = "EMP001";
/// Generated numbers stay within a Postgres bigint.
pub const MAX_EMPLOYEE_NUMBER_DIGITS: usize = 18;
const MAX_EMPLOYEE_NUMBER_LEN: usize = 32;

/// PINs are 4 to 6 ASCII digits.
pub fn is_valid_pin(pin: &str) -> bool {
    (4..=6).contains(&pin.len()) && pin.chars().all(|c| c.is_ascii_digit())
}

fn sequence_digits(number: &str) -> Option<&str> {
    number
        .strip_prefix(EMPLOYEE_NUMBER_PREFIX)
        .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Manually assigned numbers: up to 32 ASCII letters, digits, `-` or `_`.
/// An EMP### number may carry at most 18 digits.
pub fn is_valid_employee_number(number: &str) -> bool {
    let well_formed = (1..=MAX_EMPLOYEE_NUMBER_LEN).contains(&number.len())
        && number.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    well_formed && sequence_digits(number).map_or(true, |digits| digits.len() <= MAX_EMPLOYEE_NUMBER_DIGITS)
}

/// Next sequential employee number after `last`, zero-padded to three
/// digits. Falls back to the first number when `last` is absent, does not
/// follow the EMP### pattern, or cannot be incremented.
pub fn next_employee_number(last: Option<&str>) -> String {
    let next = last
        .and_then(|n| sequence_digits(n.trim()))
        .filter(|digits| digits.len() <= MAX_EMPLOYEE_NUMBER_DIGITS)
        .and_then(|digits| digits.parse::<u64>().ok())
        .and_then(|n| n.checked_add(1));

    match next {
        Some(n) => format!("{}{:03}", EMPLOYEE_NUMBER_PREFIX, n),
        None => FIRST_EMPLOYEE_NUMBER.to_string(),
    }
}

/// Random 4-digit PIN candidate. Uniqueness is checked by the caller.
pub fn generate_pin_candidate<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:04}", rng.gen_range(0..10_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_pin_validation() {
        assert!(is_valid_pin("1234"));
        assert!(is_valid_pin("123456"));
        assert!(!is_valid_pin("123"));
        assert!(!is_valid_pin("1234567"));
        assert!(!is_valid_pin("12a4"));
        assert!(!is_valid_pin(" 1234"));
        assert!(!is_valid_pin("１２３４"));
    }

    #[test]
    fn test_first_employee_number() {
        assert_eq!(next_employee_number(None), "EMP001");
    }

    #[test]
    fn test_next_employee_number() {
        assert_eq!(next_employee_number(Some("EMP007")), "EMP008");
        assert_eq!(next_employee_number(Some("EMP099")), "EMP100");
        assert_eq!(next_employee_number(Some("EMP999")), "EMP1000");
    }

    #[test]
    fn test_malformed_last_number_falls_back() {
        assert_eq!(next_employee_number(Some("TECH12")), "EMP001");
        assert_eq!(next_employee_number(Some("EMP")), "EMP001");
        assert_eq!(next_employee_number(Some("EMP-3")), "EMP001");
    }

    #[test]
    fn test_oversized_last_number_falls_back() {
        assert_eq!(next_employee_number(Some("EMP18446744073709551615")), "EMP001");
        assert_eq!(next_employee_number(Some("EMP99999999999999999999")), "EMP001");
        assert_eq!(
            next_employee_number(Some("EMP999999999999999998")),
            "EMP999999999999999999"
        );
    }

    #[test]
    fn test_manual_employee_number_validation() {
        assert!(is_valid_employee_number("EMP042"));
        assert!(is_valid_employee_number("TECH-12"));
        assert!(is_valid_employee_number("EMP999999999999999999"));
        assert!(!is_valid_employee_number("EMP9999999999999999999"));
        assert!(!is_valid_employee_number(""));
        assert!(!is_valid_employee_number("EMP 042"));
        assert!(!is_valid_employee_number(&"A".repeat(33)));
    }

    #[test]
    fn test_generated_pins_are_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(is_valid_pin(&generate_pin_candidate(&mut rng)));
        }
    }
}
