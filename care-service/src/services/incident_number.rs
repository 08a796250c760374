//! Human-readable incident report numbers: `{T}IR{HH}{NNNN}{C}`.
//!
//! `T` is the incident type code, `HH` the home's sequence number and `NNNN`
//! the per-home incident sequence (both base 36, zero padded to a minimum
//! width and longer once a value outgrows it), and `C` a Luhn mod 36 check
//! character computed over everything before it.

use thiserror::Error;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const HOME_WIDTH: usize = 2;
const SEQUENCE_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentType {
    Fall,
    Medication,
    Behavioral,
    Medical,
    Injury,
    Elopement,
    Other,
}

impl IncidentType {
    pub fn code(&self) -> char {
        match self {
            IncidentType::Fall => 'F',
            IncidentType::Medication => 'M',
            IncidentType::Behavioral => 'B',
            IncidentType::Medical => 'X',
            IncidentType::Injury => 'I',
            IncidentType::Elopement => 'E',
            IncidentType::Other => 'O',
        }
    }
}

impl std::str::FromStr for IncidentType {
    type Err = IncidentNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Fall" => Ok(IncidentType::Fall),
            "Medication" => Ok(IncidentType::Medication),
            "Behavioral" => Ok(IncidentType::Behavioral),
            "Medical" => Ok(IncidentType::Medical),
            "Injury" => Ok(IncidentType::Injury),
            "Elopement" => Ok(IncidentType::Elopement),
            "Other" => Ok(IncidentType::Other),
            other => Err(IncidentNumberError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IncidentNumberError {
    #[error("unknown incident type: {0}")]
    UnknownType(String),
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: i64 },
}

fn to_base36(mut value: u64, width: usize) -> String {
    let mut digits = Vec::with_capacity(width);
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    while digits.len() < width {
        digits.push(b'0');
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

fn encode_field(field: &'static str, value: i64, width: usize) -> Result<String, IncidentNumberError> {
    let value = u64::try_from(value).map_err(|_| IncidentNumberError::Negative { field, value })?;
    Ok(to_base36(value, width))
}

fn code_point(c: char) -> Option<u32> {
    c.to_ascii_uppercase().to_digit(36)
}

/// Luhn mod 36 check character. `None` if `input` has a non-alphanumeric char.
pub fn luhn_mod36(input: &str) -> Option<char> {
    let mut sum = 0u32;
    let mut factor = 2u32;

    for c in input.chars().rev() {
        let addend = factor * code_point(c)?;
        sum += addend / 36 + addend % 36;
        factor = if factor == 2 { 1 } else { 2 };
    }

    let check = (36 - sum % 36) % 36;
    Some(ALPHABET[check as usize] as char)
}

pub fn generate(
    incident_type: IncidentType,
    home_sequence: i64,
    incident_sequence: i64,
) -> Result<String, IncidentNumberError> {
    let home = encode_field("home sequence", home_sequence, HOME_WIDTH)?;
    let sequence = encode_field("incident sequence", incident_sequence, SEQUENCE_WIDTH)?;
    let body = format!("{}IR{}{}", incident_type.code(), home, sequence);
    // body is alphanumeric by construction
    let check = luhn_mod36(&body).unwrap_or('0');
    Ok(format!("{}{}", body, check))
}

const TYPE_CODES: &str = "FMBXIEO";

/// Structural and checksum validation. Widened fields are accepted.
pub fn is_valid(number: &str) -> bool {
    let min_len = 1 + 2 + HOME_WIDTH + SEQUENCE_WIDTH + 1;
    if number.len() < min_len || !number.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return false;
    }
    if !number.starts_with(|c| TYPE_CODES.contains(c)) || &number[1..3] != "IR" {
        return false;
    }
    let (body, check) = number.split_at(number.len() - 1);
    luhn_mod36(body).is_some_and(|c| check.starts_with(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_known_numbers() {
        assert_eq!(generate(IncidentType::Fall, 1, 1).unwrap(), "FIR0100011");
        assert_eq!(generate(IncidentType::Medication, 1, 36).unwrap(), "MIR010010N");
        assert_eq!(generate(IncidentType::Medical, 37, 1295).unwrap(), "XIR1100ZZ3");
        assert_eq!(generate(IncidentType::Other, 10, 46655).unwrap(), "OIR0A0ZZZ5");
    }

    #[test]
    fn generated_numbers_validate() {
        let number = generate(IncidentType::Elopement, 5, 123).unwrap();
        assert!(is_valid(&number));
    }

    #[test]
    fn single_character_typo_is_detected() {
        let number = generate(IncidentType::Behavioral, 3, 77).unwrap();
        let mut chars: Vec<char> = number.chars().collect();
        chars[5] = if chars[5] == '1' { '2' } else { '1' };
        let typo: String = chars.into_iter().collect();
        assert!(!is_valid(&typo));
    }

    #[test]
    fn large_sequences_widen_instead_of_failing() {
        let number = generate(IncidentType::Fall, 36 * 36, 1).unwrap();
        assert!(number.starts_with("FIR1000001"));
        assert_eq!(number.len(), 11);
        assert!(is_valid(&number));

        let number = generate(IncidentType::Injury, 2, 36_i64.pow(4)).unwrap();
        assert!(number.starts_with("IIR0210000"));
        assert!(is_valid(&number));
    }

    #[test]
    fn rejects_negative_sequences() {
        assert_eq!(
            generate(IncidentType::Fall, -1, 1),
            Err(IncidentNumberError::Negative {
                field: "home sequence",
                value: -1
            })
        );
        assert!(generate(IncidentType::Fall, 1, -5).is_err());
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(!is_valid("FIR010001"));
        assert!(!is_valid("QIR0100011"));
        assert!(!is_valid("FXR0100011"));
        assert!(!is_valid("FIR01-0011"));
    }

    #[test]
    fn parses_type_names() {
        assert_eq!("Medical".parse::<IncidentType>(), Ok(IncidentType::Medical));
        assert!("Flood".parse::<IncidentType>().is_err());
    }
}
