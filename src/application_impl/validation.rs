use crate::application_port::AuthError;
use chrono::{Datelike, NaiveDate};
use regex::Regex;

pub const MINIMUM_AGE: u32 = 18;
const MAX_EMAIL_LEN: usize = 254;

pub fn valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN
        && Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Controlled vocabulary shape for gender codes; the code itself must also
/// exist in reference data.
pub fn valid_gender_code(code: &str) -> bool {
    Regex::new(r"^[A-Z]{1,3}$").is_ok_and(|re| re.is_match(code))
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_length: 12 }
    }
}

impl PasswordPolicy {
    pub fn check(&self, password: &str) -> Result<(), AuthError> {
        let mut missing = Vec::new();
        if password.chars().count() < self.min_length {
            missing.push(format!("at least {} characters", self.min_length));
        }
        if !password.chars().any(|c| c.is_uppercase()) {
            missing.push("an uppercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_lowercase()) {
            missing.push("a lowercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            missing.push("a digit".to_string());
        }
        if !password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
        {
            missing.push("a symbol".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(format!(
                "password needs {}",
                missing.join(", ")
            )))
        }
    }
}

/// Splits on the last whitespace boundary: "Anna Maria van Dijk" gives
/// ("Anna Maria van", "Dijk").
pub fn split_full_name(full_name: &str) -> Result<(String, String), AuthError> {
    let collapsed = full_name.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.rsplit_once(' ') {
        Some((first, last)) if !first.is_empty() && !last.is_empty() => {
            Ok((first.to_string(), last.to_string()))
        }
        _ => Err(AuthError::Validation(
            "full name must contain a first and a last name".to_string(),
        )),
    }
}

pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    if date_of_birth > today {
        return None;
    }
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

pub fn check_adult(date_of_birth: NaiveDate, today: NaiveDate) -> Result<(), AuthError> {
    match age_on(date_of_birth, today) {
        Some(age) if age >= MINIMUM_AGE => Ok(()),
        Some(_) => Err(AuthError::Validation(format!(
            "must be at least {MINIMUM_AGE} years old"
        ))),
        None => Err(AuthError::Validation(
            "date of birth is in the future".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn email_shape() {
        assert!(valid_email("new@x.com"));
        assert!(!valid_email("new@x"));
        assert!(!valid_email("new x@x.com"));
        assert!(!valid_email("@x.com"));
        assert!(!valid_email(&format!("{}@x.com", "a".repeat(260))));
    }

    #[test]
    fn password_policy_lists_missing_classes() {
        let policy = PasswordPolicy::default();
        assert!(policy.check("Str0ng!Passw0rd").is_ok());

        let err = policy.check("weakpassword").unwrap_err().to_string();
        assert!(err.contains("uppercase"));
        assert!(err.contains("digit"));
        assert!(err.contains("symbol"));
        assert!(!err.contains("lowercase"));

        let err = policy.check("Sh0rt!").unwrap_err().to_string();
        assert!(err.contains("at least 12 characters"));
    }

    #[test]
    fn full_name_splits_on_last_whitespace() {
        assert_eq!(
            split_full_name("  Anna   Maria van Dijk ").unwrap(),
            ("Anna Maria van".to_string(), "Dijk".to_string())
        );
        assert_eq!(
            split_full_name("Jan Jansen").unwrap(),
            ("Jan".to_string(), "Jansen".to_string())
        );
        assert!(split_full_name("Madonna").is_err());
        assert!(split_full_name("   ").is_err());
    }

    #[test]
    fn eighteenth_birthday_is_the_boundary() {
        let today = date(2024, 6, 15);
        assert!(check_adult(date(2006, 6, 15), today).is_ok());
        assert!(check_adult(date(2006, 6, 16), today).is_err());
        assert!(check_adult(date(1950, 1, 1), today).is_ok());
        assert!(check_adult(date(2030, 1, 1), today).is_err());
    }

    #[test]
    fn leap_day_birthdays() {
        assert_eq!(age_on(date(2004, 2, 29), date(2022, 2, 28)), Some(17));
        assert_eq!(age_on(date(2004, 2, 29), date(2022, 3, 1)), Some(18));
    }

    #[test]
    fn gender_codes_follow_the_vocabulary_shape() {
        assert!(valid_gender_code("M"));
        assert!(valid_gender_code("F"));
        assert!(valid_gender_code("UNK"));
        assert!(!valid_gender_code("m"));
        assert!(!valid_gender_code("MALE"));
        assert!(!valid_gender_code(""));
    }
}
