use serde::{Deserialize, Serialize};

const MIN_PHONE_DIGITS: usize = 10;

/// Profile handed to us by the identity provider. The id is trusted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
}

impl User {
    pub fn display_name_or_anonymous(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Anonymous")
    }

    /// Returns the phone on file when it passes [`validate_phone_number`].
    pub fn verified_phone(&self) -> Option<&str> {
        self.phone_number
            .as_deref()
            .filter(|phone| validate_phone_number(phone).is_ok())
    }
}

pub fn validate_phone_number(phone: &str) -> Result<(), String> {
    if phone.len() < MIN_PHONE_DIGITS {
        return Err(format!(
            "Phone number must be at least {} digits",
            MIN_PHONE_DIGITS
        ));
    }
    if !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err("Phone number must contain only digits".to_string());
    }
    Ok(())
}
