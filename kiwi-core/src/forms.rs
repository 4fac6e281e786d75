//! HTML form payloads

use serde::{Deserialize, Deserializer};

/// Sign-in form posted to `/signin`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignInForm {
    #[serde(rename = "Username", default)]
    pub username: String,

    #[serde(rename = "Password", default)]
    pub password: String,

    #[serde(rename = "Remember", default, deserialize_with = "checkbox")]
    pub remember: bool,
}

impl SignInForm {
    /// Copy without the password, safe to echo back to the browser
    pub fn redacted(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: String::new(),
            remember: self.remember,
        }
    }
}

/// Interpret checkbox/boolean text. Unrecognised values are `false`.
pub fn parse_checkbox(value: &str) -> bool {
    match value {
        "on" => true,
        "1" | "t" | "T" | "TRUE" | "true" | "True" => true,
        _ => false,
    }
}

fn checkbox<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(parse_checkbox(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkbox_values() {
        for on in ["on", "1", "t", "T", "TRUE", "true", "True"] {
            assert!(parse_checkbox(on), "{on} should be true");
        }
        for off in ["off", "0", "f", "false", "FALSE", "", "yes"] {
            assert!(!parse_checkbox(off), "{off} should be false");
        }
    }

    #[test]
    fn test_deserialize_from_json_fields() {
        let form: SignInForm =
            serde_json::from_str(r#"{"Username":"alice","Password":"pw","Remember":"on"}"#).unwrap();
        assert_eq!(form.username, "alice");
        assert!(form.remember);

        let form: SignInForm = serde_json::from_str(r#"{"Username":"alice"}"#).unwrap();
        assert!(form.password.is_empty());
        assert!(!form.remember);
    }

    #[test]
    fn test_redacted_drops_password() {
        let form = SignInForm {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            remember: true,
        };
        let redacted = form.redacted();
        assert_eq!(redacted.username, "alice");
        assert!(redacted.password.is_empty());
        assert!(redacted.remember);
    }
}
