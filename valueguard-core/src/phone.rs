//! Phone-number normalization and the identifiers derived from it.

pub const LOGIN_EMAIL_DOMAIN: &str = "valueguard.local";

/// Strips whitespace and hyphens. `+` and digits are kept as-is.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

pub fn phone_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Synthetic login email for accounts that signed up without one.
pub fn login_email_for(phone: &str) -> String {
    format!("phone-{}@{LOGIN_EMAIL_DOMAIN}", phone_digits(phone))
}

pub fn default_display_name(phone: &str) -> String {
    let normalized = normalize_phone(phone);
    let chars: Vec<char> = normalized.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("用户{tail}")
}

pub fn avatar_url(uid: &str) -> String {
    format!("https://i.pravatar.cc/150?u={uid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent_and_ignores_formatting() {
        let a = normalize_phone("+86 138-1234-5678");
        let b = normalize_phone("+8613812345678");
        assert_eq!(a, b);
        assert_eq!(normalize_phone(&a), a);
        assert_eq!(phone_digits(&a), phone_digits(&b));
    }

    #[test]
    fn login_email_is_deterministic() {
        assert_eq!(
            login_email_for("+86 138-1234-5678"),
            "phone-8613812345678@valueguard.local"
        );
        assert_eq!(
            login_email_for("+86 138-1234-5678"),
            login_email_for("+8613812345678")
        );
    }

    #[test]
    fn display_name_uses_last_four() {
        assert_eq!(default_display_name("+86 138-1234-5678"), "用户5678");
        assert_eq!(default_display_name("12"), "用户12");
    }
}
