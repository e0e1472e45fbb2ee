//! User details for template tokens

/// The parts of a user account that templates can refer to.
///
/// Used to fill the recipient and sender tokens, see
/// [`initialize_base_tokens`](super::templates::initialize_base_tokens) and
/// [`replace_user_tokens`](super::templates::replace_user_tokens).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageUser {
    /// The user's identifier
    pub user_id: String,

    /// The user's email address
    pub email: String,

    /// The login name
    pub user_name: String,

    /// First name
    pub first_name: String,

    /// Last name, possibly empty
    pub last_name: String,

    /// Profile picture URL
    pub picture_url: Option<String>,

    /// Time zone name
    pub time_zone: String,

    /// Preferred locale, e.g. `en-US`
    pub locale: String,
}

impl MessageUser {
    /// First and last name separated by a space; just the first name when
    /// there is no last name.
    pub fn full_name(&self) -> String {
        if self.last_name.trim().is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        let mut user = MessageUser {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            ..Default::default()
        };

        assert_eq!(user.full_name(), "Ada Lovelace");

        user.last_name = " ".to_string();

        assert_eq!(user.full_name(), "Ada");
    }
}
