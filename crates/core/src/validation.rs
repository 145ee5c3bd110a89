//! Nickname and chat message validation
//!
//! Both accept Latin and Cyrillic letters, ASCII digits, space, hyphen and
//! underscore. Nicknames are additionally bounded by [`MAX_NICKNAME_LEN`].

/// Maximum nickname length, in characters
pub const MAX_NICKNAME_LEN: usize = 16;

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
        || matches!(c, ' ' | '-' | '_')
}

/// Check that a chat message only uses the allowed character set
pub fn is_valid_message(message: &str) -> bool {
    message.chars().all(is_allowed_char)
}

/// Check a nickname: allowed characters, non-empty and at most
/// [`MAX_NICKNAME_LEN`] characters long
pub fn is_valid_nickname(nickname: &str) -> bool {
    let len = nickname.chars().count();
    len > 0 && len <= MAX_NICKNAME_LEN && is_valid_message(nickname)
}
