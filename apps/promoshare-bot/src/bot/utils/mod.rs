pub mod channel_check;

/// Normalize an admin-entered chat handle into a clickable URL.
pub fn make_chat_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    if let Some(rest) = raw.strip_prefix("t.me/") {
        return format!("https://t.me/{}", rest);
    }
    if let Some(rest) = raw.strip_prefix('@') {
        return format!("https://t.me/{}", rest);
    }
    format!("https://t.me/{}", raw)
}

/// Pull a referrer id out of a /start deep link. Accepts `ref_<id>` or a
/// bare integer; anything else means no referrer.
pub fn parse_start_param(text: &str) -> Option<i64> {
    if !text.starts_with("/start") {
        return None;
    }
    let param = text.split_whitespace().nth(1)?;
    let digits = param.strip_prefix("ref_").unwrap_or(param);
    digits.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_urls_are_normalized() {
        assert_eq!(make_chat_url("@scooters"), "https://t.me/scooters");
        assert_eq!(make_chat_url("t.me/scooters"), "https://t.me/scooters");
        assert_eq!(
            make_chat_url("https://t.me/scooters"),
            "https://t.me/scooters"
        );
        assert_eq!(make_chat_url(" scooters "), "https://t.me/scooters");
    }

    #[test]
    fn start_param_accepts_both_shapes() {
        assert_eq!(parse_start_param("/start ref_123"), Some(123));
        assert_eq!(parse_start_param("/start 456"), Some(456));
        assert_eq!(parse_start_param("/start"), None);
        assert_eq!(parse_start_param("/start ref_abc"), None);
        assert_eq!(parse_start_param("/start junk"), None);
        assert_eq!(parse_start_param("hello"), None);
    }
}
