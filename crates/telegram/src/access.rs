use crate::config::BotConfig;

/// Decide whether an inbound message should be processed.
///
/// The allowlist holds numeric user ids and usernames (with or without a
/// leading `@`). An empty allowlist means the bot is open to everyone.
pub fn is_allowed(config: &BotConfig, user_id: i64, username: Option<&str>) -> bool {
    if config.allowlist.is_empty() {
        return true;
    }
    let id_text = user_id.to_string();
    config.allowlist.iter().any(|entry| {
        let entry = entry.trim_start_matches('@');
        if entry == id_text {
            return true;
        }
        username.is_some_and(|u| u.eq_ignore_ascii_case(entry))
    })
}
