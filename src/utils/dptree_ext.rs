use teloxide::prelude::*;
use teloxide::types::Me;

/// Matches messages that invoke `/<cmd>`.
///
/// In groups the command may carry a mention suffix, e.g. `/start@xxxx_bot`,
/// which only matches when it names this bot.
pub fn command_filter(cmd: &'static str) -> impl Fn(Message, Me) -> bool {
    move |msg: Message, me: Me| {
        let Some(text) = msg.text() else {
            return false;
        };
        let word = text.split_whitespace().next().unwrap_or_default();

        let Some(rest) = word.strip_prefix('/').and_then(|w| w.strip_prefix(cmd)) else {
            return false;
        };
        if rest.is_empty() {
            return true;
        }

        match rest.strip_prefix('@') {
            Some(mention) => me
                .username
                .as_ref()
                .map(|name| name.eq_ignore_ascii_case(mention))
                .unwrap_or(false),
            None => false,
        }
    }
}
