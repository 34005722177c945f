use eli5_core::conversation::ConversationTurn;
use eli5_slack::events::SlackMessage;

/// Turns a DM history (newest first, as `conversations.history` returns it)
/// into chronological turns ending with `current`.
///
/// The newest history entry is the message being answered, so it is skipped
/// and `current` is appended in its place.
pub fn history_to_turns(history: &[SlackMessage], current: &str) -> Vec<ConversationTurn> {
    let mut turns: Vec<ConversationTurn> = history
        .iter()
        .skip(1)
        .rev()
        .filter_map(|message| {
            if message.bot_id.is_some() {
                Some(ConversationTurn::assistant(message.text.clone()))
            } else if message.subtype.is_none() {
                Some(ConversationTurn::user(message.text.clone()))
            } else {
                None
            }
        })
        .collect();

    turns.push(ConversationTurn::user(current));
    turns
}

#[cfg(test)]
mod tests {
    use eli5_core::conversation::{ConversationTurn, Role};
    use eli5_slack::events::SlackMessage;

    use super::history_to_turns;

    fn message(text: &str, bot: bool, subtype: Option<&str>) -> SlackMessage {
        SlackMessage {
            text: text.to_owned(),
            bot_id: bot.then(|| "B1".to_owned()),
            subtype: subtype.map(str::to_owned),
            ..SlackMessage::default()
        }
    }

    #[test]
    fn history_becomes_chronological_turns_with_current_last() {
        let history = vec![
            message("what about ISR?", false, None),
            message("Edge means close to users.", true, None),
            message("joined", false, Some("channel_join")),
            message("what is edge?", false, None),
        ];

        let turns = history_to_turns(&history, "what about ISR?");

        assert_eq!(
            turns,
            vec![
                ConversationTurn::user("what is edge?"),
                ConversationTurn::assistant("Edge means close to users."),
                ConversationTurn::user("what about ISR?"),
            ]
        );
    }

    #[test]
    fn empty_history_yields_only_current_message() {
        let turns = history_to_turns(&[], "hello");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
    }
}
