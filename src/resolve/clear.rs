//! Message filtering passes.

use crate::types::{Message, Role};

/// Keep only the messages after the last `marker` message.
pub fn clear(messages: Vec<Message>, marker: &Role) -> Vec<Message> {
    match messages.iter().rposition(|message| &message.role == marker) {
        Some(index) => messages.into_iter().skip(index + 1).collect(),
        None => messages,
    }
}

/// Drop empty messages and messages whose role is `skip_role`. Reset
/// markers carry no content and are kept.
pub fn clean(messages: Vec<Message>, skip_role: &Role) -> Vec<Message> {
    messages
        .into_iter()
        .filter(|message| &message.role != skip_role)
        .filter(|message| {
            !message.is_empty() || matches!(message.role, Role::ClearTools | Role::ClearAssociations)
        })
        .collect()
}

/// Drop continuation markers.
pub fn purge(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .filter(|message| message.role != Role::PreviousResponseId)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn clear_keeps_suffix_after_last_marker() {
        let messages = parse("system: S\nclear:\nuser: A\nclear:\nuser: U", Role::User);
        let cleared = clear(messages, &Role::Clear);
        assert_eq!(cleared, vec![Message::user("U")]);
    }

    #[test]
    fn clear_without_marker_is_identity() {
        let messages = vec![Message::system("S"), Message::user("U")];
        assert_eq!(clear(messages.clone(), &Role::Clear), messages);
    }

    #[test]
    fn clean_drops_empty_and_skipped() {
        let messages = vec![
            Message::user(""),
            Message::new(Role::Skip, "ignored"),
            Message::user("kept"),
            Message::new(Role::ClearTools, ""),
        ];
        assert_eq!(
            clean(messages, &Role::Skip),
            vec![Message::user("kept"), Message::new(Role::ClearTools, "")]
        );
    }

    #[test]
    fn purge_removes_continuation_markers() {
        let messages = vec![Message::assistant("a"), Message::continuation("resp_1")];
        assert_eq!(purge(messages), vec![Message::assistant("a")]);
    }
}
