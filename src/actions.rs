/// The closed set of operations a command can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Navigate,
    Click,
    Fill,
    Screenshot,
    Content,
    Text,
    Eval,
    Wait,
    Select,
    Check,
    Uncheck,
    Hover,
    Press,
    Url,
    Title,
    Cookies,
    Close,
}

/// Dispatch table mapping action names (including aliases) to operations.
pub const ACTIONS: &[(&str, Action)] = &[
    ("navigate", Action::Navigate),
    ("goto", Action::Navigate),
    ("click", Action::Click),
    ("fill", Action::Fill),
    ("type", Action::Fill),
    ("screenshot", Action::Screenshot),
    ("ss", Action::Screenshot),
    ("content", Action::Content),
    ("html", Action::Content),
    ("text", Action::Text),
    ("eval", Action::Eval),
    ("evaluate", Action::Eval),
    ("wait", Action::Wait),
    ("select", Action::Select),
    ("check", Action::Check),
    ("uncheck", Action::Uncheck),
    ("hover", Action::Hover),
    ("press", Action::Press),
    ("url", Action::Url),
    ("title", Action::Title),
    ("cookies", Action::Cookies),
    ("close", Action::Close),
    ("quit", Action::Close),
    ("exit", Action::Close),
];

/// Resolve an action name against the dispatch table.
pub fn resolve(name: &str) -> Option<Action> {
    ACTIONS
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, action)| *action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_resolve() {
        assert_eq!(resolve("navigate"), Some(Action::Navigate));
        assert_eq!(resolve("click"), Some(Action::Click));
        assert_eq!(resolve("screenshot"), Some(Action::Screenshot));
        assert_eq!(resolve("wait"), Some(Action::Wait));
        assert_eq!(resolve("close"), Some(Action::Close));
    }

    #[test]
    fn aliases_resolve_to_the_same_action() {
        assert_eq!(resolve("goto"), Some(Action::Navigate));
        assert_eq!(resolve("type"), Some(Action::Fill));
        assert_eq!(resolve("ss"), Some(Action::Screenshot));
        assert_eq!(resolve("html"), Some(Action::Content));
        assert_eq!(resolve("evaluate"), Some(Action::Eval));
        assert_eq!(resolve("quit"), Some(Action::Close));
        assert_eq!(resolve("exit"), Some(Action::Close));
    }

    #[test]
    fn unknown_action_does_not_resolve() {
        assert_eq!(resolve("teleport"), None);
        assert_eq!(resolve(""), None);
        // Matching is case-sensitive, like the table.
        assert_eq!(resolve("Navigate"), None);
    }

    #[test]
    fn table_has_no_duplicate_aliases() {
        for (i, (name, _)) in ACTIONS.iter().enumerate() {
            assert!(
                !ACTIONS[i + 1..].iter().any(|(other, _)| other == name),
                "duplicate alias: {name}"
            );
        }
    }
}
