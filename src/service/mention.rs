//! @-mention extraction

/// Characters that end a mention besides whitespace
const TERMINATORS: [char; 6] = [',', '.', '!', '?', '"', ')'];

fn ends_mention(ch: char) -> bool {
    ch.is_whitespace() || TERMINATORS.contains(&ch)
}

/// Collect the usernames mentioned in `content`.
///
/// A mention is `@` followed by everything up to the next whitespace or
/// terminator. An `@` glued to a preceding word character (as in an e-mail
/// address) is not a mention. Names are returned once each, in order of
/// first appearance.
pub fn collect_mentions(content: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    let mut previous: Option<char> = None;
    let mut chars = content.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        let glued = previous.is_some_and(|p| p.is_alphanumeric() || p == '_');
        previous = Some(ch);

        if ch != '@' || glued {
            continue;
        }

        let start = index + ch.len_utf8();
        let mut end = start;
        while let Some(&(next_index, next)) = chars.peek() {
            if ends_mention(next) {
                break;
            }
            end = next_index + next.len_utf8();
            previous = Some(next);
            chars.next();
        }

        let name = &content[start..end];
        if !name.is_empty() && !mentions.iter().any(|m| m == name) {
            mentions.push(name.to_string());
        }
    }

    mentions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_names_in_order() {
        assert_eq!(
            collect_mentions("hello @alice and @bob!"),
            vec!["alice".to_string(), "bob".to_string()]
        );
    }

    #[test]
    fn removes_duplicates_keeping_first_position() {
        assert_eq!(
            collect_mentions("@bob @alice @bob, @alice."),
            vec!["bob".to_string(), "alice".to_string()]
        );
    }

    #[test]
    fn stops_at_punctuation() {
        assert_eq!(
            collect_mentions("(cc @carol) \"@dave\" @erin? @frank,"),
            vec![
                "carol".to_string(),
                "dave".to_string(),
                "erin".to_string(),
                "frank".to_string()
            ]
        );
    }

    #[test]
    fn ignores_email_addresses() {
        assert_eq!(collect_mentions("mail me at alice@example.com"), Vec::<String>::new());
        assert_eq!(collect_mentions("snake_@case"), Vec::<String>::new());
    }

    #[test]
    fn skips_bare_at_signs() {
        assert!(collect_mentions("@ @. @, @!").is_empty());
        assert!(collect_mentions("").is_empty());
    }

    #[test]
    fn later_at_signs_belong_to_the_name() {
        assert_eq!(collect_mentions("@alice@bob"), vec!["alice@bob".to_string()]);
        assert_eq!(collect_mentions("@@ hi"), vec!["@".to_string()]);
    }

    #[test]
    fn keeps_non_ascii_names() {
        assert_eq!(collect_mentions("hi @zoë!"), vec!["zoë".to_string()]);
    }
}
