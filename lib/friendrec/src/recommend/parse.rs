use crate::error::ParseError;
use crate::recommend::record::UserId;

/// One line of the edge list: a user and its direct friends in input order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeLine {
    pub user: UserId,
    pub friends: Vec<UserId>,
}

/// Parses `<user>\t<friend>,<friend>,...`.
///
/// A missing friend field yields an empty friend list. Empty tokens in the
/// friend list are skipped. Trailing empty fields are dropped; a line that still
/// has more than two tab-separated fields is treated as having no friend field.
/// Any unparseable id rejects the whole line.
pub fn parse_line(line: &str) -> Result<EdgeLine, ParseError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut fields: Vec<&str> = line.split('\t').collect();
    while fields.len() > 1 && fields.last() == Some(&"") {
        fields.pop();
    }

    let user = fields[0].parse::<UserId>().map_err(|source| ParseError::InvalidUser {
        line: line.to_string(),
        source,
    })?;

    let mut friends = Vec::new();
    if fields.len() == 2 {
        for token in fields[1].split(',').filter(|t| !t.is_empty()) {
            let friend = token.parse::<UserId>().map_err(|source| ParseError::InvalidFriend {
                line: line.to_string(),
                token: token.to_string(),
                source,
            })?;
            friends.push(friend);
        }
    }

    Ok(EdgeLine { user, friends })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_and_friends_in_order() {
        let parsed = parse_line("7\t3,1,2").unwrap();
        assert_eq!(parsed, EdgeLine { user: 7, friends: vec![3, 1, 2] });
    }

    #[test]
    fn missing_friend_field_is_empty() {
        assert_eq!(parse_line("42").unwrap().friends, Vec::<UserId>::new());
        assert_eq!(parse_line("42\t").unwrap().friends, Vec::<UserId>::new());
        assert_eq!(parse_line("42\r\n").unwrap().user, 42);
    }

    #[test]
    fn empty_tokens_are_skipped() {
        assert_eq!(parse_line("1\t2,,3,").unwrap().friends, vec![2, 3]);
    }

    #[test]
    fn extra_fields_drop_friend_list() {
        let parsed = parse_line("1\t2,3\tjunk").unwrap();
        assert_eq!(parsed.user, 1);
        assert!(parsed.friends.is_empty());
    }

    #[test]
    fn trailing_tabs_keep_friend_list() {
        assert_eq!(parse_line("1\t2,3\t").unwrap().friends, vec![2, 3]);
        assert_eq!(parse_line("1\t2,3\t\t\r\n").unwrap().friends, vec![2, 3]);
        assert_eq!(parse_line("1\t\t").unwrap().friends, Vec::<UserId>::new());
    }

    #[test]
    fn bad_user_is_rejected() {
        let err = parse_line("abc\t1,2").unwrap_err();
        assert!(matches!(err, ParseError::InvalidUser { .. }));
    }

    #[test]
    fn one_bad_friend_rejects_whole_line() {
        match parse_line("1\t2,x3,4").unwrap_err() {
            ParseError::InvalidFriend { token, .. } => assert_eq!(token, "x3"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn negative_and_large_ids_parse() {
        let parsed = parse_line("-5\t9223372036854775807").unwrap();
        assert_eq!(parsed.user, -5);
        assert_eq!(parsed.friends, vec![i64::MAX]);
    }
}
