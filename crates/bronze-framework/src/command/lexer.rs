//! Lexers: turn a message into the argument tokens of one command.

use regex::Regex;

use bronze_core::Message;

use crate::error::LexError;

/// Maps a message to argument tokens, or reports that it does not match.
pub trait Lexer: Send + Sync {
    /// Lexes the message content.
    fn lex(&self, msg: &Message) -> Result<Vec<String>, LexError>;

    /// Trigger tokens this lexer claims (empty for free-form matchers).
    fn triggers(&self) -> &[String];

    /// Whether triggers match ignoring ASCII case.
    fn case_insensitive(&self) -> bool {
        false
    }
}

/// Shell-like argument splitting.
///
/// Handles:
/// - whitespace-separated arguments
/// - single and double quoted strings
/// - backslash escapes inside double quotes and outside quotes
///
/// An unclosed quote or a dangling escape is [`LexError::MalformedContent`].
pub fn shell_split(input: &str) -> Result<Vec<String>, LexError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if !in_single_quote => {
                escape_next = true;
                in_token = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                in_token = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                in_token = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            _ => {
                current.push(ch);
                in_token = true;
            }
        }
    }

    if in_single_quote || in_double_quote {
        return Err(LexError::MalformedContent("unclosed quotation".into()));
    }
    if escape_next {
        return Err(LexError::MalformedContent("no character after escape".into()));
    }
    if in_token {
        args.push(current);
    }

    Ok(args)
}

/// Prefix + trigger lexer with shell-like quoting.
///
/// `"!greet \"a b\" c"` with prefix `!` and trigger `greet` lexes to
/// `["a b", "c"]`.
#[derive(Debug, Clone)]
pub struct ShlexLexer {
    prefixes: Vec<String>,
    triggers: Vec<String>,
    case_insensitive: bool,
}

impl ShlexLexer {
    /// Creates a lexer. Longer prefixes are tried first.
    pub fn new(prefixes: Vec<String>, triggers: Vec<String>, case_insensitive: bool) -> Self {
        let mut prefixes = prefixes;
        prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        Self {
            prefixes,
            triggers,
            case_insensitive,
        }
    }

    /// Configured prefixes.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    fn matches_trigger(&self, token: &str) -> bool {
        self.triggers.iter().any(|t| {
            if self.case_insensitive {
                t.eq_ignore_ascii_case(token)
            } else {
                t == token
            }
        })
    }
}

impl Lexer for ShlexLexer {
    fn lex(&self, msg: &Message) -> Result<Vec<String>, LexError> {
        let content = msg.plain_text();
        let rest = self
            .prefixes
            .iter()
            .find_map(|p| content.strip_prefix(p.as_str()))
            .ok_or(LexError::NotMatched)?;

        let head = rest.split_whitespace().next().ok_or(LexError::NotMatched)?;
        if !self.matches_trigger(head) {
            return Err(LexError::NotMatched);
        }

        let mut tokens = shell_split(rest)?;
        if tokens.is_empty() {
            return Err(LexError::NotMatched);
        }
        tokens.remove(0);
        Ok(tokens)
    }

    fn triggers(&self) -> &[String] {
        &self.triggers
    }

    fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

/// Free-form lexer: the whole content must match; capture groups are the tokens.
///
/// Unmatched optional groups are skipped.
#[derive(Debug, Clone)]
pub struct RegexLexer {
    pattern: String,
    regex: Regex,
}

impl RegexLexer {
    /// Compiles `pattern` anchored at both ends.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as given, without the anchors.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl Lexer for RegexLexer {
    fn lex(&self, msg: &Message) -> Result<Vec<String>, LexError> {
        let captures = self
            .regex
            .captures(msg.plain_text())
            .ok_or(LexError::NotMatched)?;
        Ok(captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str().to_string())
            .collect())
    }

    fn triggers(&self) -> &[String] {
        &[]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bronze_core::RawEvent;
    use serde_json::json;
    use std::sync::Weak;

    pub(crate) fn text(content: &str) -> Message {
        let raw = RawEvent::from_value(json!({
            "type": 1,
            "channel_type": "GROUP",
            "target_id": "chan",
            "author_id": "user",
            "content": content,
            "msg_id": "m",
            "extra": {"guild_id": "guild"}
        }))
        .unwrap();
        Message::from_raw(raw, Weak::new()).unwrap().unwrap()
    }

    fn lexer(triggers: &[&str]) -> ShlexLexer {
        ShlexLexer::new(
            vec!["!".into(), "！".into()],
            triggers.iter().map(|t| t.to_string()).collect(),
            false,
        )
    }

    #[test]
    fn test_shell_split_simple() {
        assert_eq!(shell_split("echo hello world").unwrap(), ["echo", "hello", "world"]);
    }

    #[test]
    fn test_shell_split_mixed_quotes() {
        let args = shell_split(r#"cmd "double's quote" 'single"s quote'"#).unwrap();
        assert_eq!(args, ["cmd", "double's quote", r#"single"s quote"#]);
    }

    #[test]
    fn test_shell_split_empty_quoted_token() {
        assert_eq!(shell_split(r#"a "" b"#).unwrap(), ["a", "", "b"]);
    }

    #[test]
    fn test_shell_split_whitespace_only() {
        assert!(shell_split("   \t  ").unwrap().is_empty());
    }

    #[test]
    fn test_shell_split_unbalanced() {
        assert!(matches!(
            shell_split(r#"say "oops"#),
            Err(LexError::MalformedContent(_))
        ));
    }

    #[test]
    fn greet_lexes_quoted_argument() {
        let tokens = lexer(&["greet"]).lex(&text(r#"!greet "a b" c"#)).unwrap();
        assert_eq!(tokens, ["a b", "c"]);
    }

    #[test]
    fn full_width_prefix_matches() {
        let tokens = lexer(&["roll"]).lex(&text("！roll 1 6")).unwrap();
        assert_eq!(tokens, ["1", "6"]);
    }

    #[test]
    fn mismatches_are_not_matched() {
        let lexer = lexer(&["greet", "hi"]);
        assert_eq!(lexer.lex(&text("greet x")), Err(LexError::NotMatched));
        assert_eq!(lexer.lex(&text("!bye x")), Err(LexError::NotMatched));
        assert_eq!(lexer.lex(&text("!")), Err(LexError::NotMatched));
        assert_eq!(lexer.lex(&text("!hi")).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn malformed_quoting_is_reported_for_matching_trigger() {
        let result = lexer(&["greet"]).lex(&text(r#"!greet "a b"#));
        assert!(matches!(result, Err(LexError::MalformedContent(_))));
    }

    #[test]
    fn case_insensitive_trigger() {
        let lexer = ShlexLexer::new(vec!["!".into()], vec!["Ping".into()], true);
        assert!(lexer.lex(&text("!PING")).is_ok());
        let strict = ShlexLexer::new(vec!["!".into()], vec!["Ping".into()], false);
        assert_eq!(strict.lex(&text("!PING")), Err(LexError::NotMatched));
    }

    #[test]
    fn regex_lexer_yields_groups() {
        let lexer = RegexLexer::new(r"roll (\d+)d(\d+)").unwrap();
        assert_eq!(lexer.lex(&text("roll 2d6")).unwrap(), ["2", "6"]);
        assert_eq!(lexer.lex(&text("please roll 2d6")), Err(LexError::NotMatched));
        assert_eq!(lexer.lex(&text("roll 2d6 twice")), Err(LexError::NotMatched));
        assert_eq!(lexer.as_str(), r"roll (\d+)d(\d+)");
    }

    #[test]
    fn regex_lexer_matches_whole_content_through_alternation() {
        let lexer = RegexLexer::new(r"(\w+)|(\w+) (\w+)").unwrap();
        assert_eq!(lexer.lex(&text("hi there")).unwrap(), ["hi", "there"]);
        assert_eq!(lexer.lex(&text("hi")).unwrap(), ["hi"]);

        let lazy = RegexLexer::new(r"say (.+?)").unwrap();
        assert_eq!(lazy.lex(&text("say hello world")).unwrap(), ["hello world"]);
    }
}
