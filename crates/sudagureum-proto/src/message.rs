use crate::error::ProtocolError;

/// Maximum number of parameters a message may carry (the trailing parameter
/// counts toward this total).
pub const MAX_PARAMS: usize = 15;

/// A single IRC protocol message: `[:prefix] command param* [:trailing]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Parse a single line (no terminator) into a message.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut rest = line;

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (tok, remainder) = split_first_token(stripped);
            if tok.is_empty() {
                return Err(ProtocolError::EmptyPrefix);
            }
            rest = remainder;
            Some(tok.to_string())
        } else {
            None
        };

        rest = rest.trim_start_matches(' ');
        let (command, mut rest) = split_first_token(rest);
        if command.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        if !is_valid_command(command) {
            return Err(ProtocolError::InvalidCommand(command.to_string()));
        }
        let command = command.to_string();

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                push_param(&mut params, trailing.to_string());
                break;
            }
            let (tok, remainder) = split_first_token(rest);
            push_param(&mut params, tok.to_string());
            rest = remainder;
        }

        Ok(IrcMessage {
            prefix,
            command,
            params,
        })
    }

    /// Encode back to wire form, without the `\r\n` terminator.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(&self.command);

        for (i, param) in self.params.iter().enumerate() {
            out.push(' ');
            let is_last = i + 1 == self.params.len();
            let needs_trailing = is_last && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_trailing {
                out.push(':');
            }
            out.push_str(param);
        }
        out
    }
}

/// Append a parameter, folding overflow tokens (beyond `MAX_PARAMS`) into the
/// last parameter with a single-space separator instead of rejecting them.
fn push_param(params: &mut Vec<String>, token: String) {
    if params.len() < MAX_PARAMS {
        params.push(token);
    } else if let Some(last) = params.last_mut() {
        last.push(' ');
        last.push_str(&token);
    }
}

fn split_first_token(s: &str) -> (&str, &str) {
    match s.find(' ') {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    }
}

fn is_valid_command(s: &str) -> bool {
    if s.len() == 3 && s.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ping() {
        let m = IrcMessage::parse("PING :13722").unwrap();
        assert_eq!(m.command, "PING");
        assert_eq!(m.params, vec!["13722".to_string()]);
        assert!(m.prefix.is_none());
    }

    #[test]
    fn parses_prefixed_privmsg() {
        let m = IrcMessage::parse(":nick!u@h PRIVMSG #c :hi there").unwrap();
        assert_eq!(m.prefix.as_deref(), Some("nick!u@h"));
        assert_eq!(m.command, "PRIVMSG");
        assert_eq!(m.params, vec!["#c".to_string(), "hi there".to_string()]);
    }

    #[test]
    fn numeric_command_is_three_digits() {
        assert!(IrcMessage::parse("001 nick :Welcome").is_ok());
        assert!(IrcMessage::parse("01 nick :Welcome").is_err());
        assert!(IrcMessage::parse("0001 nick :Welcome").is_err());
    }

    #[test]
    fn empty_prefix_is_an_error() {
        assert_eq!(IrcMessage::parse(": PING"), Err(ProtocolError::EmptyPrefix));
    }

    #[test]
    fn overflow_params_fold_into_last() {
        let mut line = "CMD".to_string();
        for i in 0..20 {
            line.push_str(&format!(" p{i}"));
        }
        let m = IrcMessage::parse(&line).unwrap();
        assert_eq!(m.params.len(), MAX_PARAMS);
        // tokens p14..p19 folded with single spaces into the 15th param
        assert_eq!(m.params[14], "p14 p15 p16 p17 p18 p19");
    }

    #[test]
    fn round_trip_via_encode_parse_encode() {
        let m = IrcMessage::parse(":nick!u@h PRIVMSG #c :hi there").unwrap();
        let encoded = m.encode();
        let reparsed = IrcMessage::parse(&encoded).unwrap();
        assert_eq!(reparsed.encode(), encoded);
    }

    #[test]
    fn encode_uses_trailing_only_when_needed() {
        let m = IrcMessage::new("JOIN", vec!["#chan".to_string()]);
        assert_eq!(m.encode(), "JOIN #chan");

        let m = IrcMessage::new("PRIVMSG", vec!["#chan".to_string(), "hi there".to_string()]);
        assert_eq!(m.encode(), "PRIVMSG #chan :hi there");

        let m = IrcMessage::new("PRIVMSG", vec!["#chan".to_string(), ":already".to_string()]);
        assert_eq!(m.encode(), "PRIVMSG #chan ::already");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A command token `IrcMessage::parse` accepts: either three digits
    /// (a numeric reply) or a run of ASCII letters.
    fn command_strategy() -> impl Strategy<Value = String> {
        prop_oneof!["[0-9]{3}", "[A-Za-z]{1,10}"]
    }

    /// A middle parameter: non-empty, no spaces, doesn't start with `:` —
    /// anything else would force `encode` to treat it as trailing, or
    /// collapse it entirely, breaking the round trip.
    fn middle_param_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9#+_-]{1,8}"
    }

    /// A trailing parameter may be empty, contain spaces, or start with
    /// `:` — `encode`/`parse` handle all of that via the leading-colon form.
    fn trailing_param_strategy() -> impl Strategy<Value = String> {
        "[ -~]{0,20}"
    }

    fn message_strategy() -> impl Strategy<Value = IrcMessage> {
        (
            proptest::option::of("[a-zA-Z0-9.!~_-]{1,12}"),
            command_strategy(),
            proptest::collection::vec(middle_param_strategy(), 0..(MAX_PARAMS - 1)),
            proptest::option::of(trailing_param_strategy()),
        )
            .prop_map(|(prefix, command, mut params, trailing)| {
                if let Some(trailing) = trailing {
                    params.push(trailing);
                }
                IrcMessage { prefix, command, params }
            })
    }

    proptest! {
        /// `encode` then `parse` must reconstruct the exact same message for
        /// any message built from syntactically valid IRC tokens.
        #[test]
        fn encode_parse_round_trips(msg in message_strategy()) {
            let encoded = msg.encode();
            let reparsed = IrcMessage::parse(&encoded).unwrap();
            prop_assert_eq!(reparsed, msg);
        }
    }
}
