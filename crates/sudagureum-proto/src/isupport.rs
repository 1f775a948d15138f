use std::collections::BTreeMap;

/// Server capabilities accumulated from `005 RPL_ISUPPORT` tokens, plus the
/// fixed defaults a client assumes before any ISUPPORT line arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    raw: BTreeMap<String, Option<String>>,
    channel_types: Vec<char>,
    channel_modes: [Vec<char>; 4],
    nickname_prefix_map: BTreeMap<char, char>,
}

/// `q/a/o/h/v` to `~/&/@/%/+`, the set every server is assumed to support
/// until a `PREFIX=` token says otherwise.
fn default_prefix_map() -> BTreeMap<char, char> {
    [('q', '~'), ('a', '&'), ('o', '@'), ('h', '%'), ('v', '+')]
        .into_iter()
        .collect()
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            raw: BTreeMap::new(),
            channel_types: Vec::new(),
            channel_modes: Default::default(),
            nickname_prefix_map: default_prefix_map(),
        }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_types(&self) -> &[char] {
        &self.channel_types
    }

    /// Sorted class-A/B/C/D channel mode letters, indices 0..=3.
    pub fn channel_modes(&self) -> &[Vec<char>; 4] {
        &self.channel_modes
    }

    pub fn nickname_prefix_map(&self) -> &BTreeMap<char, char> {
        &self.nickname_prefix_map
    }

    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.raw.get(name).map(|v| v.as_deref())
    }

    /// Apply the middle tokens of a `005` message (excludes the target nick
    /// in params[0] and the trailing human-readable message).
    pub fn apply_tokens<'a, I: IntoIterator<Item = &'a str>>(&mut self, tokens: I) {
        for token in tokens {
            let (name, value) = match token.split_once('=') {
                Some((n, v)) => (n, Some(v)),
                None => (token, None),
            };

            match name {
                "CHANTYPES" => {
                    if let Some(v) = value {
                        let mut chars: Vec<char> = v.chars().collect();
                        chars.sort_unstable();
                        self.channel_types = chars;
                    }
                }
                "CHANMODES" => {
                    if let Some(v) = value {
                        self.apply_chanmodes(v);
                    }
                }
                "PREFIX" => {
                    if let Some(v) = value {
                        self.apply_prefix(v);
                    }
                }
                _ => {}
            }

            self.raw
                .insert(name.to_string(), value.map(|v| v.to_string()));
        }
    }

    fn apply_chanmodes(&mut self, value: &str) {
        let groups: Vec<&str> = value.split(',').collect();
        if groups.len() != 4 {
            return;
        }
        for (i, group) in groups.iter().enumerate() {
            let mut chars: Vec<char> = group.chars().collect();
            chars.sort_unstable();
            self.channel_modes[i] = chars;
        }
    }

    /// `PREFIX=(qaohv)~&@%+`. Rebuilds the bijection only when the letter and
    /// symbol groups have equal length; otherwise the previous map (possibly
    /// the compiled-in default) is left untouched.
    fn apply_prefix(&mut self, value: &str) {
        let Some(rest) = value.strip_prefix('(') else {
            return;
        };
        let Some(close) = rest.find(')') else {
            return;
        };
        let letters = &rest[..close];
        let symbols = &rest[close + 1..];
        if letters.is_empty()
            || symbols.is_empty()
            || letters.chars().count() != symbols.chars().count()
            || !letters.chars().all(|c| c.is_ascii_alphabetic())
        {
            return;
        }

        let mut map = BTreeMap::new();
        for (letter, symbol) in letters.chars().zip(symbols.chars()) {
            map.insert(letter, symbol);
        }
        self.nickname_prefix_map = map;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chantypes_are_sorted() {
        let mut opts = ServerOptions::new();
        opts.apply_tokens(["CHANTYPES=&#"]);
        assert_eq!(opts.channel_types(), &['#', '&']);
    }

    #[test]
    fn chanmodes_split_and_sort_each_class() {
        let mut opts = ServerOptions::new();
        opts.apply_tokens(["CHANMODES=beI,k,l,cimnpstz"]);
        assert_eq!(opts.channel_modes()[0], vec!['I', 'b', 'e']);
        assert_eq!(opts.channel_modes()[1], vec!['k']);
        assert_eq!(opts.channel_modes()[2], vec!['l']);
        let mut class_d = opts.channel_modes()[3].clone();
        class_d.sort_unstable();
        assert_eq!(class_d, vec!['c', 'i', 'm', 'n', 'p', 's', 't', 'z']);
    }

    #[test]
    fn prefix_rebuilds_bijection() {
        let mut opts = ServerOptions::new();
        opts.apply_tokens(["PREFIX=(qaohv)~&@%+"]);
        let map = opts.nickname_prefix_map();
        assert_eq!(map.get(&'q'), Some(&'~'));
        assert_eq!(map.get(&'a'), Some(&'&'));
        assert_eq!(map.get(&'o'), Some(&'@'));
        assert_eq!(map.get(&'h'), Some(&'%'));
        assert_eq!(map.get(&'v'), Some(&'+'));
    }

    #[test]
    fn prefix_default_before_any_isupport() {
        let opts = ServerOptions::new();
        assert_eq!(opts.nickname_prefix_map().get(&'o'), Some(&'@'));
    }

    #[test]
    fn unequal_length_prefix_groups_leave_map_untouched() {
        let mut opts = ServerOptions::new();
        opts.apply_tokens(["PREFIX=(qo)~"]);
        // Mismatched lengths: the default map survives unchanged.
        assert_eq!(opts.nickname_prefix_map(), &default_prefix_map());
    }

    #[test]
    fn unrecognized_tokens_are_retained_as_raw() {
        let mut opts = ServerOptions::new();
        opts.apply_tokens(["NETWORK=Example", "NAMESX"]);
        assert_eq!(opts.get("NETWORK"), Some(Some("Example")));
        assert_eq!(opts.get("NAMESX"), Some(None));
    }
}
