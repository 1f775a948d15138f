use crate::isupport::ServerOptions;

/// One effect of walking a channel `MODE` modifier string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeChange {
    /// A participant prefix-mode letter (`q a o h v`) toggled for `nickname`.
    Participant {
        adding: bool,
        letter: char,
        nickname: String,
    },
    /// A class A/B/(adding-)C mode letter that consumed one argument.
    Argument {
        adding: bool,
        letter: char,
        argument: String,
    },
    /// A class D (or argumentless) mode letter.
    Flag { adding: bool, letter: char },
}

/// Walk a channel `MODE` modifier string (e.g. `+o-v`) against its arguments.
///
/// A `+`/`-` sign must appear before any letter is acted on; letters seen
/// before the first sign are skipped, mirroring the original's
/// indeterminate-until-signed state. Binary searches into `opts`'s sorted
/// mode classes decide whether an unrecognized letter consumes an argument.
pub fn walk_channel_modes(modifier: &str, args: &[String], opts: &ServerOptions) -> Vec<ModeChange> {
    let mut changes = Vec::new();
    let mut adding: Option<bool> = None;
    let mut args = args.iter();

    for ch in modifier.chars() {
        match ch {
            '+' => adding = Some(true),
            '-' => adding = Some(false),
            _ => {
                let Some(is_add) = adding else { continue };

                if opts.nickname_prefix_map().contains_key(&ch) {
                    if let Some(nick) = args.next() {
                        changes.push(ModeChange::Participant {
                            adding: is_add,
                            letter: ch,
                            nickname: nick.clone(),
                        });
                    }
                    continue;
                }

                let classes = opts.channel_modes();
                let consumes_arg = classes[0].binary_search(&ch).is_ok()
                    || classes[1].binary_search(&ch).is_ok()
                    || (is_add && classes[2].binary_search(&ch).is_ok());

                if consumes_arg {
                    if let Some(arg) = args.next() {
                        changes.push(ModeChange::Argument {
                            adding: is_add,
                            letter: ch,
                            argument: arg.clone(),
                        });
                    }
                } else {
                    changes.push(ModeChange::Flag {
                        adding: is_add,
                        letter: ch,
                    });
                }
            }
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts_with_chanmodes() -> ServerOptions {
        let mut opts = ServerOptions::new();
        opts.apply_tokens(["CHANMODES=beI,k,l,cimnpstz", "PREFIX=(qaohv)~&@%+"]);
        opts
    }

    #[test]
    fn letters_before_first_sign_are_skipped() {
        let opts = opts_with_chanmodes();
        let changes = walk_channel_modes("ns+i", &[], &opts);
        assert_eq!(
            changes,
            vec![ModeChange::Flag {
                adding: true,
                letter: 'i'
            }]
        );
    }

    #[test]
    fn participant_prefix_letters_always_consume_an_argument() {
        let opts = opts_with_chanmodes();
        let changes = walk_channel_modes("+o-v", &["alice".to_string(), "bob".to_string()], &opts);
        assert_eq!(
            changes,
            vec![
                ModeChange::Participant {
                    adding: true,
                    letter: 'o',
                    nickname: "alice".to_string()
                },
                ModeChange::Participant {
                    adding: false,
                    letter: 'v',
                    nickname: "bob".to_string()
                },
            ]
        );
    }

    #[test]
    fn class_c_only_consumes_argument_when_adding() {
        let opts = opts_with_chanmodes();
        let added = walk_channel_modes("+l", &["50".to_string()], &opts);
        assert_eq!(
            added,
            vec![ModeChange::Argument {
                adding: true,
                letter: 'l',
                argument: "50".to_string()
            }]
        );

        let removed = walk_channel_modes("-l", &[], &opts);
        assert_eq!(
            removed,
            vec![ModeChange::Flag {
                adding: false,
                letter: 'l'
            }]
        );
    }

    #[test]
    fn class_d_never_consumes_an_argument() {
        let opts = opts_with_chanmodes();
        let changes = walk_channel_modes("+nt", &["ignored".to_string()], &opts);
        assert_eq!(
            changes,
            vec![
                ModeChange::Flag {
                    adding: true,
                    letter: 'n'
                },
                ModeChange::Flag {
                    adding: true,
                    letter: 't'
                },
            ]
        );
    }
}
