//! Per-connection IRC state: channels, participants, and the ISUPPORT view
//! a single [`super::client::IrcClient`] accumulates over its lifetime.

use std::collections::BTreeMap;
use sudagureum_proto::ServerOptions;
use sudagureum_proto::casemap::casefold;

/// Prefix-derived participant modes, one bit per letter in `q a o h v`. A
/// single five-bit set doesn't earn its own dependency on `bitflags`, so
/// it's hand-rolled the same way the rest of this bitset would look.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticipantModes(u8);

impl ParticipantModes {
    pub const VOICE: ParticipantModes = ParticipantModes(1 << 0);
    pub const HALF_OP: ParticipantModes = ParticipantModes(1 << 1);
    pub const OP: ParticipantModes = ParticipantModes(1 << 2);
    pub const ADMIN: ParticipantModes = ParticipantModes(1 << 3);
    pub const OWNER: ParticipantModes = ParticipantModes(1 << 4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

/// Maps a channel-mode letter (`q a o h v`) to the participant flag it
/// toggles, per the original's `participantModeFromPermission`.
pub fn mode_letter_to_flag(letter: char) -> Option<ParticipantModes> {
    match letter {
        'q' => Some(ParticipantModes::OWNER),
        'a' => Some(ParticipantModes::ADMIN),
        'o' => Some(ParticipantModes::OP),
        'h' => Some(ParticipantModes::HALF_OP),
        'v' => Some(ParticipantModes::VOICE),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub nickname: String,
    pub modes: ParticipantModes,
    pub away: bool,
}

impl Participant {
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            modes: ParticipantModes::empty(),
            away: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessivity {
    Public,
    Private,
    Secret,
}

impl Accessivity {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '=' => Some(Self::Public),
            '*' => Some(Self::Private),
            '@' => Some(Self::Secret),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub accessivity: Option<Accessivity>,
    pub topic: Option<String>,
    pub topic_setter: Option<String>,
    pub topic_set_time: Option<i64>,
    /// Keyed by casefolded nickname so membership lookups are
    /// case-insensitive; iteration order follows nickname casefold order.
    pub participants: BTreeMap<String, Participant>,
    pub key: Option<String>,
    pub limit: Option<u32>,
}

impl Channel {
    pub fn insert_participant(&mut self, participant: Participant) {
        self.participants
            .insert(casefold(&participant.nickname), participant);
    }

    pub fn remove_participant(&mut self, nickname: &str) -> Option<Participant> {
        self.participants.remove(&casefold(nickname))
    }

    pub fn participant_mut(&mut self, nickname: &str) -> Option<&mut Participant> {
        self.participants.get_mut(&casefold(nickname))
    }
}

/// Per-connection state accumulated over an [`IrcClient`](super::client::IrcClient)'s lifetime.
#[derive(Debug, Clone)]
pub struct IrcClientState {
    pub encoding: String,
    pub nickname: String,
    pub nickname_candidates: Vec<String>,
    pub current_nickname_index: usize,
    pub connect_beginning: bool,
    pub server_options: ServerOptions,
    /// Keyed by casefolded channel name.
    pub channels: BTreeMap<String, Channel>,
    pub quit_ready: bool,
    pub clear_me: bool,
}

impl IrcClientState {
    pub fn new(encoding: impl Into<String>, nickname_candidates: Vec<String>) -> Self {
        let nickname = nickname_candidates.first().cloned().unwrap_or_default();
        Self {
            encoding: encoding.into(),
            nickname,
            nickname_candidates,
            current_nickname_index: 0,
            connect_beginning: true,
            server_options: ServerOptions::new(),
            channels: BTreeMap::new(),
            quit_ready: false,
            clear_me: false,
        }
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&casefold(name))
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(&casefold(name))
    }

    pub fn is_self(&self, nickname: &str) -> bool {
        casefold(nickname) == casefold(&self.nickname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_letters_map_to_expected_flags() {
        assert_eq!(mode_letter_to_flag('q'), Some(ParticipantModes::OWNER));
        assert_eq!(mode_letter_to_flag('v'), Some(ParticipantModes::VOICE));
        assert_eq!(mode_letter_to_flag('x'), None);
    }

    #[test]
    fn channel_participant_lookup_is_case_insensitive() {
        let mut channel = Channel::default();
        channel.insert_participant(Participant::new("Alice"));
        assert!(channel.participant_mut("ALICE").is_some());
        assert!(channel.remove_participant("alice").is_some());
        assert!(channel.participants.is_empty());
    }

    #[test]
    fn accessivity_from_char() {
        assert_eq!(Accessivity::from_char('='), Some(Accessivity::Public));
        assert_eq!(Accessivity::from_char('x'), None);
    }
}
