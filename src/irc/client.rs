//! IRC client connection lifecycle (C3): connect, nickname negotiation,
//! receive-path dispatch, and graceful close.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use sudagureum_proto::casemap::casefold;
use sudagureum_proto::{IrcMessage, LineCodec, walk_channel_modes};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use super::event::IrcEvent;
use super::pool::IrcClientPool;
use super::state::{Accessivity, Channel, IrcClientState, Participant, mode_letter_to_flag};
use crate::net::{ClientTransport, OrderedWriter};

/// Numerics that mean "that nickname didn't work, try the next candidate".
const NICK_CONFLICT_NUMERICS: &[&str] = &["432", "433", "436", "437"];

pub struct IrcClient {
    id: u64,
    server_name: String,
    state: Mutex<IrcClientState>,
    writer: OrderedWriter,
    events: broadcast::Sender<IrcEvent>,
    pool: Weak<IrcClientPool>,
    close_timeout: Duration,
    close_timer: Mutex<Option<JoinHandle<()>>>,
}

impl IrcClient {
    #[allow(clippy::too_many_arguments)]
    pub async fn connect(
        pool: &Arc<IrcClientPool>,
        id: u64,
        server_name: String,
        host: String,
        port: u16,
        encoding: String,
        nicknames: Vec<String>,
        ssl: bool,
        close_timeout: Duration,
    ) -> std::io::Result<Arc<Self>> {
        let tcp = TcpStream::connect((host.as_str(), port)).await?;
        let transport = if ssl {
            ClientTransport::Tls(Box::new(connect_tls(tcp, &host).await?))
        } else {
            ClientTransport::Plain(tcp)
        };
        let (read_half, write_half) = tokio::io::split(transport);
        let writer = OrderedWriter::spawn(write_half);
        let (events_tx, _) = broadcast::channel(256);

        let client = Arc::new(IrcClient {
            id,
            server_name,
            state: Mutex::new(IrcClientState::new(encoding, nicknames.clone())),
            writer,
            events: events_tx,
            pool: Arc::downgrade(pool),
            close_timeout,
            close_timer: Mutex::new(None),
        });

        let nick0 = nicknames.first().cloned().unwrap_or_default();
        client.send(IrcMessage::new(
            "USER",
            vec![nick0.clone(), "0".to_string(), "*".to_string(), nick0.clone()],
        ));
        client.send(IrcMessage::new("NICK", vec![nick0]));

        let read_client = client.clone();
        tokio::spawn(async move {
            let mut framed = FramedRead::new(read_half, LineCodec::new());
            loop {
                match framed.next().await {
                    Some(Ok(msg)) => read_client.handle_message(msg).await,
                    Some(Err(err)) => {
                        warn!(error = %err, "irc connection parse error, closing");
                        break;
                    }
                    None => break,
                }
            }
            read_client.on_disconnected();
        });

        Ok(client)
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn nickname(&self) -> String {
        self.state.lock().nickname.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IrcEvent> {
        self.events.subscribe()
    }

    pub fn send_message(&self, command: impl Into<String>, params: Vec<String>) {
        self.send(IrcMessage::new(command, params));
    }

    fn send(&self, msg: IrcMessage) {
        let bytes = format!("{}\r\n", msg.encode()).into_bytes();
        if let Err(err) = self.writer.enqueue(bytes) {
            warn!(error = %err, "irc write queue error");
        }
    }

    /// Begin a graceful close: send QUIT, then wait for the server to drop
    /// the connection (or our own timeout) before tearing the socket down.
    pub async fn close(self: &Arc<Self>, clear_me: bool) {
        {
            let mut state = self.state.lock();
            if state.quit_ready {
                return;
            }
            state.quit_ready = true;
            state.clear_me = clear_me;
        }
        self.send(IrcMessage::new("QUIT", vec!["Bye!".to_string()]));

        let timeout = self.close_timeout;
        let timer_client = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_client.force_close();
        });
        *self.close_timer.lock() = Some(handle);
    }

    /// Close the socket and cancel the close timer; only asks the pool to
    /// drop this client when `clearMe` is set, per spec §4.3's `ERROR`
    /// handling (`close(clearMe)` is the only place that sets it).
    fn force_close(self: &Arc<Self>) {
        if let Some(handle) = self.close_timer.lock().take() {
            handle.abort();
        }
        if self.state.lock().clear_me {
            if let Some(pool) = self.pool.upgrade() {
                pool.closed(self.id);
            }
        }
    }

    fn on_disconnected(self: &Arc<Self>) {
        // The socket is already gone; there's no longer a pool entry worth
        // keeping around regardless of how `close` was last invoked.
        self.state.lock().clear_me = true;
        self.force_close();
    }

    async fn handle_message(self: &Arc<Self>, msg: IrcMessage) {
        match msg.command.as_str() {
            "PING" => self.send(IrcMessage::new("PONG", msg.params.clone())),
            "ERROR" => {
                let quit_ready = self.state.lock().quit_ready;
                if quit_ready {
                    self.force_close();
                }
            }
            "JOIN" => self.handle_join(&msg),
            "PART" => self.handle_part(&msg),
            "MODE" => self.handle_mode(&msg),
            "PRIVMSG" => self.handle_privmsg(&msg),
            "NOTICE" => self.handle_notice(&msg),
            "001" => self.handle_welcome(&msg),
            "005" => self.handle_isupport(&msg),
            "331" => self.handle_no_topic(&msg),
            "332" => self.handle_topic(&msg),
            "333" => self.handle_topic_meta(&msg),
            "353" => self.handle_names(&msg),
            cmd if NICK_CONFLICT_NUMERICS.contains(&cmd) => self.handle_nick_conflict(),
            _ => debug!(command = %msg.command, "unhandled irc message"),
        }
    }

    fn handle_nick_conflict(self: &Arc<Self>) {
        let next = {
            let mut state = self.state.lock();
            if !state.connect_beginning {
                return;
            }
            state.current_nickname_index += 1;
            state
                .nickname_candidates
                .get(state.current_nickname_index)
                .cloned()
        };
        match next {
            Some(candidate) => {
                self.state.lock().nickname = candidate.clone();
                self.send(IrcMessage::new("NICK", vec![candidate]));
            }
            None => {
                // Every candidate is taken; this connection can never
                // register, so it's dead weight in the pool regardless of
                // `clearMe`.
                self.state.lock().clear_me = true;
                self.force_close();
            }
        }
    }

    fn handle_join(&self, msg: &IrcMessage) {
        let Some(channel) = msg.params.first() else { return };
        let nickname = nickname_from_prefix(msg.prefix.as_deref());

        let mut state = self.state.lock();
        if state.is_self(&nickname) {
            state.channels.entry(casefold(channel)).or_default();
        } else if let Some(chan) = state.channel_mut(channel) {
            chan.insert_participant(Participant::new(nickname.clone()));
            drop(state);
            self.emit(IrcEvent::JoinChannel {
                channel: channel.clone(),
                nickname,
            });
        }
    }

    fn handle_part(&self, msg: &IrcMessage) {
        let Some(channel) = msg.params.first() else { return };
        let nickname = nickname_from_prefix(msg.prefix.as_deref());

        let mut state = self.state.lock();
        if state.is_self(&nickname) {
            state.channels.remove(&casefold(channel));
        } else if let Some(chan) = state.channel_mut(channel) {
            chan.remove_participant(&nickname);
            drop(state);
            self.emit(IrcEvent::PartChannel {
                channel: channel.clone(),
                nickname,
            });
        }
    }

    fn handle_mode(&self, msg: &IrcMessage) {
        let Some(target) = msg.params.first() else { return };
        let Some(modifier) = msg.params.get(1) else { return };
        let args = msg.params.get(2..).unwrap_or(&[]);

        let mut state = self.state.lock();
        if !state.channels.contains_key(&casefold(target)) {
            return;
        }
        let changes = walk_channel_modes(modifier, args, &state.server_options);
        let Some(channel) = state.channel_mut(target) else { return };
        apply_mode_changes(channel, &changes);
    }

    fn handle_privmsg(&self, msg: &IrcMessage) {
        let (Some(target), Some(message)) = (msg.params.first(), msg.params.get(1)) else {
            return;
        };
        let nickname = nickname_from_prefix(msg.prefix.as_deref());
        let is_self = self.state.lock().is_self(target);
        if is_self {
            self.emit(IrcEvent::PersonalMessage {
                nickname,
                message: message.clone(),
            });
        } else {
            self.emit(IrcEvent::ChannelMessage {
                channel: target.clone(),
                nickname,
                message: message.clone(),
            });
        }
    }

    fn handle_notice(&self, msg: &IrcMessage) {
        let target = msg.params.first().cloned().unwrap_or_default();
        let message = msg.params.get(1).cloned().unwrap_or_default();
        let nickname = nickname_from_prefix(msg.prefix.as_deref());
        self.emit(IrcEvent::ChannelNotice {
            target,
            nickname,
            message,
        });
    }

    fn handle_welcome(&self, msg: &IrcMessage) {
        self.state.lock().connect_beginning = false;
        self.emit(IrcEvent::Connect);
        self.emit(IrcEvent::ServerMessage {
            command: "001".to_string(),
            message: msg.params.last().cloned().unwrap_or_default(),
        });
    }

    fn handle_isupport(&self, msg: &IrcMessage) {
        if msg.params.len() < 2 {
            return;
        }
        let tokens = &msg.params[1..msg.params.len() - 1];
        self.state
            .lock()
            .server_options
            .apply_tokens(tokens.iter().map(String::as_str));
    }

    fn handle_no_topic(&self, msg: &IrcMessage) {
        let Some(channel) = msg.params.get(1) else { return };
        if let Some(chan) = self.state.lock().channel_mut(channel) {
            chan.topic = None;
            chan.topic_setter = None;
            chan.topic_set_time = Some(now_epoch());
        }
    }

    fn handle_topic(&self, msg: &IrcMessage) {
        let (Some(channel), Some(topic)) = (msg.params.get(1), msg.params.get(2)) else {
            return;
        };
        if let Some(chan) = self.state.lock().channel_mut(channel) {
            chan.topic = Some(topic.clone());
        }
    }

    fn handle_topic_meta(&self, msg: &IrcMessage) {
        let (Some(channel), Some(setter), Some(time)) =
            (msg.params.get(1), msg.params.get(2), msg.params.get(3))
        else {
            return;
        };
        let time: i64 = time.parse().unwrap_or(0);
        if let Some(chan) = self.state.lock().channel_mut(channel) {
            chan.topic_setter = Some(setter.clone());
            chan.topic_set_time = Some(time);
        }
    }

    fn handle_names(&self, msg: &IrcMessage) {
        let (Some(accessivity_char), Some(channel), Some(names)) =
            (msg.params.get(1), msg.params.get(2), msg.params.get(3))
        else {
            return;
        };
        let Some(accessivity) = accessivity_char.chars().next().and_then(Accessivity::from_char) else {
            return;
        };

        let mut state = self.state.lock();
        let reverse_prefix: std::collections::BTreeMap<char, char> = state
            .server_options
            .nickname_prefix_map()
            .iter()
            .map(|(letter, symbol)| (*symbol, *letter))
            .collect();

        let Some(chan) = state.channel_mut(channel) else { return };
        chan.accessivity = Some(accessivity);

        for token in names.split_whitespace() {
            let mut modes = super::state::ParticipantModes::empty();
            let mut rest = token;
            while let Some(c) = rest.chars().next() {
                match reverse_prefix.get(&c).and_then(|letter| mode_letter_to_flag(*letter)) {
                    Some(flag) => {
                        modes.set(flag, true);
                        rest = &rest[c.len_utf8()..];
                    }
                    None => break,
                }
            }
            if rest.is_empty() {
                continue;
            }
            let mut participant = Participant::new(rest);
            participant.modes = modes;
            chan.insert_participant(participant);
        }
    }

    fn emit(&self, event: IrcEvent) {
        let _ = self.events.send(event);
    }
}

fn apply_mode_changes(channel: &mut Channel, changes: &[sudagureum_proto::ModeChange]) {
    use sudagureum_proto::ModeChange;
    for change in changes {
        match change {
            ModeChange::Participant {
                adding,
                letter,
                nickname,
            } => {
                if let (Some(flag), Some(participant)) =
                    (mode_letter_to_flag(*letter), channel.participant_mut(nickname))
                {
                    participant.modes.set(flag, *adding);
                }
            }
            ModeChange::Argument { adding, letter, argument } => match letter {
                'k' => channel.key = if *adding { Some(argument.clone()) } else { None },
                'l' => {
                    channel.limit = if *adding { argument.parse().ok() } else { None };
                }
                _ => {}
            },
            ModeChange::Flag { adding, letter } => {
                if *letter == 'l' && !*adding {
                    channel.limit = None;
                }
            }
        }
    }
}

fn nickname_from_prefix(prefix: Option<&str>) -> String {
    let Some(prefix) = prefix else { return String::new() };
    match prefix.find('!') {
        Some(idx) => prefix[..idx].to_string(),
        None => prefix.to_string(),
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn connect_tls(
    tcp: TcpStream,
    host: &str,
) -> std::io::Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = roots.add(cert);
    }
    let config = tokio_rustls::rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
    let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid server name"))?;
    connector.connect(server_name, tcp).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_from_prefix_strips_user_and_host() {
        assert_eq!(nickname_from_prefix(Some("alice!u@h")), "alice");
        assert_eq!(nickname_from_prefix(Some("irc.example.net")), "irc.example.net");
        assert_eq!(nickname_from_prefix(None), "");
    }

    #[test]
    fn mode_change_key_and_limit_apply_to_channel() {
        use sudagureum_proto::ModeChange;
        let mut channel = Channel::default();
        apply_mode_changes(
            &mut channel,
            &[
                ModeChange::Argument {
                    adding: true,
                    letter: 'k',
                    argument: "secret".to_string(),
                },
                ModeChange::Argument {
                    adding: true,
                    letter: 'l',
                    argument: "10".to_string(),
                },
            ],
        );
        assert_eq!(channel.key.as_deref(), Some("secret"));
        assert_eq!(channel.limit, Some(10));
    }

    #[test]
    fn participant_mode_change_for_unknown_nickname_is_ignored() {
        use sudagureum_proto::ModeChange;
        let mut channel = Channel::default();
        channel.insert_participant(Participant::new("alice"));

        apply_mode_changes(
            &mut channel,
            &[ModeChange::Participant {
                adding: true,
                letter: 'o',
                nickname: "bob".to_string(),
            }],
        );

        assert_eq!(channel.participants.len(), 1);
        assert!(!channel.participant_mut("alice").unwrap().modes.contains(crate::irc::state::ParticipantModes::OP));
        assert!(channel.participant_mut("bob").is_none());
    }
}
