//! Wires a user's configured IRC servers to the client pool and projects
//! every IRC event onto the archive (C10).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sudagureum_proto::casemap::casefold;
use tokio::sync::broadcast;
use tracing::warn;

use crate::archive::{Archive, LogLine, LogType};
use crate::irc::{ConnectParams, IrcClient, IrcClientPool, IrcEvent};

#[derive(Debug, Clone)]
pub struct UserServerInfo {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub encoding: String,
    pub nicknames: Vec<String>,
    pub ssl: bool,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UserEntry {
    pub user_id: String,
    pub servers: Vec<UserServerInfo>,
}

/// A logged-in user's view of their configured IRC servers. Owns a set of
/// servers keyed case-insensitively by name; each server is a weak handle to
/// its live `IrcClient`, mirroring the pool's own non-cyclic ownership.
pub struct User {
    user_id: String,
    servers: Mutex<BTreeMap<String, std::sync::Weak<IrcClient>>>,
    archive: Arc<Archive>,
}

impl User {
    /// Connect every configured server for this user and start projecting
    /// their events into the archive. Servers that fail to connect are
    /// logged and skipped rather than aborting the whole user.
    pub async fn spawn(
        entry: UserEntry,
        pool: Arc<IrcClientPool>,
        archive: Arc<Archive>,
        close_timeout: Duration,
    ) -> Arc<Self> {
        let user = Arc::new(User {
            user_id: entry.user_id,
            servers: Mutex::new(BTreeMap::new()),
            archive,
        });

        for server in entry.servers {
            let channels = server.channels.clone();
            let server_name = server.name.clone();
            let user_for_register = user.clone();

            let result = pool
                .connect(
                    ConnectParams {
                        server_name: server.name.clone(),
                        host: server.host,
                        port: server.port,
                        encoding: server.encoding,
                        nicknames: server.nicknames,
                        ssl: server.ssl,
                        close_timeout,
                    },
                    move |client| {
                        user_for_register
                            .servers
                            .lock()
                            .insert(casefold(&server_name), Arc::downgrade(client));
                        user_for_register.clone().subscribe(client.clone(), server_name.clone(), channels);
                    },
                )
                .await;

            if let Err(err) = result {
                warn!(error = %err, server = %server.name, user = %user.user_id, "failed to connect irc server");
            }
        }

        user
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn server(&self, name: &str) -> Option<Arc<IrcClient>> {
        self.servers.lock().get(&casefold(name)).and_then(std::sync::Weak::upgrade)
    }

    fn subscribe(self: Arc<Self>, client: Arc<IrcClient>, server_name: String, channels: Vec<String>) {
        let mut events = client.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.handle_event(&client, &server_name, &channels, event).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn handle_event(
        &self,
        client: &Arc<IrcClient>,
        server_name: &str,
        channels: &[String],
        event: IrcEvent,
    ) {
        let row = match event {
            IrcEvent::Connect => {
                client.send_message("MODE", vec![client.nickname(), "+x".to_string()]);
                for channel in channels {
                    client.send_message("JOIN", vec![channel.clone()]);
                }
                None
            }
            IrcEvent::ServerMessage { message, .. } => {
                Some((String::new(), String::new(), LogType::ServerMsg, message))
            }
            IrcEvent::JoinChannel { channel, nickname } => {
                Some((channel, nickname, LogType::Join, String::new()))
            }
            IrcEvent::PartChannel { channel, nickname } => {
                Some((channel, nickname, LogType::Part, String::new()))
            }
            IrcEvent::ChannelMessage {
                channel,
                nickname,
                message,
            } => Some((channel, nickname, LogType::Privmsg, message)),
            IrcEvent::ChannelNotice {
                target,
                nickname,
                message,
            } => {
                if target.is_empty() {
                    Some((String::new(), String::new(), LogType::Notice, message))
                } else {
                    Some((target, nickname, LogType::Notice, message))
                }
            }
            IrcEvent::PersonalMessage { nickname, message } => {
                Some((nickname.clone(), nickname, LogType::Privmsg, message))
            }
        };

        let Some((channel, nickname, log_type, message)) = row else {
            return;
        };

        let line = LogLine {
            time: chrono::Utc::now().timestamp(),
            nickname,
            log_type,
            message,
        };
        if let Err(err) = self.archive.insert(&self.user_id, server_name, &channel, &line).await {
            warn!(error = %err, user = %self.user_id, server = %server_name, "failed to archive irc event");
        }
    }
}
