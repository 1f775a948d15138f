//! Events an [`IrcClient`](super::client::IrcClient) emits as it advances its
//! state machine. The original's `onConnect +=`-style signal delegates have
//! no direct Rust analogue, so each client instead broadcasts one of these
//! over a channel that the user orchestrator (C10) subscribes to.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    Connect,
    ServerMessage { command: String, message: String },
    JoinChannel { channel: String, nickname: String },
    PartChannel { channel: String, nickname: String },
    ChannelMessage {
        channel: String,
        nickname: String,
        message: String,
    },
    ChannelNotice {
        /// Empty when the target wasn't a known channel (server notice).
        target: String,
        nickname: String,
        message: String,
    },
    PersonalMessage { nickname: String, message: String },
}
