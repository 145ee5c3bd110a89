//! Line protocol encoding and decoding
//!
//! Every frame is `<tag>@<payload>`. Outbound frames are tagged with the
//! request id the client allocated; inbound frames carry either the literal
//! tag `server` (an unsolicited push) or the request id they answer.
//!
//! Nothing here touches connection state or I/O.

use lobby_core::{Player, PlayerId};

use crate::error::{Error, Result};

/// Client-generated request identifier
pub type RequestId = u64;

/// Tag used by the server for unsolicited pushes
pub const SERVER_TAG: &str = "server";

const TAG_SEPARATOR: char = '@';

// Server payload prefixes
const ERROR: &str = "error: ";
const PLAYER_ID: &str = "id:";
const LIST: &str = "list:";
const NEW_OFFER: &str = "offer:";
const IN_GAME_WITH: &str = "in game with:";
const END_GAME: &str = "end game";
const NEW_MESSAGE: &str = "message:";

// Client commands
const COMMAND_REGISTER: &str = "register";
const COMMAND_LIST: &str = "list";
const COMMAND_OFFER: &str = "offer";
const COMMAND_MESSAGE: &str = "message";
const COMMAND_END_GAME: &str = "end game";

/// A command sent from the client to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register(String),
    List,
    Offer(PlayerId),
    Message(String),
    EndGame,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Register(_) => COMMAND_REGISTER,
            Command::List => COMMAND_LIST,
            Command::Offer(_) => COMMAND_OFFER,
            Command::Message(_) => COMMAND_MESSAGE,
            Command::EndGame => COMMAND_END_GAME,
        }
    }

    /// Encode as `<command>` or `<command>:<data>`
    pub fn encode(&self) -> String {
        match self {
            Command::Register(nickname) => format!("{}:{}", COMMAND_REGISTER, nickname),
            Command::List => COMMAND_LIST.to_string(),
            Command::Offer(target) => format!("{}:{}", COMMAND_OFFER, target),
            Command::Message(body) => format!("{}:{}", COMMAND_MESSAGE, body),
            Command::EndGame => COMMAND_END_GAME.to_string(),
        }
    }
}

/// Wrap a command into a request frame: `<id>@<payload>`
pub fn encode_request(request_id: RequestId, command: &Command) -> String {
    format!("{}{}{}", request_id, TAG_SEPARATOR, command.encode())
}

/// An inbound frame split by its tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Unsolicited server push
    Push(String),
    /// Reply to a request this client issued
    Reply {
        request_id: RequestId,
        payload: String,
    },
}

/// Split an inbound line on its first `@`
pub fn decode_frame(line: &str) -> Result<Frame> {
    let (tag, payload) = line
        .split_once(TAG_SEPARATOR)
        .ok_or_else(|| Error::Protocol(format!("Missing frame tag: {:?}", line)))?;

    if tag == SERVER_TAG {
        return Ok(Frame::Push(payload.to_string()));
    }

    let request_id = tag
        .parse::<RequestId>()
        .map_err(|_| Error::Protocol(format!("Invalid frame tag: {:?}", tag)))?;

    Ok(Frame::Reply {
        request_id,
        payload: payload.to_string(),
    })
}

/// A classified server payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Id assigned to this client on registration
    PlayerId(PlayerId),
    /// Snapshot of the players waiting for a game
    PlayerList(Vec<Player>),
    /// Another player invites this client
    Offer(PlayerId),
    /// A session with the given opponent has started
    GameStarted { opponent: PlayerId },
    /// The current session is over
    GameEnded,
    /// Chat line from the opponent
    Chat(String),
    /// Request failed; human-readable reason
    Error(String),
}

/// Classify a server payload by its literal prefix
pub fn parse_server_message(payload: &str) -> Result<ServerMessage> {
    if let Some(reason) = payload.strip_prefix(ERROR) {
        return Ok(ServerMessage::Error(reason.to_string()));
    }
    if let Some(id) = payload.strip_prefix(PLAYER_ID) {
        return Ok(ServerMessage::PlayerId(parse_player_id(id)?));
    }
    if let Some(records) = payload.strip_prefix(LIST) {
        return Ok(ServerMessage::PlayerList(parse_player_list(records)?));
    }
    if let Some(id) = payload.strip_prefix(NEW_OFFER) {
        return Ok(ServerMessage::Offer(parse_player_id(id)?));
    }
    if let Some(id) = payload.strip_prefix(IN_GAME_WITH) {
        return Ok(ServerMessage::GameStarted {
            opponent: parse_player_id(id)?,
        });
    }
    if payload.starts_with(END_GAME) {
        return Ok(ServerMessage::GameEnded);
    }
    if let Some(body) = payload.strip_prefix(NEW_MESSAGE) {
        return Ok(ServerMessage::Chat(body.to_string()));
    }

    Err(Error::Protocol(format!(
        "Unrecognised server message: {:?}",
        payload
    )))
}

/// Outcome of a reply payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Request succeeded; carries the payload when it is a known server message
    Ok(Option<ServerMessage>),
    /// Request failed with the server's reason
    Failed(String),
}

/// Interpret the payload of a reply frame
///
/// Anything that is not an error is a success; bodies such as `success` that
/// do not match a known prefix are accepted without a message.
pub fn parse_reply(payload: &str) -> Reply {
    match parse_server_message(payload) {
        Ok(ServerMessage::Error(reason)) => Reply::Failed(reason),
        Ok(msg) => Reply::Ok(Some(msg)),
        Err(_) => Reply::Ok(None),
    }
}

fn parse_player_id(raw: &str) -> Result<PlayerId> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(Error::Protocol("Empty player id".into()));
    }
    Ok(PlayerId::new(id))
}

/// Parse `id:nickname` records
///
/// Records are separated by `\n`. Newline-framed transports cannot carry an
/// embedded newline, so `;` is accepted as an alternative separator; neither
/// can appear in a valid nickname.
pub fn parse_player_list(records: &str) -> Result<Vec<Player>> {
    records
        .split(['\n', ';'])
        .map(|record| record.trim_end_matches('\r'))
        .filter(|record| !record.is_empty())
        .map(|record| {
            let (id, nickname) = record
                .split_once(':')
                .ok_or_else(|| Error::Protocol(format!("Invalid player record: {:?}", record)))?;
            Ok(Player::new(parse_player_id(id)?, nickname))
        })
        .collect()
}
