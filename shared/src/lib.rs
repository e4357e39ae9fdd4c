//! Wire protocol shared by the Potstop server and client
//!
//! Frames are one or more non-empty lines terminated by an empty line. A client
//! frame carries a command keyword on its first line and an optional payload on
//! the second:
//!
//! ```text
//! JOIN
//! mari
//!
//! STOP
//! {"City":"Paris","Animal":"Panda"}
//!
//! ```
//!
//! The server answers every command with a response frame (`"<code> <text>"`,
//! optionally followed by a JSON line) and may push unsolicited frames at any
//! time: round start, stop notifications and the shutdown sentinel.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_PORT: u16 = 8888;
pub const MAX_FRAME_SIZE: usize = 8 * 1024;
pub const FRAME_TERMINATOR: &str = "\n\n";
pub const SHUTDOWN_SENTINEL: &str = "ENDC";

const STOPPED_BY_PREFIX: &str = "STOPPED BY ";
const ROUND_START_KEYWORD: &str = "START";

/// Answers submitted by one player, keyed by the round's category prompts
pub type AnswerSheet = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0} requires a payload line")]
    MissingPayload(&'static str),

    #[error("unexpected lines after the {0} payload")]
    TrailingLines(&'static str),

    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("malformed server frame: {0}")]
    MalformedFrame(String),

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Failures while pulling a frame off the wire
///
/// `Malformed` frames were read up to their terminator, so the stream is still
/// aligned and the connection can carry on. The other variants leave the
/// stream in an unknown state.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame exceeds {} bytes", MAX_FRAME_SIZE)]
    TooLarge,

    #[error(transparent)]
    Malformed(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Requests a client can send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { name: String },
    Start,
    Stop { answers: AnswerSheet },
    Quit,
}

impl Command {
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Join { .. } => "JOIN",
            Command::Start => "START",
            Command::Stop { .. } => "STOP",
            Command::Quit => "QUIT",
        }
    }

    /// Parses a client frame
    ///
    /// The keyword is matched case-insensitively. JOIN and STOP need a payload
    /// line; START and QUIT ignore anything after the keyword. The JOIN name is
    /// trimmed but may end up empty, which the session rejects on its own terms.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let mut lines = frame.lines();
        let keyword = lines
            .next()
            .map(|line| line.trim().to_ascii_uppercase())
            .filter(|keyword| !keyword.is_empty())
            .ok_or(ProtocolError::EmptyFrame)?;

        match keyword.as_str() {
            "JOIN" => {
                let name = lines.next().ok_or(ProtocolError::MissingPayload("JOIN"))?;
                if lines.next().is_some() {
                    return Err(ProtocolError::TrailingLines("JOIN"));
                }
                Ok(Command::Join {
                    name: name.trim().to_string(),
                })
            }
            "STOP" => {
                let payload = lines.next().ok_or(ProtocolError::MissingPayload("STOP"))?;
                if lines.next().is_some() {
                    return Err(ProtocolError::TrailingLines("STOP"));
                }
                let answers = serde_json::from_str::<AnswerSheet>(payload)
                    .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
                Ok(Command::Stop { answers })
            }
            "START" => Ok(Command::Start),
            "QUIT" => Ok(Command::Quit),
            _ => Err(ProtocolError::UnknownCommand(keyword)),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            Command::Join { name } => Ok(format!("JOIN\n{}", name)),
            Command::Stop { answers } => {
                let payload = serde_json::to_string(answers)
                    .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
                Ok(format!("STOP\n{}", payload))
            }
            Command::Start | Command::Quit => Ok(self.keyword().to_string()),
        }
    }
}

/// Numeric status codes carried on the first line of every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    BadRequest,
    Stopped,
    NotStarted,
    AlreadyStopped,
    Joined,
    FullLobby,
    AlreadyJoined,
    GameInProgress,
    InvalidName,
    Left,
    PlayerNotFound,
    Started,
    Unauthorized,
    AlreadyStarted,
}

impl ResponseCode {
    const ALL: [ResponseCode; 14] = [
        ResponseCode::BadRequest,
        ResponseCode::Stopped,
        ResponseCode::NotStarted,
        ResponseCode::AlreadyStopped,
        ResponseCode::Joined,
        ResponseCode::FullLobby,
        ResponseCode::AlreadyJoined,
        ResponseCode::GameInProgress,
        ResponseCode::InvalidName,
        ResponseCode::Left,
        ResponseCode::PlayerNotFound,
        ResponseCode::Started,
        ResponseCode::Unauthorized,
        ResponseCode::AlreadyStarted,
    ];

    pub fn value(self) -> u8 {
        match self {
            ResponseCode::BadRequest => 0,
            ResponseCode::Stopped => 10,
            ResponseCode::NotStarted => 11,
            ResponseCode::AlreadyStopped => 12,
            ResponseCode::Joined => 20,
            ResponseCode::FullLobby => 21,
            ResponseCode::AlreadyJoined => 22,
            ResponseCode::GameInProgress => 23,
            ResponseCode::InvalidName => 24,
            ResponseCode::Left => 30,
            ResponseCode::PlayerNotFound => 31,
            ResponseCode::Started => 40,
            ResponseCode::Unauthorized => 41,
            ResponseCode::AlreadyStarted => 42,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            ResponseCode::BadRequest => "Bad Request",
            ResponseCode::Stopped => "Stopped",
            ResponseCode::NotStarted => "Not Started",
            ResponseCode::AlreadyStopped => "Already Stopped",
            ResponseCode::Joined => "Joined",
            ResponseCode::FullLobby => "Full Lobby",
            ResponseCode::AlreadyJoined => "Already Joined",
            ResponseCode::GameInProgress => "Already Started",
            ResponseCode::InvalidName => "Invalid Name",
            ResponseCode::Left => "Left",
            ResponseCode::PlayerNotFound => "Player Not Found",
            ResponseCode::Started => "Started",
            ResponseCode::Unauthorized => "Unauthorized",
            ResponseCode::AlreadyStarted => "Already Started",
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.value() == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub body: Option<String>,
}

impl Response {
    pub fn new(code: ResponseCode) -> Self {
        Self { code, body: None }
    }

    pub fn with_body(code: ResponseCode, body: String) -> Self {
        Self {
            code,
            body: Some(body),
        }
    }

    pub fn encode(&self) -> String {
        match &self.body {
            Some(body) => format!("{} {}\n{}", self.code.value(), self.code.text(), body),
            None => format!("{} {}", self.code.value(), self.code.text()),
        }
    }

    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let (status, body) = match frame.split_once('\n') {
            Some((status, body)) => (status, Some(body.to_string())),
            None => (frame, None),
        };

        let code = status
            .split_whitespace()
            .next()
            .and_then(|value| value.parse::<u8>().ok())
            .and_then(ResponseCode::from_value)
            .ok_or_else(|| ProtocolError::MalformedFrame(status.to_string()))?;

        Ok(Self { code, body })
    }

    /// Decodes the ranking carried by a `10 Stopped` response
    pub fn ranking(&self) -> Result<Vec<RankingEntry>, ProtocolError> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| ProtocolError::MalformedFrame("response has no body".to_string()))?;
        serde_json::from_str(body).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }
}

/// Round parameters pushed to every player when a round starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInit {
    pub round: u32,
    #[serde(rename = "pots")]
    pub categories: Vec<String>,
    pub letter: char,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub name: String,
    pub score: u32,
}

/// Unsolicited server-to-client frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Push {
    RoundStarted(RoundInit),
    StoppedBy(String),
    Shutdown,
}

impl Push {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            Push::RoundStarted(init) => {
                let payload = serde_json::to_string(init)
                    .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
                Ok(format!("{}\n{}", ROUND_START_KEYWORD, payload))
            }
            Push::StoppedBy(name) => Ok(format!("{}{}", STOPPED_BY_PREFIX, name)),
            Push::Shutdown => Ok(SHUTDOWN_SENTINEL.to_string()),
        }
    }

    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        if frame == SHUTDOWN_SENTINEL {
            return Ok(Push::Shutdown);
        }
        if let Some(name) = frame.strip_prefix(STOPPED_BY_PREFIX) {
            return Ok(Push::StoppedBy(name.to_string()));
        }
        if let Some((ROUND_START_KEYWORD, payload)) = frame.split_once('\n') {
            let init = serde_json::from_str(payload)
                .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
            return Ok(Push::RoundStarted(init));
        }
        Err(ProtocolError::MalformedFrame(frame.to_string()))
    }
}

/// Anything the server may write to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Response(Response),
    Push(Push),
}

impl ServerFrame {
    /// Responses always start with their numeric code, pushes never do
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        if frame.starts_with(|c: char| c.is_ascii_digit()) {
            Response::parse(frame).map(ServerFrame::Response)
        } else {
            Push::parse(frame).map(ServerFrame::Push)
        }
    }
}

/// Reads the next frame, returning `None` on a clean EOF
///
/// Leading empty lines are skipped. A partial frame cut off by EOF is still
/// returned so a final command written without its terminator is not lost.
/// At most `MAX_FRAME_SIZE` bytes are buffered per frame; a longer frame fails
/// with `FrameError::TooLarge` before the rest of it is read.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<String>, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines: Vec<String> = Vec::new();
    let mut invalid = false;
    let mut total = 0;

    loop {
        let mut line = Vec::new();
        let remaining = (MAX_FRAME_SIZE - total) as u64;
        let count = (&mut *reader)
            .take(remaining + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if count == 0 {
            return finish_frame(lines, invalid);
        }

        total += count;
        if total > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge);
        }

        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if line.is_empty() {
            if lines.is_empty() && !invalid {
                total = 0;
                continue;
            }
            return finish_frame(lines, invalid);
        }

        match String::from_utf8(line) {
            Ok(line) => lines.push(line),
            // keep reading so the stream stays aligned on the terminator
            Err(_) => invalid = true,
        }
    }
}

fn finish_frame(lines: Vec<String>, invalid: bool) -> Result<Option<String>, FrameError> {
    if invalid {
        return Err(ProtocolError::InvalidUtf8.into());
    }
    Ok(if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    })
}

pub async fn write_frame<W>(writer: &mut W, frame: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.write_all(FRAME_TERMINATOR.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_parse_join() {
        let command = Command::parse("JOIN\n  mari  ").unwrap();
        assert_eq!(
            command,
            Command::Join {
                name: "mari".to_string()
            }
        );
    }

    #[test]
    fn test_parse_keyword_is_case_insensitive() {
        assert_eq!(Command::parse("start").unwrap(), Command::Start);
        assert_eq!(Command::parse(" Quit ").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_join_without_payload() {
        assert_eq!(
            Command::parse("JOIN"),
            Err(ProtocolError::MissingPayload("JOIN"))
        );
    }

    #[test]
    fn test_parse_join_blank_name_is_kept_empty() {
        let command = Command::parse("JOIN\n   ").unwrap();
        assert_eq!(
            command,
            Command::Join {
                name: String::new()
            }
        );
    }

    #[test]
    fn test_parse_stop() {
        let command = Command::parse("STOP\n{\"City\":\"Paris\"}").unwrap();
        match command {
            Command::Stop { answers } => {
                assert_eq!(answers.len(), 1);
                assert_eq!(answers.get("City").map(String::as_str), Some("Paris"));
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_stop_rejects_bad_payloads() {
        assert_eq!(
            Command::parse("STOP"),
            Err(ProtocolError::MissingPayload("STOP"))
        );
        assert!(matches!(
            Command::parse("STOP\nnot json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            Command::parse("STOP\n{\"City\": 3}"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert_eq!(
            Command::parse("STOP\n{}\nextra"),
            Err(ProtocolError::TrailingLines("STOP"))
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            Command::parse("DANCE\nnow"),
            Err(ProtocolError::UnknownCommand("DANCE".to_string()))
        );
        assert_eq!(Command::parse(""), Err(ProtocolError::EmptyFrame));
    }

    #[test]
    fn test_command_encode_parses_back() {
        let mut answers = AnswerSheet::new();
        answers.insert("Fruit".to_string(), "Pear".to_string());
        let command = Command::Stop { answers };

        let encoded = command.encode().unwrap();
        assert!(encoded.starts_with("STOP\n"));
        assert_eq!(Command::parse(&encoded).unwrap(), command);
    }

    #[test]
    fn test_response_codes() {
        assert_eq!(ResponseCode::Joined.value(), 20);
        assert_eq!(ResponseCode::GameInProgress.value(), 23);
        assert_eq!(ResponseCode::GameInProgress.text(), "Already Started");
        assert_eq!(ResponseCode::AlreadyStarted.value(), 42);
        assert_eq!(ResponseCode::from_value(31), Some(ResponseCode::PlayerNotFound));
        assert_eq!(ResponseCode::from_value(99), None);
    }

    #[test]
    fn test_response_encoding() {
        assert_eq!(Response::new(ResponseCode::FullLobby).encode(), "21 Full Lobby");
        assert_eq!(Response::new(ResponseCode::BadRequest).encode(), "0 Bad Request");

        let body = r#"[{"name":"ana","score":10}]"#.to_string();
        let response = Response::with_body(ResponseCode::Stopped, body.clone());
        assert_eq!(response.encode(), format!("10 Stopped\n{}", body));
    }

    #[test]
    fn test_response_ranking() {
        let response = Response::parse("10 Stopped\n[{\"name\":\"ana\",\"score\":15}]").unwrap();
        assert_eq!(response.code, ResponseCode::Stopped);

        let ranking = response.ranking().unwrap();
        assert_eq!(
            ranking,
            vec![RankingEntry {
                name: "ana".to_string(),
                score: 15
            }]
        );

        assert!(Response::new(ResponseCode::Left).ranking().is_err());
    }

    #[test]
    fn test_push_frames() {
        let init = RoundInit {
            round: 3,
            categories: vec!["City".to_string(), "Fruit".to_string()],
            letter: 'P',
        };
        let encoded = Push::RoundStarted(init.clone()).encode().unwrap();
        assert!(encoded.starts_with("START\n"));
        assert!(encoded.contains("\"pots\""));
        assert_eq!(Push::parse(&encoded).unwrap(), Push::RoundStarted(init));

        assert_eq!(
            Push::parse("STOPPED BY mari").unwrap(),
            Push::StoppedBy("mari".to_string())
        );
        assert_eq!(Push::parse("ENDC").unwrap(), Push::Shutdown);
        assert!(Push::parse("HELLO").is_err());
    }

    #[test]
    fn test_server_frame_dispatch() {
        assert!(matches!(
            ServerFrame::parse("40 Started"),
            Ok(ServerFrame::Response(Response {
                code: ResponseCode::Started,
                body: None
            }))
        ));
        assert!(matches!(
            ServerFrame::parse("ENDC"),
            Ok(ServerFrame::Push(Push::Shutdown))
        ));
        assert!(ServerFrame::parse("77 Nonsense").is_err());
    }

    #[tokio::test]
    async fn test_read_frames() {
        let mut input: &[u8] = b"\n\nJOIN\r\nmari\r\n\r\nSTART\n\nQUIT";

        let first = assert_ok!(read_frame(&mut input).await);
        assert_eq!(first.as_deref(), Some("JOIN\nmari"));

        let second = assert_ok!(read_frame(&mut input).await);
        assert_eq!(second.as_deref(), Some("START"));

        // unterminated trailing frame is still delivered
        let third = assert_ok!(read_frame(&mut input).await);
        assert_eq!(third.as_deref(), Some("QUIT"));

        let eof = assert_ok!(read_frame(&mut input).await);
        assert_eq!(eof, None);
    }

    #[tokio::test]
    async fn test_read_frame_size_limit() {
        let oversized = format!("JOIN\n{}\n\n", "a".repeat(MAX_FRAME_SIZE));
        let mut input = oversized.as_bytes();
        let result = read_frame(&mut input).await;
        assert!(matches!(result, Err(FrameError::TooLarge)));
    }

    #[tokio::test]
    async fn test_read_frame_gives_up_on_endless_line() {
        let mut endless = tokio::io::BufReader::new(tokio::io::repeat(b'a'));
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            read_frame(&mut endless),
        )
        .await;

        let result = assert_ok!(result);
        assert!(matches!(result, Err(FrameError::TooLarge)));
    }

    #[tokio::test]
    async fn test_read_frame_skipped_blank_lines_do_not_count() {
        let padded = format!("{}START\n\n", "\n".repeat(MAX_FRAME_SIZE * 2));
        let mut input = padded.as_bytes();
        let frame = assert_ok!(read_frame(&mut input).await);
        assert_eq!(frame.as_deref(), Some("START"));
    }

    #[tokio::test]
    async fn test_read_frame_invalid_utf8_keeps_stream_aligned() {
        let mut input: &[u8] = b"JOIN\n\xff\xfe\n\nJOIN\nmari\n\n";

        let bad = read_frame(&mut input).await;
        assert!(matches!(
            bad,
            Err(FrameError::Malformed(ProtocolError::InvalidUtf8))
        ));

        let next = assert_ok!(read_frame(&mut input).await);
        assert_eq!(next.as_deref(), Some("JOIN\nmari"));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut output: Vec<u8> = Vec::new();
        assert_ok!(write_frame(&mut output, "20 Joined").await);
        assert_eq!(output, b"20 Joined\n\n");
    }
}
