//! Pattern assistant boundary.
//!
//! The assistant itself is an external text-completion service. This module
//! builds what is sent to it, keeps a bounded conversation history, and turns
//! its free-form replies into either chat text or grid coordinates. Nothing
//! here trusts the coordinates it receives: they are range-checked again by
//! `Grid::bulk_load`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;

use crate::error::{Error, Result};
use crate::pitch::PitchTable;
use crate::sequencer::CellPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Conversation so far, oldest messages dropped first once full.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    messages: VecDeque<ChatMessage>,
    limit: usize,
}

impl ChatHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            messages: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        if self.messages.len() == self.limit {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }
}

/// Instructions for the service: grid dimensions, what note each row plays,
/// the reply format, and the conversation so far.
pub fn system_prompt(grid_size: usize, pitches: &PitchTable, history: &ChatHistory) -> String {
    let notes = pitches
        .names(grid_size)
        .iter()
        .enumerate()
        .map(|(row, name)| format!("Row {} is {}", row, name))
        .collect::<Vec<_>>()
        .join("; ");
    let conversation = history
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a creative music assistant for a {n}x{n} step sequencer.\n\
         Rows are pitches and columns are sixteenth-note steps, both numbered from 0.\n\
         Decide whether the user is asking for a pattern or just chatting.\n\
         For a pattern, reply in two parts:\n\
         1. A short, friendly description of the pattern.\n\
         2. A JSON array of objects with \"row\" and \"column\" fields listing the active tiles only.\n\
         Write nothing after the JSON.\n\
         For anything else, reply normally without JSON.\n\
         Note map: {notes}\n\
         Conversation history:\n\
         {conversation}\n",
        n = grid_size,
        notes = notes,
        conversation = conversation,
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistReply {
    /// Plain conversation, nothing to load
    Chat(String),
    Pattern {
        description: Option<String>,
        cells: Vec<CellPos>,
    },
}

fn json_array() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("static regex"))
}

#[derive(Deserialize)]
struct RawCell {
    row: Option<serde_json::Value>,
    column: Option<serde_json::Value>,
}

fn coordinate(value: Option<serde_json::Value>) -> Option<usize> {
    value?.as_u64().and_then(|v| usize::try_from(v).ok())
}

/// Splits a reply into description and coordinates. Entries without two
/// non-negative integer coordinates are skipped; a JSON array that does not
/// parse at all is an error.
pub fn parse_reply(text: &str) -> Result<AssistReply> {
    let text = text.trim();
    let Some(found) = json_array().find(text) else {
        return Ok(AssistReply::Chat(text.to_string()));
    };

    let raw: Vec<RawCell> = serde_json::from_str(found.as_str())?;
    let total = raw.len();
    let cells: Vec<CellPos> = raw
        .into_iter()
        .filter_map(|c| Some(CellPos::new(coordinate(c.row)?, coordinate(c.column)?)))
        .collect();
    if cells.len() < total {
        log::debug!("skipped {} malformed cells in reply", total - cells.len());
    }

    let description = text[..found.start()].trim();
    Ok(AssistReply::Pattern {
        description: (!description.is_empty()).then(|| description.to_string()),
        cells,
    })
}

/// Something that can answer a conversation with a reply text.
pub trait CompletionService: Send + Sync {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
}

/// Runs an external command per request: `{"messages": [...]}` goes to its
/// stdin, the reply is read from its stdout.
#[derive(Debug, Clone)]
pub struct CommandService {
    program: String,
    args: Vec<String>,
}

impl CommandService {
    /// `None` when `argv` is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl CompletionService for CommandService {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = serde_json::to_vec(&CompletionRequest { messages })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Assist(format!("could not run {}: {}", self.program, e)))?;

        // Fed from its own thread so a child that answers while still reading
        // cannot fill its stdout pipe and stall us.
        let stdin = child.stdin.take();
        let (output, written) = thread::scope(|s| {
            let writer = s.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(&request),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            (output, writer.join())
        });

        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Assist(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(Error::Assist(format!("could not send request to {}: {}", self.program, e)))
            }
            Err(_) => {
                return Err(Error::Assist(format!("request writer for {} panicked", self.program)))
            }
        }

        let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if reply.is_empty() {
            return Err(Error::Assist(format!("{} returned no reply", self.program)));
        }
        Ok(reply)
    }
}

/// Conversation state for one session with the pattern assistant.
#[derive(Debug, Clone)]
pub struct Assistant {
    history: ChatHistory,
}

impl Assistant {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history: ChatHistory::new(history_limit),
        }
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Records the user's request and returns the messages to send.
    pub fn prepare(
        &mut self,
        request: &str,
        grid_size: usize,
        pitches: &PitchTable,
    ) -> Vec<ChatMessage> {
        self.history.push(ChatMessage::new(ChatRole::User, request));
        vec![
            ChatMessage::new(ChatRole::System, system_prompt(grid_size, pitches, &self.history)),
            ChatMessage::new(ChatRole::User, request),
        ]
    }

    /// Interprets the service's reply, remembering it only if it parsed.
    pub fn finish(&mut self, reply: &str) -> Result<AssistReply> {
        let parsed = parse_reply(reply)?;
        self.history
            .push(ChatMessage::new(ChatRole::Assistant, reply.trim()));
        Ok(parsed)
    }

    /// `prepare`, `complete` and `finish` in one blocking call.
    pub fn ask(
        &mut self,
        service: &dyn CompletionService,
        request: &str,
        grid_size: usize,
        pitches: &PitchTable,
    ) -> Result<AssistReply> {
        let messages = self.prepare(request, grid_size, pitches);
        let reply = service.complete(&messages)?;
        self.finish(&reply)
    }
}
