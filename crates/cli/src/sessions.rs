//! Named chat sessions for the interactive mode.
//!
//! Each session keeps its own history of user and assistant turns. Tool
//! exchanges stay inside the run that produced them.

use policy_agent_core::message::{Conversation, Message};

/// Always present, cannot be deleted.
pub const DEFAULT_SESSION: &str = "默认会话";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session name must not be empty")]
    EmptyName,

    #[error("session '{0}' already exists")]
    AlreadyExists(String),

    #[error("no session named '{0}'")]
    NotFound(String),

    #[error("the default session cannot be deleted")]
    CannotDeleteDefault,
}

struct Session {
    name: String,
    history: Conversation,
}

impl Session {
    fn new(name: &str) -> Self {
        let mut history = Conversation::new();
        history.title = Some(name.to_string());
        Self {
            name: name.to_string(),
            history,
        }
    }
}

/// Sessions in creation order, one of them current.
pub struct SessionStore {
    sessions: Vec<Session>,
    current: String,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: vec![Session::new(DEFAULT_SESSION)],
            current: DEFAULT_SESSION.to_string(),
        }
    }

    pub fn current_name(&self) -> &str {
        &self.current
    }

    /// History of the current session.
    pub fn history(&self) -> &Conversation {
        &self.find(&self.current).history
    }

    pub fn names(&self) -> Vec<&str> {
        self.sessions.iter().map(|s| s.name.as_str()).collect()
    }

    /// Create a session and make it current.
    pub fn create(&mut self, name: &str) -> Result<(), SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        if self.contains(name) {
            return Err(SessionError::AlreadyExists(name.to_string()));
        }
        self.sessions.push(Session::new(name));
        self.current = name.to_string();
        Ok(())
    }

    pub fn switch(&mut self, name: &str) -> Result<(), SessionError> {
        let name = name.trim();
        if !self.contains(name) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        self.current = name.to_string();
        Ok(())
    }

    /// Delete a session. Deleting the current one switches back to the default.
    pub fn delete(&mut self, name: &str) -> Result<(), SessionError> {
        let name = name.trim();
        if name == DEFAULT_SESSION {
            return Err(SessionError::CannotDeleteDefault);
        }
        let Some(index) = self.sessions.iter().position(|s| s.name == name) else {
            return Err(SessionError::NotFound(name.to_string()));
        };
        self.sessions.remove(index);
        if self.current == name {
            self.current = DEFAULT_SESSION.to_string();
        }
        Ok(())
    }

    /// Append a completed turn to the current session.
    pub fn record_turn(&mut self, user: &str, answer: &str) {
        let current = self.current.clone();
        if let Some(session) = self.sessions.iter_mut().find(|s| s.name == current) {
            session.history.push(Message::user(user));
            session.history.push(Message::assistant(answer));
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.sessions.iter().any(|s| s.name == name)
    }

    fn find(&self, name: &str) -> &Session {
        // The current name always refers to a live session, and the default
        // session is never removed.
        self.sessions
            .iter()
            .find(|s| s.name == name)
            .unwrap_or(&self.sessions[0])
    }
}

/// One line of input in the interactive mode.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Help,
    List,
    New(String),
    Switch(String),
    Delete(Vec<String>),
    Message(String),
    Empty,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Self::Exit;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let (command, arg) = match rest.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (rest, ""),
        };

        match command {
            "help" => Self::Help,
            "sessions" => Self::List,
            "exit" | "quit" => Self::Exit,
            "new" => Self::New(arg.to_string()),
            "switch" => Self::Switch(arg.to_string()),
            "delete" => Self::Delete(arg.split_whitespace().map(str::to_string).collect()),
            other => Self::Unknown(other.to_string()),
        }
    }
}

pub const HELP: &str = "\
  /new NAME          创建并切换到新会话
  /switch NAME       切换会话
  /delete NAME...    删除会话（默认会话不可删除）
  /sessions          列出所有会话
  /help              显示帮助
  exit | quit        退出
  Ctrl+C             取消正在进行的回答";
