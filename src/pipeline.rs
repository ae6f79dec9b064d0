//! Command queue handed to pipeline and transaction bodies.

use crate::command::Command;

/// Commands queued by a `pipelined`/`multi` body, in call order.
///
/// Nothing is sent while the body runs; replies come back as a `Vec` in the
/// same order once the whole batch has been flushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue any command.
    pub fn add(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn get(&mut self, key: impl AsRef<[u8]>) -> &mut Self {
        self.add(Command::get(key))
    }

    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        self.add(Command::set(key, value))
    }

    pub fn setex(
        &mut self,
        key: impl AsRef<[u8]>,
        seconds: u64,
        value: impl AsRef<[u8]>,
    ) -> &mut Self {
        self.add(Command::setex(key, seconds, value))
    }

    pub fn del(&mut self, key: impl AsRef<[u8]>) -> &mut Self {
        self.add(Command::del([key]))
    }

    pub fn unlink(&mut self, key: impl AsRef<[u8]>) -> &mut Self {
        self.add(Command::unlink([key]))
    }

    pub fn expire(&mut self, key: impl AsRef<[u8]>, seconds: u64) -> &mut Self {
        self.add(Command::expire(key, seconds))
    }

    pub fn incr(&mut self, key: impl AsRef<[u8]>) -> &mut Self {
        self.add(Command::incr(key))
    }

    pub fn sadd(&mut self, key: impl AsRef<[u8]>, member: impl AsRef<[u8]>) -> &mut Self {
        self.add(Command::sadd(key, [member]))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

impl From<Vec<Command>> for Pipeline {
    fn from(commands: Vec<Command>) -> Self {
        Self { commands }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
