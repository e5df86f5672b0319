//! Per-client session state machine.
//!
//! A session starts `Idle`. `SELECT_GAME` loads a program into a fresh core
//! and moves it to `Running`; `EXIT_GAME` moves it back. Every other
//! gameplay message requires `Running`. The session itself is synchronous:
//! the worker owns the timers and calls [`Session::tick`] and
//! [`Session::fire_autosave`] when they fire.

use log::{debug, error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

use super::access::SessionId;
use super::autosave::AutosaveMonitor;
use super::catalog::Catalog;
use super::core::{input_code, CoreError, CoreFactory, EmulationCore};
use super::encoding::{compress_save, decompress_save, encode_indexed, FrameError, SaveError};
use super::protocol::{decode_client, ClientMessage, Inbound, ProtocolError, ServerMessage};
use super::scheduler::InputScheduler;

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No program loaded.
    Idle,
    /// Program loaded and the scheduler ticking.
    Running,
}

/// Recoverable errors, reported to the client as `ERROR{error}`.
///
/// The display text is the exact string the client receives.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid data provided")]
    MalformedMessage(#[source] ProtocolError),
    #[error("No game running")]
    ProtocolViolation,
    #[error("Invalid game index selected")]
    InvalidSelection { index: i64 },
    #[error("Corrupt save data provided")]
    CorruptSave(#[from] SaveError),
    #[error("Failed to load game")]
    Load(#[from] CoreError),
    #[error("Failed to encode save data")]
    SaveEncode(#[source] SaveError),
    #[error("Failed to encode frame")]
    Frame(#[from] FrameError),
}

/// One client's isolated emulation context.
pub struct Session {
    id: SessionId,
    catalog: Arc<Catalog>,
    factory: Arc<dyn CoreFactory>,
    core: Option<Box<dyn EmulationCore>>,
    game_name: Option<String>,
    scheduler: InputScheduler,
    autosave: AutosaveMonitor,
}

impl Session {
    pub fn new(id: SessionId, catalog: Arc<Catalog>, factory: Arc<dyn CoreFactory>) -> Self {
        Self {
            id,
            catalog,
            factory,
            core: None,
            game_name: None,
            scheduler: InputScheduler::new(),
            autosave: AutosaveMonitor::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        if self.scheduler.is_running() {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Name of the most recently loaded program.
    pub fn game_name(&self) -> Option<&str> {
        self.game_name.as_deref()
    }

    pub fn autosave_armed(&self) -> bool {
        self.autosave.is_armed()
    }

    /// Decodes and handles one raw client frame.
    ///
    /// # Returns
    ///
    /// The reply to send, if the message produces one.
    pub fn handle_raw(&mut self, raw: &[u8]) -> Option<ServerMessage> {
        let message = match decode_client(raw) {
            Ok(Inbound::Message(message)) => message,
            Ok(Inbound::Unrecognized(doc)) => {
                if !self.is_running() {
                    return Some(ServerMessage::error(SessionError::ProtocolViolation));
                }
                warn!("Session {}: caught invalid request: {}", self.id, doc);
                return None;
            }
            Err(e) => {
                debug!("Session {}: undecodable frame: {}", self.id, e);
                return Some(ServerMessage::error(SessionError::MalformedMessage(e)));
            }
        };

        match self.handle(message) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Session {}: {:?}", self.id, e);
                Some(ServerMessage::error(e))
            }
        }
    }

    /// Applies one decoded client message.
    pub fn handle(&mut self, message: ClientMessage) -> Result<Option<ServerMessage>, SessionError> {
        match message {
            ClientMessage::SelectGame {
                index,
                save,
                auto_save,
            } => self
                .select_game(index, save.as_deref(), auto_save.unwrap_or(false))
                .map(Some),
            _ if !self.is_running() => Err(SessionError::ProtocolViolation),
            ClientMessage::ExitGame => {
                self.exit_game();
                Ok(Some(ServerMessage::GameExited))
            }
            ClientMessage::GetSave => self.save_data(false).map(Some),
            ClientMessage::PressButton { button } => {
                match input_code(&button) {
                    Some(code) => self.scheduler.press(code),
                    None => warn!("Session {}: unknown button {:?}", self.id, button),
                }
                Ok(None)
            }
            ClientMessage::RequestDraw => self.draw().map(Some),
        }
    }

    fn select_game(
        &mut self,
        index: i64,
        save: Option<&str>,
        auto_save: bool,
    ) -> Result<ServerMessage, SessionError> {
        let entry = usize::try_from(index)
            .ok()
            .and_then(|i| self.catalog.get(i))
            .ok_or(SessionError::InvalidSelection { index })?;
        let name = entry.name.clone();
        let image = Arc::clone(&entry.image);

        let save = save.map(decompress_save).transpose()?;

        let mut core = self.factory.create();
        core.on_battery_write(self.autosave.observer());
        core.load(&image, save.as_deref())?;

        let has_battery = !core.battery_ram().is_empty();
        self.core = Some(core);
        self.game_name = Some(name.clone());

        if self.scheduler.start() {
            debug!("Session {}: scheduler started", self.id);
        }

        if auto_save && has_battery {
            self.autosave.arm();
        } else {
            self.autosave.disarm();
        }

        info!(
            "Session {}: started {:?} (autosave {})",
            self.id,
            name,
            if self.autosave.is_armed() { "on" } else { "off" }
        );
        Ok(ServerMessage::GameStarted { name })
    }

    fn exit_game(&mut self) {
        self.scheduler.stop();
        self.autosave.disarm();
        info!("Session {}: exited {:?}", self.id, self.game_name.as_deref().unwrap_or_default());
    }

    fn save_data(&self, auto: bool) -> Result<ServerMessage, SessionError> {
        let core = self.core.as_ref().ok_or(SessionError::ProtocolViolation)?;
        let data = compress_save(core.battery_ram()).map_err(SessionError::SaveEncode)?;
        Ok(ServerMessage::SaveData {
            game_name: self.game_name.clone().unwrap_or_default(),
            auto,
            data,
        })
    }

    fn draw(&self) -> Result<ServerMessage, SessionError> {
        let core = self.core.as_ref().ok_or(SessionError::ProtocolViolation)?;
        let (width, height) = core.dimensions();
        let frame = encode_indexed(core.read_pixels(), width, height)?;
        Ok(frame.into())
    }

    /// Runs one scheduler tick and records any battery writes it caused.
    pub fn tick(&mut self, now: Instant) {
        if !self.scheduler.is_running() {
            return;
        }
        if let Some(core) = self.core.as_deref_mut() {
            self.scheduler.tick(core);
        }
        self.autosave.poll(now);
    }

    /// When the pending autosave is due, if one is pending.
    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.autosave.deadline()
    }

    /// Takes the autosave snapshot if its quiescence window has elapsed.
    pub fn fire_autosave(&mut self, now: Instant) -> Option<ServerMessage> {
        if !self.autosave.take_due(now) {
            return None;
        }
        match self.save_data(true) {
            Ok(message) => {
                info!("Session {}: autosaved {:?}", self.id, self.game_name.as_deref().unwrap_or_default());
                Some(message)
            }
            Err(e) => {
                error!("Session {}: autosave failed: {}", self.id, e);
                None
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.scheduler.stop();
        self.autosave.disarm();
        debug!("Session {}: released emulation core", self.id);
    }
}
