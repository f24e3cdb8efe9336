use super::{ConfigureOutcome, Engine, EngineError, EngineLauncher};
use crate::game::board::Position;
use chess::ChessMove;
use fxhash::FxHashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const QUIT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Starts one UCI engine process per `launch`.
#[derive(Debug, Clone)]
pub struct UciLauncher {
    path: PathBuf,
    move_timeout_margin: Duration,
}

impl UciLauncher {
    pub fn new<P: AsRef<Path>>(path: P, move_timeout_margin: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            move_timeout_margin,
        }
    }
}

impl EngineLauncher for UciLauncher {
    fn launch(&self) -> Result<Box<dyn Engine>, EngineError> {
        let engine = UciEngine::start(&self.path, self.move_timeout_margin)?;
        Ok(Box::new(engine))
    }
}

/// A UCI engine running as a child process.
///
/// Output lines are pumped by a reader thread into a channel so every wait can
/// be bounded by a deadline instead of blocking on a dead or stuck process.
pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    options: FxHashSet<String>,
    move_timeout_margin: Duration,
    ready: bool,
    stopped: bool,
}

impl UciEngine {
    pub fn start(path: &Path, move_timeout_margin: Duration) -> Result<Self, EngineError> {
        Self::spawn(Command::new(path), move_timeout_margin)
    }

    pub fn spawn(mut command: Command, move_timeout_margin: Duration) -> Result<Self, EngineError> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Exited);
        };

        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });

        let mut engine = Self {
            child,
            stdin,
            lines: receiver,
            options: FxHashSet::default(),
            move_timeout_margin,
            ready: false,
            stopped: false,
        };

        // Dropping `engine` on a failed handshake reaps the process
        engine.handshake()?;
        Ok(engine)
    }

    fn handshake(&mut self) -> Result<(), EngineError> {
        self.send("uci")?;

        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        loop {
            let line = self.next_line(deadline, "uciok")?;
            if line.trim() == "uciok" {
                break;
            }
            if let Some(name) = parse_option_name(&line) {
                self.options.insert(name.to_lowercase());
            }
        }

        log::trace!("Engine advertises {} options", self.options.len());
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<(), EngineError> {
        log::trace!("> {}", command);
        writeln!(self.stdin, "{}", command)?;
        self.stdin.flush()?;
        Ok(())
    }

    fn next_line(&self, deadline: Instant, waiting_for: &'static str) -> Result<String, EngineError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.lines.recv_timeout(remaining) {
            Ok(line) => {
                log::trace!("< {}", line);
                Ok(line)
            }
            Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout(waiting_for)),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::Exited),
        }
    }

    fn ensure_ready(&mut self) -> Result<(), EngineError> {
        if self.ready {
            return Ok(());
        }

        self.send("ucinewgame")?;
        self.send("isready")?;

        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        while self.next_line(deadline, "readyok")?.trim() != "readyok" {}

        self.ready = true;
        Ok(())
    }
}

impl Engine for UciEngine {
    fn configure(&mut self, name: &str, value: i64) -> ConfigureOutcome {
        if !self.options.contains(&name.to_lowercase()) {
            return ConfigureOutcome::Ignored(format!("option {} is not supported", name));
        }

        match self.send(&format!("setoption name {} value {}", name, value)) {
            Ok(()) => ConfigureOutcome::Applied,
            Err(e) => ConfigureOutcome::Ignored(e.to_string()),
        }
    }

    fn request_move(&mut self, position: &Position, budget: Duration) -> Result<ChessMove, EngineError> {
        self.ensure_ready()?;

        if position.moves().is_empty() {
            self.send("position startpos")?;
        } else {
            self.send(&format!("position startpos moves {}", position.uci_moves()))?;
        }
        self.send(&format!("go movetime {}", budget.as_millis()))?;

        let deadline = Instant::now() + budget + self.move_timeout_margin;
        loop {
            let line = self.next_line(deadline, "bestmove")?;
            let mut parts = line.split_whitespace();
            if parts.next() != Some("bestmove") {
                continue;
            }

            return match parts.next() {
                None | Some("(none)") | Some("0000") => Err(EngineError::NoMove),
                Some(notation) => position
                    .parse_uci_move(notation)
                    .ok_or_else(|| EngineError::IllegalMove(notation.to_string())),
            };
        }
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let _ = self.send("quit");

        let deadline = Instant::now() + QUIT_GRACE_PERIOD;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                _ => break,
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `option name Move Overhead type spin ...` -> `Move Overhead`
fn parse_option_name(line: &str) -> Option<String> {
    let parts = line.split_whitespace().collect::<Vec<_>>();

    match parts.as_slice() {
        ["option", "name", rest @ ..] => {
            let end = rest.iter().position(|&part| part == "type").unwrap_or(rest.len());
            let name = rest[..end].join(" ");
            (!name.is_empty()).then_some(name)
        }
        _ => None,
    }
}
