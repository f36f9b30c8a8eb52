//! Engine running as a child process, driven over stdin/stdout.
//!
//! Every command goes out as one line wrapped in `try`/`catch`. The wrapper
//! prints each requested result on a tagged line and finishes with a tagged
//! `OK` or `ERR <message>` line carrying the command's sequence number:
//!
//! ```text
//! @@autumn:V:<value>
//! @@autumn:7:OK
//! @@autumn:8:ERR Undefined function 'nope' for input arguments of type 'double'.
//! ```
//!
//! Untagged stdout is console output and goes to `debug!`; stderr goes to
//! `warn!`.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Engine, RemoteValue};
use crate::error::{BridgeError, Result};

const TAG: &str = "@@autumn:";
const VALUE_TAG: &str = "@@autumn:V:";

/// How to start the engine process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLaunchConfig {
    /// Engine executable.
    pub program: PathBuf,
    /// Start with the desktop (`-desktop`) instead of `-nodesktop`.
    pub desktop: bool,
    /// Additional startup options, passed through unchanged.
    pub extra_args: Vec<String>,
    /// Commands evaluated once after the engine starts.
    pub startup_commands: Vec<String>,
    /// Environment variables to set.
    pub env_vars: HashMap<String, String>,
    /// Working directory of the process.
    pub work_dir: Option<PathBuf>,
    /// Deadline for one evaluation. `None` waits forever.
    #[serde(with = "opt_secs")]
    pub eval_timeout: Option<Duration>,
    /// Time allowed for a clean exit before the process is killed.
    #[serde(with = "secs")]
    pub stop_timeout: Duration,
}

impl Default for EngineLaunchConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("matlab"),
            desktop: false,
            extra_args: vec!["-nosplash".to_string()],
            startup_commands: Vec::new(),
            env_vars: HashMap::new(),
            work_dir: None,
            eval_timeout: None,
            stop_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineLaunchConfig {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_desktop(mut self, desktop: bool) -> Self {
        self.desktop = desktop;
        self
    }

    /// Set extra arguments.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Add an extra argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn with_startup_command(mut self, command: impl Into<String>) -> Self {
        self.startup_commands.push(command.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout = Some(timeout);
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    fn args(&self) -> Vec<String> {
        let mode = if self.desktop { "-desktop" } else { "-nodesktop" };
        std::iter::once(mode.to_string())
            .chain(self.extra_args.iter().cloned())
            .collect()
    }
}

/// A line read from the engine.
#[derive(Debug, PartialEq)]
enum Line {
    Value(String),
    Ok(u64),
    Err(u64, String),
    Console(String),
}

fn parse_line(line: &str) -> Line {
    // The interactive prompt may be printed in front of the tag.
    let Some(start) = line.find(TAG) else {
        return Line::Console(line.to_string());
    };
    let rest = &line[start + TAG.len()..];
    if let Some(value) = rest.strip_prefix("V:") {
        return Line::Value(value.to_string());
    }
    let Some((seq, status)) = rest.split_once(':') else {
        return Line::Console(line.to_string());
    };
    let Ok(seq) = seq.parse() else {
        return Line::Console(line.to_string());
    };
    match status.split_once(' ') {
        _ if status == "OK" => Line::Ok(seq),
        Some(("ERR", message)) => Line::Err(seq, message.to_string()),
        _ if status == "ERR" => Line::Err(seq, String::new()),
        _ => Line::Console(line.to_string()),
    }
}

/// Wrap `command` so its results and outcome come back tagged.
///
/// Nothing the wrapper binds outlives the command, whether it succeeds or
/// fails.
fn wrap_command(command: &str, result_count: usize, seq: u64) -> String {
    let vars: Vec<String> = (0..result_count).map(|i| format!("autumn_r{i}")).collect();
    let mut line = String::from("try, ");
    if vars.is_empty() {
        line.push_str(command);
        line.push_str("; ");
    } else {
        line.push_str(&format!("[{}] = {}; ", vars.join(", "), command));
        for var in &vars {
            line.push_str(&format!(
                "fprintf('{VALUE_TAG}%s\\n', mat2str({var}, 17)); "
            ));
        }
        line.push_str(&format!("clear {}; ", vars.join(" ")));
    }
    line.push_str(&format!(
        "fprintf('{TAG}{seq}:OK\\n'); catch autumn_e, \
         fprintf('{TAG}{seq}:ERR %s\\n', strrep(autumn_e.message, char(10), ' ')); \
         clear autumn_e{}; end",
        vars.iter().map(|v| format!(" {v}")).collect::<String>()
    ));
    line
}

/// An engine child process.
pub struct ProcessEngine {
    program: String,
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    seq: u64,
    eval_timeout: Option<Duration>,
    stop_timeout: Duration,
}

impl ProcessEngine {
    /// Start the engine and run the configured startup commands.
    pub fn launch(config: &EngineLaunchConfig) -> Result<Self> {
        let program = config.program.display().to_string();
        let mut cmd = Command::new(&config.program);
        cmd.args(config.args());
        if let Some(dir) = &config.work_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!("Launching engine {}", program);
        let mut child = cmd.spawn().map_err(|e| BridgeError::Launch {
            program: program.clone(),
            message: e.to_string(),
        })?;
        let launch_err = |what: &str| BridgeError::Launch {
            program: program.clone(),
            message: format!("{what} is not piped"),
        };
        let stdin = child.stdin.take().ok_or_else(|| launch_err("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| launch_err("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| launch_err("stderr"))?;

        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                warn!("engine stderr: {}", line);
            }
        });

        info!("Engine started with PID {}", child.id());
        let mut engine = Self {
            program,
            child,
            stdin,
            lines,
            seq: 0,
            eval_timeout: config.eval_timeout,
            stop_timeout: config.stop_timeout,
        };
        for command in &config.startup_commands {
            engine.evaluate(command, 0)?;
        }
        Ok(engine)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    fn next_line(&self, deadline: Option<Instant>) -> Result<String> {
        match deadline {
            None => self.lines.recv().map_err(|_| BridgeError::EngineClosed),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                self.lines.recv_timeout(left).map_err(|e| match e {
                    RecvTimeoutError::Timeout => {
                        BridgeError::Timeout(self.eval_timeout.unwrap_or_default())
                    }
                    RecvTimeoutError::Disconnected => BridgeError::EngineClosed,
                })
            }
        }
    }
}

impl Engine for ProcessEngine {
    fn evaluate(&mut self, command: &str, result_count: usize) -> Result<Vec<RemoteValue>> {
        if command.contains('\n') {
            return Err(BridgeError::Validation {
                field: "command".to_string(),
                message: "commands must fit on one line".to_string(),
            });
        }
        self.seq += 1;
        let seq = self.seq;
        let line = wrap_command(command, result_count, seq);
        debug!("eval #{}: {}", seq, command);
        writeln!(self.stdin, "{line}")
            .and_then(|_| self.stdin.flush())
            .map_err(|_| BridgeError::EngineClosed)?;

        let deadline = self.eval_timeout.map(|t| Instant::now() + t);
        let mut values = Vec::with_capacity(result_count);
        loop {
            match parse_line(&self.next_line(deadline)?) {
                Line::Value(v) => values.push(RemoteValue::new(v)),
                Line::Ok(n) if n == seq => return Ok(values),
                Line::Err(n, message) if n == seq => {
                    return Err(BridgeError::RemoteEvaluation {
                        command: command.to_string(),
                        message,
                    })
                }
                // Late answer to a command that timed out earlier.
                Line::Ok(_) | Line::Err(..) => values.clear(),
                Line::Console(text) => debug!("engine: {}", text),
            }
        }
    }

    fn quit(&mut self) -> Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        info!("Stopping engine {} (PID {})", self.program, self.child.id());
        // A closed pipe just means the process is already on its way out.
        let _ = writeln!(self.stdin, "exit").and_then(|_| self.stdin.flush());

        let start = Instant::now();
        while start.elapsed() < self.stop_timeout {
            if self.child.try_wait()?.is_some() {
                info!("Engine exited");
                return Ok(());
            }
            thread::sleep(Duration::from_millis(50));
        }
        warn!(
            "Engine did not exit within {:?}, killing it",
            self.stop_timeout
        );
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
