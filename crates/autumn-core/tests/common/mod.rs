//! In-process stand-in for the engine.
//!
//! Interprets the handful of commands the bridge emits against an in-memory
//! workspace. Payload files are read and written with the real `MatCodec`,
//! and stub files are read from disk and executed line by line (each line
//! is recorded in the command log after the invocation that ran it).

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use autumn_bridge::{
    Array, ArrayData, BridgeConfig, BridgeError, Engine, MatCodec, PayloadCodec, RemoteValue,
    Result, StructArray, Value,
};
use tempfile::TempDir;

type Routine = Box<dyn Fn(&[Value]) -> std::result::Result<Vec<Value>, String> + Send>;

pub struct FakeEngine {
    cwd: PathBuf,
    pub workspace: BTreeMap<String, Value>,
    routines: HashMap<String, Routine>,
    pub commands: Arc<Mutex<Vec<String>>>,
    pub quit: Arc<AtomicBool>,
}

impl FakeEngine {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            workspace: BTreeMap::new(),
            routines: HashMap::new(),
            commands: Arc::new(Mutex::new(Vec::new())),
            quit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Engine with `add1`, `sortAscending`, `swap` and `fails` defined.
    pub fn with_standard_routines(cwd: impl Into<PathBuf>) -> Self {
        let mut engine = Self::new(cwd);
        engine.define("add1", |args| {
            let a = numeric(&args[0])?;
            let data = a.to_f64_vec().iter().map(|x| x + 1.0).collect();
            let out = Array::new(a.shape().to_vec(), ArrayData::F64(data)).map_err(|e| e.to_string())?;
            Ok(vec![Value::Array(out)])
        });
        engine.define("sortAscending", |args| {
            let mut v = numeric(&args[0])?.to_f64_vec();
            v.sort_by(|a, b| a.total_cmp(b));
            let n = v.len();
            let out = Array::new(vec![1, n], ArrayData::F64(v)).map_err(|e| e.to_string())?;
            Ok(vec![Value::Array(out)])
        });
        engine.define("swap", |args| Ok(vec![args[1].clone(), args[0].clone()]));
        engine.define("fails", |_| Err("Intentional failure".to_string()));
        engine
    }

    pub fn define<F>(&mut self, name: &str, routine: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Vec<Value>, String> + Send + 'static,
    {
        self.routines.insert(name.to_string(), Box::new(routine));
    }

    pub fn command_log(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn fail(command: &str, message: impl Into<String>) -> BridgeError {
        BridgeError::RemoteEvaluation {
            command: command.to_string(),
            message: message.into(),
        }
    }

    fn execute(&mut self, command: &str, result_count: usize) -> Result<Vec<RemoteValue>> {
        let line = command.trim().trim_end_matches(';').trim();

        if let Some(path) = line.strip_prefix("cd('").and_then(|r| r.strip_suffix("')")) {
            self.cwd = PathBuf::from(path.replace("''", "'"));
            return Ok(Vec::new());
        }
        if let Some(name) = line.strip_prefix("exist('").and_then(|r| r.strip_suffix("')")) {
            let found = if self.workspace.contains_key(name) { "1" } else { "0" };
            return Ok(vec![RemoteValue::new(found); result_count.max(1)]);
        }
        if let Some(file) = line.strip_prefix("load ") {
            let bytes = std::fs::read(self.cwd.join(file.trim()))
                .map_err(|e| Self::fail(command, format!("Unable to read file '{file}': {e}")))?;
            let ws = MatCodec::new()
                .decode(&bytes, false)
                .map_err(|e| Self::fail(command, e.to_string()))?;
            self.workspace.extend(ws);
            return Ok(Vec::new());
        }
        if let Some(rest) = line.strip_prefix("save ") {
            let mut parts = rest.split_whitespace();
            let file = parts.next().unwrap_or_default().to_string();
            let mut vars = Vec::new();
            for name in parts {
                let value = self
                    .workspace
                    .get(name)
                    .ok_or_else(|| Self::fail(command, format!("Variable '{name}' not found.")))?;
                vars.push((name.to_string(), value.clone()));
            }
            let bytes = MatCodec::new()
                .encode(&vars)
                .map_err(|e| Self::fail(command, e.to_string()))?;
            std::fs::write(self.cwd.join(file), bytes)?;
            return Ok(Vec::new());
        }
        if let Some(rest) = line.strip_prefix("clear ") {
            for name in rest.split_whitespace() {
                self.workspace.remove(name);
            }
            return Ok(Vec::new());
        }
        if line == "whos" {
            return Ok(Vec::new());
        }
        if let Some(rest) = line.strip_prefix('[') {
            let (targets, expr) = rest
                .split_once("] =")
                .ok_or_else(|| Self::fail(command, "Parse error"))?;
            let targets: Vec<&str> = targets.split(',').map(str::trim).collect();
            let values = self.evaluate_expr(command, expr.trim())?;
            if values.len() < targets.len() {
                return Err(Self::fail(command, "Too many output arguments."));
            }
            for (target, value) in targets.into_iter().zip(values) {
                self.workspace.insert(target.to_string(), value);
            }
            return Ok(Vec::new());
        }
        if line.contains('(') {
            self.evaluate_expr(command, line)?;
            return Ok(Vec::new());
        }
        self.run_stub(command, line)
    }

    fn evaluate_expr(&mut self, command: &str, expr: &str) -> Result<Vec<Value>> {
        let (name, rest) = expr
            .split_once('(')
            .ok_or_else(|| Self::fail(command, "Parse error"))?;
        let args: Vec<Value> = rest
            .trim_end_matches(')')
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| {
                self.workspace
                    .get(a)
                    .cloned()
                    .ok_or_else(|| Self::fail(command, format!("Undefined variable '{a}'.")))
            })
            .collect::<Result<_>>()?;

        match name.trim() {
            "whos" => {
                let mut listing = StructArray::new(vec!["name".to_string(), "class".to_string()]);
                for (var, value) in &self.workspace {
                    listing.push(vec![Value::from(var.as_str()), Value::from(value.kind())])?;
                }
                Ok(vec![Value::Struct(listing)])
            }
            "size" => {
                let dims = size_of(&args[0]);
                let n = dims.len();
                let out = Array::new(vec![1, n], ArrayData::F64(dims))?;
                Ok(vec![Value::Array(out)])
            }
            routine => match self.routines.get(routine) {
                Some(f) => f(&args).map_err(|e| Self::fail(command, e)),
                None => Err(Self::fail(
                    command,
                    format!("Undefined function '{routine}' for input arguments."),
                )),
            },
        }
    }

    fn run_stub(&mut self, command: &str, routine: &str) -> Result<Vec<RemoteValue>> {
        let path = self.cwd.join(format!("{routine}.m"));
        let source = std::fs::read_to_string(&path).map_err(|_| {
            Self::fail(command, format!("Undefined function or variable '{routine}'."))
        })?;
        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') || line.starts_with("function") || line == "end" {
                continue;
            }
            self.commands.lock().unwrap().push(line.to_string());
            self.execute(line, 0)?;
        }
        Ok(Vec::new())
    }
}

impl Engine for FakeEngine {
    fn evaluate(&mut self, command: &str, result_count: usize) -> Result<Vec<RemoteValue>> {
        self.commands.lock().unwrap().push(command.to_string());
        self.execute(command, result_count)
    }

    fn quit(&mut self) -> Result<()> {
        self.quit.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn numeric(value: &Value) -> std::result::Result<Array, String> {
    match value {
        Value::Array(a) => Ok(a.clone()),
        Value::Float(f) => Array::new(vec![1, 1], ArrayData::F64(vec![*f])).map_err(|e| e.to_string()),
        other => Err(format!("Undefined function for input of type {}", other.kind())),
    }
}

fn size_of(value: &Value) -> Vec<f64> {
    let dims: Vec<usize> = match value {
        Value::Array(a) => match a.shape() {
            [] => vec![1, 1],
            [n] => vec![1, *n],
            shape => shape.to_vec(),
        },
        Value::Text(s) if s.is_empty() => vec![0, 0],
        Value::Text(s) => vec![1, s.chars().count()],
        Value::Cell(items) => vec![1, items.len()],
        Value::Struct(s) => vec![s.len(), 1],
        _ => vec![1, 1],
    };
    dims.into_iter().map(|d| d as f64).collect()
}

/// Temp work dir plus a config pointing at it.
pub fn test_env() -> (TempDir, BridgeConfig) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let config = BridgeConfig::new()
        .with_instance_id("test")
        .with_work_dir(temp.path());
    (temp, config)
}

/// Files left in the work dir, sorted.
pub fn leftover_files(temp: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
