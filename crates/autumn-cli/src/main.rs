//! Autumn CLI - drive an engine through autumn-bridge from the shell.
//!
//! Each invocation starts an engine, runs one command against it, prints the
//! result as JSON on stdout and shuts the engine down.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use autumn_bridge::{Bridge, CallOptions, ErrorPolicy, Value};
use clap::{Parser, Subcommand};
use serde_json::Value as Json;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "autumn")]
#[command(about = "Call engine routines and inspect the engine workspace")]
struct Args {
    /// JSON config file with `bridge` and `engine` sections
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine executable (overrides the config file)
    #[arg(long)]
    program: Option<PathBuf>,

    /// Start the engine with its desktop
    #[arg(long)]
    desktop: bool,

    /// Directory shared with the engine (defaults to the current directory)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Instance id used to scope artifact names
    #[arg(long)]
    id: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Call a routine; arguments are JSON values
    Call {
        routine: String,
        args: Vec<String>,
        /// Number of results
        #[arg(short, long, default_value = "1")]
        nargout: usize,
        /// Reusable token; the stub is kept unless --delete is given
        #[arg(long)]
        token: Option<String>,
        /// Remove the stub afterwards even with a token
        #[arg(long)]
        delete: bool,
        /// Print nulls instead of failing when the call fails
        #[arg(long)]
        lenient: bool,
    },
    /// Evaluate a command; with --nargout its results come back as JSON
    Eval {
        command: String,
        #[arg(short, long, default_value = "0")]
        nargout: usize,
    },
    /// Print a workspace variable
    Get { name: String },
    /// Set a workspace variable from a JSON value
    Set { name: String, value: String },
    /// List workspace variable names
    List,
    /// Print the dimensions of a workspace variable
    Shape { name: String },
    /// Show the engine's workspace listing
    Show,
}

fn parse_value(text: &str) -> Result<Value> {
    let json: Json =
        serde_json::from_str(text).with_context(|| format!("Invalid JSON argument: {text}"))?;
    Ok(Value::from_json(&json)?)
}

fn optional_json(value: Option<Value>) -> Json {
    value.map(|v| v.to_json()).unwrap_or(Json::Null)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    if let Some(program) = args.program {
        config.engine.program = program;
    }
    if args.desktop {
        config.engine.desktop = true;
    }
    if let Some(dir) = args.work_dir {
        config.bridge.work_dir = Some(dir);
    }
    if let Some(id) = args.id {
        config.bridge.instance_id = Some(id);
    }
    debug!("Config: {:?}", config);

    info!("Starting engine {}", config.engine.program.display());
    let mut bridge = Bridge::launch(config.bridge, &config.engine)?;

    let output = match args.command {
        Cmd::Call {
            routine,
            args: raw_args,
            nargout,
            token,
            delete,
            lenient,
        } => {
            let values = raw_args
                .iter()
                .map(|a| parse_value(a))
                .collect::<Result<Vec<_>>>()?;
            let mut options = CallOptions::new().with_result_count(nargout);
            if let Some(token) = token {
                options = options.with_token(token);
            }
            if delete {
                options = options.with_delete(true);
            }
            if lenient {
                options = options.with_error_policy(ErrorPolicy::Lenient);
            }
            let out = bridge.call(&routine, &values, &options)?;
            if nargout == 1 {
                optional_json(out.into_single())
            } else {
                Json::Array(out.into_vec().into_iter().map(optional_json).collect())
            }
        }
        Cmd::Eval { command, nargout } => {
            if nargout == 0 {
                bridge.raw_eval(&command, 0)?;
                Json::Null
            } else {
                let values = bridge.eval_with_payload(&command, nargout)?;
                Json::Array(values.iter().map(Value::to_json).collect())
            }
        }
        Cmd::Get { name } => bridge.get(&name)?.to_json(),
        Cmd::Set { name, value } => {
            bridge.set(&name, parse_value(&value)?)?;
            Json::Null
        }
        Cmd::List => Json::from(bridge.list_names()?),
        Cmd::Shape { name } => Json::from(bridge.shape_of(&name)?),
        Cmd::Show => {
            bridge.show()?;
            Json::Null
        }
    };

    bridge.close()?;

    // Results go to stdout; logs go to stderr
    if !output.is_null() {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}
