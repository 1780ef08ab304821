//! Subcommand definitions and implementations.
//!
//! Each subcommand maps onto one engine operation. Payload output (cached
//! values) is written raw; bookkeeping output is pretty-printed JSON.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use clap::{Parser, Subcommand};
use memocache_core::cache::hash::namespaced_key;
use memocache_core::{CacheEngine, Error};
use serde::{Deserialize, Serialize};

/// memocache - persistent get-or-compute cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Store file path (overrides MEMOCACHE_DB_PATH and the config file)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Namespace tag prefixed to every key, e.g. an output mode like "svg"
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the cached value for KEY to stdout; fails with CACHE_MISS if absent
    Get { key: String },

    /// Store a value under KEY, read from FILE or stdin
    Put {
        key: String,

        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Remove KEY from the cache
    Expire { key: String },

    /// Run PROGRAM and memoize its stdout under KEY
    Exec {
        key: String,

        /// Expire the entry first so PROGRAM always runs
        #[arg(long)]
        refresh: bool,

        #[arg(last = true, required = true, value_name = "PROGRAM")]
        program: Vec<String>,
    },

    /// Print store statistics as JSON
    Stats,

    /// Delete every entry
    Clear,
}

/// Errors surfaced by subcommands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Cache(#[from] Error),

    #[error("failed to read value: {0}")]
    Input(#[source] io::Error),

    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),

    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}; nothing cached")]
    Failed { program: String, status: ExitStatus },
}

/// Output of the expire subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireOutput {
    pub key: String,
    pub removed: bool,
}

/// Output of the clear subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearOutput {
    pub deleted: u64,
}

impl Cli {
    fn scoped(&self, key: &str) -> String {
        match &self.namespace {
            Some(namespace) => namespaced_key(namespace, key),
            None => key.to_string(),
        }
    }
}

/// Execute the parsed command against `engine`.
pub fn run<R: Read, W: Write>(engine: &CacheEngine, cli: &Cli, input: &mut R, out: &mut W) -> Result<(), CommandError> {
    match &cli.command {
        Command::Get { key } => {
            let key = cli.scoped(key);
            let value: Vec<u8> = engine.get(&key, || Err(Error::CacheMiss(key.clone())))?;
            out.write_all(&value).map_err(CommandError::Output)
        }
        Command::Put { key, file } => {
            let value = match file {
                Some(path) => fs::read(path).map_err(CommandError::Input)?,
                None => {
                    let mut buf = Vec::new();
                    input.read_to_end(&mut buf).map_err(CommandError::Input)?;
                    buf
                }
            };
            let size = value.len();
            engine.put(&cli.scoped(key), value)?;
            tracing::info!(size, "stored value");
            Ok(())
        }
        Command::Expire { key } => {
            let removed = engine.expire(&cli.scoped(key))?;
            write_json(out, &ExpireOutput { key: key.clone(), removed })
        }
        Command::Exec { key, refresh, program } => {
            let key = cli.scoped(key);
            if *refresh {
                engine.expire(&key)?;
            }
            let stdout: Vec<u8> = engine.get(&key, || run_program(program))?;
            out.write_all(&stdout).map_err(CommandError::Output)
        }
        Command::Stats => write_json(out, &engine.stats()?),
        Command::Clear => {
            let deleted = engine.clear()?;
            write_json(out, &ClearOutput { deleted })
        }
    }
}

fn run_program(argv: &[String]) -> Result<Vec<u8>, CommandError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(Error::InvalidInput("no program given".into()).into());
    };

    tracing::debug!(program = %program, args = ?args, "cache miss, running program");
    let output = std::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| CommandError::Spawn { program: program.clone(), source })?;

    if !output.status.success() {
        return Err(CommandError::Failed { program: program.clone(), status: output.status });
    }
    Ok(output.stdout)
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), CommandError> {
    let json = serde_json::to_string_pretty(value)?;
    writeln!(out, "{json}").map_err(CommandError::Output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use memocache_core::CacheConfig;

    fn engine(dir: &tempfile::TempDir) -> CacheEngine {
        CacheEngine::new(&CacheConfig::at(dir.path().join("cache.db"))).unwrap()
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("memocache").chain(args.iter().copied())).unwrap()
    }

    fn run_with(engine: &CacheEngine, args: &[&str], stdin: &[u8]) -> Result<Vec<u8>, CommandError> {
        let cli = parse(args);
        let mut input = stdin;
        let mut out = Vec::new();
        run(engine, &cli, &mut input, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_exec() {
        let cli = parse(&["--namespace", "svg", "exec", "diagram", "--refresh", "--", "plantuml", "-tsvg"]);
        match cli.command {
            Command::Exec { key, refresh, program } => {
                assert_eq!(key, "diagram");
                assert!(refresh);
                assert_eq!(program, vec!["plantuml".to_string(), "-tsvg".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.namespace.as_deref(), Some("svg"));
    }

    #[test]
    fn test_exec_requires_program() {
        let result = Cli::try_parse_from(["memocache", "exec", "k"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = engine(&dir);

        run_with(&cache, &["put", "k"], b"\x00binary\xff").unwrap();
        let out = run_with(&cache, &["get", "k"], b"").unwrap();
        assert_eq!(out, b"\x00binary\xff".to_vec());
    }

    #[test]
    fn test_put_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = engine(&dir);
        let payload = dir.path().join("payload.svg");
        fs::write(&payload, "<svg/>").unwrap();

        run_with(&cache, &["put", "k", "--file", payload.to_str().unwrap()], b"").unwrap();
        assert_eq!(run_with(&cache, &["get", "k"], b"").unwrap(), b"<svg/>".to_vec());
    }

    #[test]
    fn test_get_miss_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = engine(&dir);

        let result = run_with(&cache, &["get", "absent"], b"");
        assert!(matches!(result, Err(CommandError::Cache(Error::CacheMiss(_)))));
        assert_eq!(cache.stats().unwrap().entries, 0);
    }

    #[test]
    fn test_namespaces_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = engine(&dir);

        run_with(&cache, &["-n", "img", "put", "k"], b"png").unwrap();
        run_with(&cache, &["-n", "svg", "put", "k"], b"svg").unwrap();

        assert_eq!(run_with(&cache, &["-n", "img", "get", "k"], b"").unwrap(), b"png".to_vec());
        assert_eq!(run_with(&cache, &["-n", "svg", "get", "k"], b"").unwrap(), b"svg".to_vec());
        assert!(run_with(&cache, &["get", "k"], b"").is_err());
    }

    #[test]
    fn test_expire_reports_removal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = engine(&dir);
        run_with(&cache, &["put", "k"], b"v").unwrap();

        let out = run_with(&cache, &["expire", "k"], b"").unwrap();
        let output: ExpireOutput = serde_json::from_slice(&out).unwrap();
        assert!(output.removed);

        let out = run_with(&cache, &["expire", "k"], b"").unwrap();
        let output: ExpireOutput = serde_json::from_slice(&out).unwrap();
        assert!(!output.removed);
    }

    #[test]
    fn test_stats_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = engine(&dir);
        run_with(&cache, &["put", "a"], b"12345").unwrap();

        let stats: serde_json::Value = serde_json::from_slice(&run_with(&cache, &["stats"], b"").unwrap()).unwrap();
        assert_eq!(stats["entries"], 1);
        assert_eq!(stats["total_bytes"], 5);

        let cleared: ClearOutput = serde_json::from_slice(&run_with(&cache, &["clear"], b"").unwrap()).unwrap();
        assert_eq!(cleared.deleted, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_memoizes_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = engine(&dir);
        let counter = dir.path().join("runs");
        let script = format!("echo run >> '{}'; echo rendered", counter.display());
        let args = ["exec", "diagram", "--", "sh", "-c", script.as_str()];

        assert_eq!(run_with(&cache, &args, b"").unwrap(), b"rendered\n".to_vec());
        assert_eq!(run_with(&cache, &args, b"").unwrap(), b"rendered\n".to_vec());
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);

        let refresh = ["exec", "diagram", "--refresh", "--", "sh", "-c", script.as_str()];
        run_with(&cache, &refresh, b"").unwrap();
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_failure_caches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = engine(&dir);

        let result = run_with(&cache, &["exec", "k", "--", "sh", "-c", "echo partial; exit 3"], b"");
        assert!(matches!(result, Err(CommandError::Failed { .. })));
        assert_eq!(cache.stats().unwrap().entries, 0);
    }

    #[test]
    fn test_exec_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let cache = engine(&dir);

        let result = run_with(&cache, &["exec", "k", "--", "/nonexistent/renderer-binary"], b"");
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}
