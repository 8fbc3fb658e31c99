//! Command-line commands driving the VFS

use std::io::Write;
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context};
use tfm_vfs::{normalize, FileStat, FileType, MoveStrategy, Vfs};

pub const USAGE: &str = "\
tfm - terminal file manager core

USAGE:
    tfm [COMMAND] [ARGS]

COMMANDS:
    ls URL              List a directory
    stat URL            Show metadata
    cat URL             Print file contents
    mv SRC DST          Move, renaming when possible
    strategy SRC DST    Show how SRC would be moved to DST
    normalize PATH      Resolve ., .. and symlinks in a host path
    plugins             List loaded and available plugins

GLOBAL OPTIONS:
    -h, --help          Print help information
    -v, --version       Print version

URLS:
    backend::path, e.g. local::/etc or memory::/scratch
    Paths without a prefix go to the configured default backend.

CONFIG:
    ~/.config/tfm/config.toml
";

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ls(String),
    Stat(String),
    Cat(String),
    Mv(String, String),
    Strategy(String, String),
    Normalize(String),
    Plugins,
    Help,
    Version,
}

impl Command {
    /// Parse arguments (without the program name)
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let Some(name) = args.first() else {
            return Ok(Self::Help);
        };
        let operand = |i: usize| {
            args.get(i)
                .cloned()
                .with_context(|| format!("'{name}' is missing an argument (see --help)"))
        };

        let command = match name.as_str() {
            "--help" | "-h" | "help" => Self::Help,
            "--version" | "-v" => Self::Version,
            "ls" => Self::Ls(operand(1).unwrap_or_else(|_| ".".to_string())),
            "stat" => Self::Stat(operand(1)?),
            "cat" => Self::Cat(operand(1)?),
            "mv" => Self::Mv(operand(1)?, operand(2)?),
            "strategy" => Self::Strategy(operand(1)?, operand(2)?),
            "normalize" => Self::Normalize(operand(1)?),
            "plugins" => Self::Plugins,
            other => bail!("unknown command '{other}' (see --help)"),
        };
        Ok(command)
    }
}

const fn kind_char(kind: FileType) -> char {
    match kind {
        FileType::File => '-',
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
        FileType::Special => 's',
    }
}

fn format_stat(stat: &FileStat) -> String {
    let modified = stat
        .modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or_else(|| "-".to_string(), |d| d.as_secs().to_string());
    format!(
        "type:     {}\nsize:     {}\nmode:     {:04o}\nlinks:    {}\nowner:    {}:{}\nmodified: {}\n",
        kind_char(stat.kind),
        stat.size,
        stat.mode,
        stat.nlink,
        stat.uid,
        stat.gid,
        modified
    )
}

/// Run a VFS command, writing its output to `out`
pub async fn run(vfs: &Vfs, command: &Command, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Command::Help => out.write_all(USAGE.as_bytes())?,
        Command::Version => writeln!(out, "tfm {}", env!("CARGO_PKG_VERSION"))?,
        Command::Ls(url) => {
            let entries = vfs
                .scandir(url)
                .await
                .with_context(|| format!("Cannot list {url}"))?;
            for entry in entries {
                let suffix = if entry.kind.is_dir() { "/" } else { "" };
                writeln!(out, "{} {}{}", kind_char(entry.kind), entry.name, suffix)?;
            }
        }
        Command::Stat(url) => {
            let stat = vfs
                .lstat(url)
                .await
                .with_context(|| format!("Cannot stat {url}"))?;
            out.write_all(format_stat(&stat).as_bytes())?;
        }
        Command::Cat(url) => {
            let data = vfs
                .read_to_end(url)
                .await
                .with_context(|| format!("Cannot read {url}"))?;
            out.write_all(&data)?;
        }
        Command::Mv(src, dst) => {
            let strategy = vfs
                .move_path(src, dst)
                .await
                .with_context(|| format!("Cannot move {src} to {dst}"))?;
            let verb = match strategy {
                MoveStrategy::Rename => "renamed",
                MoveStrategy::Copy => "copied",
            };
            writeln!(out, "{verb} {src} -> {dst}")?;
        }
        Command::Strategy(src, dst) => {
            let strategy = vfs
                .move_strategy(src, dst)
                .await
                .with_context(|| format!("Cannot plan move of {src} to {dst}"))?;
            writeln!(out, "{}", format!("{strategy:?}").to_lowercase())?;
        }
        Command::Normalize(path) => {
            let normalized = normalize(path).with_context(|| format!("Cannot normalize {path}"))?;
            writeln!(out, "{normalized}")?;
        }
        Command::Plugins => {
            let loaded = vfs.registry().list().await;
            for name in &loaded {
                let marker = if vfs.default_backend() == Some(name.as_str()) {
                    " (default)"
                } else {
                    ""
                };
                writeln!(out, "loaded    {name}{marker}")?;
            }
            for module in vfs.registry().catalog().modules() {
                if !loaded.contains(&module) {
                    writeln!(out, "available {module}")?;
                }
            }
        }
    }
    Ok(())
}
