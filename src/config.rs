use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use crate::policy::AccessPolicy;

pub const DEFAULT_BIND_ADDR: &str = ":2022";
pub const DEFAULT_MAX_PATH_LENGTH: usize = 512;

/// Quickly and safely share the contents of a directory over HTTP.
#[derive(Parser, Debug)]
#[command(name = "sharedir", version)]
pub struct Cli {
    /// Directory to share
    #[arg(env = "SHAREDIR_ROOT", default_value = ".")]
    pub directory: PathBuf,

    /// Recursive mode (also share subdirectories)
    #[arg(short, long, env = "SHAREDIR_RECURSIVE")]
    pub recursive: bool,

    /// Start the HTTP server on this address; a bare `:PORT` listens on all interfaces
    #[arg(short = 'a', long = "addr", env = "SHAREDIR_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub addr: String,

    /// Directory holding auxiliary files such as sharedir.ico (default: next to the executable)
    #[arg(long, env = "SHAREDIR_ASSETS")]
    pub assets: Option<PathBuf>,

    /// Longest accepted request path, in bytes
    #[arg(long, env = "SHAREDIR_MAX_PATH_LENGTH", default_value_t = DEFAULT_MAX_PATH_LENGTH)]
    pub max_path_length: usize,

    /// Refuse to serve files larger than this many bytes
    #[arg(long, env = "SHAREDIR_MAX_FILE_SIZE")]
    pub max_file_size: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, env = "SHAREDIR_VERBOSE")]
    pub verbose: bool,
}

impl Cli {
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "sharedir=debug,tower_http=debug"
        } else {
            "sharedir=info,tower_http=info"
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Canonical share root. Every served path lies under it.
    pub root: PathBuf,
    pub recursive: bool,
    pub http_bind_addr: String,
    pub assets_dir: Option<PathBuf>,
    pub max_path_length: usize,
    pub max_file_size_bytes: Option<u64>,
}

impl AppConfig {
    pub fn new(root: impl AsRef<Path>, recursive: bool) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .with_context(|| format!("cannot share {}", root.display()))?;
        if !canonical.is_dir() {
            return Err(anyhow!("{} is not a directory", canonical.display()));
        }
        if canonical.to_str().is_none() {
            return Err(anyhow!(
                "{} is not valid unicode",
                canonical.to_string_lossy()
            ));
        }

        Ok(Self {
            root: canonical,
            recursive,
            http_bind_addr: normalize_bind_addr(DEFAULT_BIND_ADDR),
            assets_dir: None,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            max_file_size_bytes: None,
        })
    }

    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = Self::new(&cli.directory, cli.recursive)?;

        if cli.max_path_length == 0 {
            return Err(anyhow!("--max-path-length must be > 0"));
        }
        config.max_path_length = cli.max_path_length;
        config.max_file_size_bytes = cli.max_file_size;
        config.http_bind_addr = normalize_bind_addr(&cli.addr);
        config.assets_dir = match &cli.assets {
            Some(dir) => Some(dir.clone()),
            None => Some(executable_dir()?),
        };

        Ok(config)
    }

    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.recursive)
    }
}

/// `:2022` means every interface, as in most listen-address conventions.
fn normalize_bind_addr(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    }
}

fn executable_dir() -> Result<PathBuf> {
    let exe = env::current_exe()
        .and_then(|exe| exe.canonicalize())
        .context("cannot locate the running executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("executable {} has no parent directory", exe.display()))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn canonicalizes_root() {
        let temp = tempdir().expect("temp dir");
        std::fs::create_dir_all(temp.path().join("share")).expect("create share");

        let config =
            AppConfig::new(temp.path().join("share/./"), false).expect("valid config");
        assert_eq!(
            config.root,
            temp.path().join("share").canonicalize().expect("canonical")
        );
        assert!(!config.policy().is_recursive());
    }

    #[test]
    fn rejects_missing_or_file_roots() {
        let temp = tempdir().expect("temp dir");
        std::fs::write(temp.path().join("file.txt"), "x").expect("write file");

        assert!(AppConfig::new(temp.path().join("missing"), false).is_err());
        assert!(AppConfig::new(temp.path().join("file.txt"), false).is_err());
    }

    #[test]
    fn parses_cli_flags() {
        let temp = tempdir().expect("temp dir");
        let dir = temp.path().to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "sharedir",
            "-r",
            "-a",
            "127.0.0.1:9000",
            "--assets",
            "/opt/sharedir",
            "--max-file-size",
            "1024",
            dir.as_str(),
        ])
        .expect("parse cli");

        let config = AppConfig::from_cli(&cli).expect("valid config");
        assert!(config.recursive);
        assert_eq!(config.http_bind_addr, "127.0.0.1:9000");
        assert_eq!(config.assets_dir, Some(PathBuf::from("/opt/sharedir")));
        assert_eq!(config.max_file_size_bytes, Some(1024));
        assert_eq!(config.max_path_length, DEFAULT_MAX_PATH_LENGTH);
    }

    #[test]
    fn bare_port_binds_all_interfaces() {
        assert_eq!(normalize_bind_addr(":2022"), "0.0.0.0:2022");
        assert_eq!(normalize_bind_addr("localhost:8080"), "localhost:8080");
    }

    #[test]
    fn help_is_a_clean_exit() {
        let err = Cli::try_parse_from(["sharedir", "--help"]).expect_err("help");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }
}
