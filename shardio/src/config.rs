//! Configuration records for dispatchers and partition units.
//!
//! - `OpenMode` / `Whence`: the `fopen`/`fseek` vocabulary shared by the
//!   dispatcher and every unit.
//! - `PartitionOptions`: per-unit cache and write buffer tuning.
//! - `DispatcherConfig`: the record registered under a dispatcher's symbolic
//!   name so that other processes can attach to it.
//! - `ShardConfig`: the YAML document an application loads at startup.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;

use crate::error::{Result, ShardError};

pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024;
pub const DEFAULT_SYMBOLIC_NAME: &str = "/shardio/dispatcher";

/// File open mode, spelled the way `fopen` spells it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OpenMode {
    /// `r`
    Read,
    /// `r+`
    ReadWrite,
    /// `w`
    Write,
    /// `w+`
    WriteRead,
    /// `a`
    Append,
    /// `a+`
    AppendRead,
}

impl OpenMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::ReadWrite => "r+",
            OpenMode::Write => "w",
            OpenMode::WriteRead => "w+",
            OpenMode::Append => "a",
            OpenMode::AppendRead => "a+",
        }
    }

    pub fn appends(&self) -> bool {
        matches!(self, OpenMode::Append | OpenMode::AppendRead)
    }

    pub fn open_options(&self) -> OpenOptions {
        let mut opts = OpenOptions::new();
        match self {
            OpenMode::Read => opts.read(true),
            OpenMode::ReadWrite => opts.read(true).write(true),
            OpenMode::Write => opts.write(true).create(true).truncate(true),
            OpenMode::WriteRead => opts.read(true).write(true).create(true).truncate(true),
            OpenMode::Append => opts.append(true).create(true),
            OpenMode::AppendRead => opts.read(true).append(true).create(true),
        };
        opts
    }
}

impl FromStr for OpenMode {
    type Err = ShardError;

    fn from_str(s: &str) -> Result<Self> {
        // "b" is meaningless on POSIX, accept it anywhere after the first letter.
        let normalized: String = s.chars().filter(|c| *c != 'b').collect();
        match normalized.as_str() {
            "r" => Ok(OpenMode::Read),
            "r+" => Ok(OpenMode::ReadWrite),
            "w" => Ok(OpenMode::Write),
            "w+" => Ok(OpenMode::WriteRead),
            "a" => Ok(OpenMode::Append),
            "a+" => Ok(OpenMode::AppendRead),
            _ => Err(ShardError::invalid(format!("unsupported open mode {s:?}"))),
        }
    }
}

impl TryFrom<String> for OpenMode {
    type Error = ShardError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<OpenMode> for String {
    fn from(mode: OpenMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference point of a seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    /// Computes the absolute position a seek lands on.
    pub fn resolve(self, offset: i64, current: u64, end: u64) -> Result<u64> {
        let base = match self {
            Whence::Set => 0i128,
            Whence::Cur => current as i128,
            Whence::End => end as i128,
        };
        let target = base + offset as i128;
        if target < 0 {
            return Err(ShardError::invalid(format!(
                "seek to negative position {target}"
            )));
        }
        u64::try_from(target).map_err(|_| ShardError::invalid("seek position overflows u64"))
    }
}

impl TryFrom<i32> for Whence {
    type Error = ShardError;

    /// Accepts the POSIX `SEEK_SET`, `SEEK_CUR` and `SEEK_END` values.
    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            other => Err(ShardError::invalid(format!("invalid whence argument {other}"))),
        }
    }
}

/// Tuning of a single partition unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionOptions {
    /// Size of the cached read-ahead chunk and the lazy write flush threshold.
    pub chunk_size: usize,
    /// Buffer positional writes until more than `chunk_size` bytes are pending.
    pub lazy_writes: bool,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            lazy_writes: true,
        }
    }
}

impl PartitionOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ShardError::invalid("chunk_size must be greater than zero"));
        }
        Ok(())
    }
}

/// The record a creating dispatcher registers under its symbolic name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub file_name: String,
    pub mode: OpenMode,
    pub symbolic_name: String,
    pub partition_count: usize,
}

impl DispatcherConfig {
    pub fn new(
        file_name: impl Into<String>,
        mode: OpenMode,
        symbolic_name: impl Into<String>,
        partition_count: usize,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mode,
            symbolic_name: symbolic_name.into(),
            partition_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 {
            return Err(ShardError::invalid("partition_count must be greater than zero"));
        }
        if self.symbolic_name.trim_end_matches('/').is_empty() {
            return Err(ShardError::invalid("symbolic_name must not be empty"));
        }
        Ok(())
    }

    /// Name of partition `index`: the symbolic name, a `/` separator, the index.
    pub fn partition_name(&self, index: usize) -> String {
        let mut base = self.symbolic_name.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        base.push_str(&index.to_string());
        base
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn default_symbolic_name() -> String {
    DEFAULT_SYMBOLIC_NAME.to_string()
}

fn default_partition_count() -> usize {
    1
}

/// Application-level configuration, usually read from a YAML file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub file_name: String,
    pub mode: OpenMode,
    #[serde(default = "default_symbolic_name")]
    pub symbolic_name: String,
    #[serde(default = "default_partition_count")]
    pub partition_count: usize,
    #[serde(default)]
    pub partition: PartitionOptions,
}

impl ShardConfig {
    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig::new(
            self.file_name.clone(),
            self.mode,
            self.symbolic_name.clone(),
            self.partition_count,
        )
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let cfg: ShardConfig = serde_yaml::from_str(content)?;
        cfg.dispatcher().validate()?;
        cfg.partition.validate()?;
        Ok(cfg)
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<ShardConfig> {
    let content = fs::read_to_string(path.as_ref())?;
    ShardConfig::from_yaml(&content)
}
