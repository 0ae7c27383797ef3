use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

// Constants
pub const DEFAULT_CONFIG_PATH: &str = "/etc/megawrap.json";
pub const DEFAULT_INSTALL_DIR: &str = "/opt/MegaRAID/";
pub const DEFAULT_BINARY: &str = "MegaCli/MegaCli64";

// Slot in a template that receives the drive address
pub const DRIVE_PLACEHOLDER: &str = "[E:S]";

#[derive(Error, Debug)]
pub enum WrapperError {
    #[error("invalid drive address '{input}': expected ENCLOSURE:SLOT")]
    InvalidDriveAddress { input: String },

    #[error("failed to read config from {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {source}")]
    ConfigParse {
        path: String,
        source: serde_json::Error,
    },

    #[error("MegaCLI is not installed (missing {path})")]
    NotInstalled { path: String },

    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    ExitStatus { command: String, status: String },
}

// Physical drive address inside a RAID chassis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveAddress {
    pub enclosure: u32,
    pub slot: u32,
}

impl DriveAddress {
    #[must_use]
    pub fn new(enclosure: u32, slot: u32) -> Self {
        Self { enclosure, slot }
    }
}

impl FromStr for DriveAddress {
    type Err = WrapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WrapperError::InvalidDriveAddress {
            input: s.to_string(),
        };

        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(trimmed);

        let (enclosure, slot) = inner.split_once([':', ',']).ok_or_else(invalid)?;
        let enclosure = enclosure.trim().parse().map_err(|_| invalid())?;
        let slot = slot.trim().parse().map_err(|_| invalid())?;

        Ok(Self { enclosure, slot })
    }
}

impl fmt::Display for DriveAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.enclosure, self.slot)
    }
}

// Controller selection flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Adapter {
    #[default]
    All,
    Index(u32),
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adapter::All => write!(f, "-aALL"),
            Adapter::Index(n) => write!(f, "-a{n}"),
        }
    }
}

// Operations the wrapper knows how to invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Enclosures,
    PhysicalDrives,
    VirtualDrives,
    Controller,
    Battery,
    RebuildStart(DriveAddress),
    RebuildStop(DriveAddress),
    RebuildProgress(DriveAddress),
    AlarmDisable,
    AlarmEnable,
}

/// A fixed MegaCLI argument list.
///
/// `drive_slot` marks the position of the `[E:S]` placeholder, and
/// `per_adapter` means the trailing adapter flag follows the requested
/// adapter instead of `-aALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate {
    pub args: &'static [&'static str],
    pub drive_slot: Option<usize>,
    pub per_adapter: bool,
}

const ENCLOSURES: CommandTemplate = CommandTemplate {
    args: &["-EncInfo"],
    drive_slot: None,
    per_adapter: false,
};
const PHYSICAL_DRIVES: CommandTemplate = CommandTemplate {
    args: &["-PDList"],
    drive_slot: None,
    per_adapter: false,
};
const VIRTUAL_DRIVES: CommandTemplate = CommandTemplate {
    args: &["-LDInfo", "-Lall"],
    drive_slot: None,
    per_adapter: false,
};
const CONTROLLER: CommandTemplate = CommandTemplate {
    args: &["-AdpAllInfo"],
    drive_slot: None,
    per_adapter: false,
};
const BATTERY: CommandTemplate = CommandTemplate {
    args: &["-AdpBbuCmd"],
    drive_slot: None,
    per_adapter: false,
};
const REBUILD_START: CommandTemplate = CommandTemplate {
    args: &["-PDRbld", "-Start", "-PhysDrv", DRIVE_PLACEHOLDER],
    drive_slot: Some(3),
    per_adapter: true,
};
const REBUILD_STOP: CommandTemplate = CommandTemplate {
    args: &["-PDRbld", "-Stop", "-PhysDrv", DRIVE_PLACEHOLDER],
    drive_slot: Some(3),
    per_adapter: true,
};
const REBUILD_PROGRESS: CommandTemplate = CommandTemplate {
    args: &["-PDRbld", "-ShowProg", "-PhysDrv", DRIVE_PLACEHOLDER],
    drive_slot: Some(3),
    per_adapter: true,
};
const ALARM_DISABLE: CommandTemplate = CommandTemplate {
    args: &["-AdpSetProp", "AlarmDsbl"],
    drive_slot: None,
    per_adapter: false,
};
const ALARM_ENABLE: CommandTemplate = CommandTemplate {
    args: &["-AdpSetProp", "AlarmEnbl"],
    drive_slot: None,
    per_adapter: false,
};

impl CommandTemplate {
    // Template text with placeholders left in place
    #[must_use]
    pub fn display(&self) -> String {
        let adapter = if self.per_adapter { "-aN" } else { "-aALL" };
        let mut parts: Vec<&str> = self.args.to_vec();
        parts.push(adapter);
        parts.join(" ")
    }
}

impl Operation {
    #[must_use]
    pub fn template(&self) -> &'static CommandTemplate {
        match self {
            Operation::Enclosures => &ENCLOSURES,
            Operation::PhysicalDrives => &PHYSICAL_DRIVES,
            Operation::VirtualDrives => &VIRTUAL_DRIVES,
            Operation::Controller => &CONTROLLER,
            Operation::Battery => &BATTERY,
            Operation::RebuildStart(_) => &REBUILD_START,
            Operation::RebuildStop(_) => &REBUILD_STOP,
            Operation::RebuildProgress(_) => &REBUILD_PROGRESS,
            Operation::AlarmDisable => &ALARM_DISABLE,
            Operation::AlarmEnable => &ALARM_ENABLE,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Enclosures => "enclosures",
            Operation::PhysicalDrives => "physical-drives",
            Operation::VirtualDrives => "virtual-drives",
            Operation::Controller => "controller",
            Operation::Battery => "battery",
            Operation::RebuildStart(_) => "rebuild-start",
            Operation::RebuildStop(_) => "rebuild-stop",
            Operation::RebuildProgress(_) => "rebuild-progress",
            Operation::AlarmDisable => "alarm-disable",
            Operation::AlarmEnable => "alarm-enable",
        }
    }

    #[must_use]
    pub fn drive(&self) -> Option<DriveAddress> {
        match self {
            Operation::RebuildStart(drive)
            | Operation::RebuildStop(drive)
            | Operation::RebuildProgress(drive) => Some(*drive),
            _ => None,
        }
    }

    // Operations that change controller state
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::RebuildStart(_)
                | Operation::RebuildStop(_)
                | Operation::AlarmDisable
                | Operation::AlarmEnable
        )
    }

    /// Render the argument list for this operation.
    ///
    /// The drive placeholder is replaced by the operation's address and the
    /// adapter flag is appended. Only rebuild operations honor `adapter`.
    #[must_use]
    pub fn args(&self, adapter: Adapter) -> Vec<String> {
        let template = self.template();
        let mut args: Vec<String> = template.args.iter().map(|a| (*a).to_string()).collect();

        if let (Some(index), Some(drive)) = (template.drive_slot, self.drive()) {
            args[index] = drive.to_string();
        }

        let adapter = if template.per_adapter {
            adapter
        } else {
            Adapter::All
        };
        args.push(adapter.to_string());
        args
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub name: String,
    pub args: String,
}

// Listing of every known operation and its template
pub struct CommandTable;

impl CommandTable {
    #[must_use]
    pub fn entries() -> Vec<TableEntry> {
        let sample = DriveAddress::new(0, 0);
        [
            Operation::Enclosures,
            Operation::PhysicalDrives,
            Operation::VirtualDrives,
            Operation::Controller,
            Operation::Battery,
            Operation::RebuildStart(sample),
            Operation::RebuildProgress(sample),
            Operation::RebuildStop(sample),
            Operation::AlarmDisable,
            Operation::AlarmEnable,
        ]
        .iter()
        .map(|op| TableEntry {
            name: op.name().to_string(),
            args: op.template().display(),
        })
        .collect()
    }
}

fn default_install_dir() -> PathBuf {
    PathBuf::from(DEFAULT_INSTALL_DIR)
}

fn default_binary() -> PathBuf {
    PathBuf::from(DEFAULT_BINARY)
}

fn default_installer() -> Vec<String> {
    ["/usr/bin/yum", "install", "megacli", "-y"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

// Wrapper configuration file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_installer")]
    pub installer: Vec<String>,
    #[serde(default)]
    pub adapter: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            binary: default_binary(),
            installer: default_installer(),
            adapter: 0,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WrapperError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy().into_owned();

        if !path_ref.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path_ref).map_err(|source| WrapperError::ConfigRead {
            path: path_str.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| WrapperError::ConfigParse {
            path: path_str,
            source,
        })
    }

    // Trailing separators are dropped so "/opt/MegaRAID/" and "/opt/MegaRAID" match
    pub fn set_install_dir<P: AsRef<Path>>(&mut self, dir: P) {
        self.install_dir = dir.as_ref().components().collect();
    }

    // Resolve the MegaCLI binary against the install directory
    #[must_use]
    pub fn binary_path(&self) -> PathBuf {
        if self.binary.is_absolute() {
            self.binary.clone()
        } else {
            self.install_dir.join(&self.binary)
        }
    }
}
