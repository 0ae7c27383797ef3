use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, LevelFilter};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::megacli::{DryRunner, MegaCli, Runner, SystemRunner};
use crate::system::{prompt_install, require_root};
use megawrap::{CommandTable, Config, DriveAddress, Operation, WrapperError, DEFAULT_CONFIG_PATH};

// CLI arguments parsing structure
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A wrapper to make MegaCLI commands more user friendly and easier to remember",
    long_about = None
)]
pub struct Cli {
    /// View the server's enclosure information
    #[arg(long)]
    pub enclosure: bool,

    /// View the server's physical drive information
    #[arg(long)]
    pub physical: bool,

    /// View the server's virtual drive information
    #[arg(long)]
    pub vdrive: bool,

    /// View the server's controller information
    #[arg(long)]
    pub controller: bool,

    /// View battery backup unit information
    #[arg(long)]
    pub battery: bool,

    /// Start rebuilding the drive at ENCLOSURE:SLOT
    #[arg(long, value_name = "E:S")]
    pub rebuild_start: Option<DriveAddress>,

    /// Show rebuild progress of the drive at ENCLOSURE:SLOT
    #[arg(long, value_name = "E:S")]
    pub rebuild_progress: Option<DriveAddress>,

    /// Stop rebuilding the drive at ENCLOSURE:SLOT
    #[arg(long, value_name = "E:S")]
    pub rebuild_stop: Option<DriveAddress>,

    /// Turn the alarm off
    #[arg(long, conflicts_with = "alarm_on")]
    pub alarm_off: bool,

    /// Turn the alarm on
    #[arg(long)]
    pub alarm_on: bool,

    /// Base directory where MegaCLI is installed
    #[arg(long, value_name = "DIR")]
    pub basedir: Option<PathBuf>,

    /// Adapter used for drive rebuild commands
    #[arg(long, value_name = "N")]
    pub adapter: Option<u32>,

    /// Path to the wrapper configuration file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Install MegaCLI without asking if it is missing
    #[arg(short = 'y', long, conflicts_with = "no_install")]
    pub yes: bool,

    /// Fail instead of offering to install MegaCLI
    #[arg(long)]
    pub no_install: bool,

    /// Print the MegaCLI commands instead of running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// List the known MegaCLI command templates
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Output the command list in JSON format
    #[arg(short = 'j', long, requires = "list")]
    pub json: bool,

    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(short, long, default_value_t = LevelFilter::Warn)]
    pub verbosity: LevelFilter,
}

impl Cli {
    // Selected operations, in execution order
    pub fn operations(&self) -> Vec<Operation> {
        let mut ops = Vec::new();

        if self.enclosure {
            ops.push(Operation::Enclosures);
        }
        if self.physical {
            ops.push(Operation::PhysicalDrives);
        }
        if self.vdrive {
            ops.push(Operation::VirtualDrives);
        }
        if self.controller {
            ops.push(Operation::Controller);
        }
        if self.battery {
            ops.push(Operation::Battery);
        }
        if let Some(drive) = self.rebuild_start {
            ops.push(Operation::RebuildStart(drive));
        }
        if let Some(drive) = self.rebuild_progress {
            ops.push(Operation::RebuildProgress(drive));
        }
        if let Some(drive) = self.rebuild_stop {
            ops.push(Operation::RebuildStop(drive));
        }
        if self.alarm_off {
            ops.push(Operation::AlarmDisable);
        }
        if self.alarm_on {
            ops.push(Operation::AlarmEnable);
        }

        ops
    }

    // Load the config file and apply command line overrides
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::from_file(&self.config)
            .with_context(|| format!("failed to load config {}", self.config.display()))?;

        if let Some(dir) = &self.basedir {
            config.set_install_dir(dir);
        }
        if let Some(adapter) = self.adapter {
            config.adapter = adapter;
        }

        debug!("using config: {config:?}");
        Ok(config)
    }
}

// Execute the selected operations
pub fn execute_command(cli: &Cli) -> Result<()> {
    debug!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    if cli.list {
        return cmd_list(cli.json);
    }

    let ops = cli.operations();
    if ops.is_empty() {
        println!("no operation selected, see --help");
        return Ok(());
    }

    let config = cli.load_config()?;
    let mut input = io::stdin().lock();
    let mut output = io::stdout();

    if cli.dry_run {
        let mega = MegaCli::new(config, DryRunner::stdout());
        return run_selected(cli, &mega, &ops, &mut input, &mut output);
    }

    require_root()?;

    let mega = MegaCli::new(config, SystemRunner);
    run_selected(cli, &mega, &ops, &mut input, &mut output)
}

// Install check followed by the operations; dry runs skip the check
fn run_selected<R: Runner, I: BufRead, W: Write>(
    cli: &Cli,
    mega: &MegaCli<R>,
    ops: &[Operation],
    input: &mut I,
    output: &mut W,
) -> Result<()> {
    if !cli.dry_run && !ensure_installed(mega, cli.yes, cli.no_install, input, output)? {
        writeln!(output, "Closing....").context("failed to write output")?;
        return Ok(());
    }

    run_operations(mega, ops)
}

// Returns false when the user declined the installation
fn ensure_installed<R: Runner, I: BufRead, W: Write>(
    mega: &MegaCli<R>,
    assume_yes: bool,
    no_install: bool,
    input: &mut I,
    output: &mut W,
) -> Result<bool> {
    if mega.is_installed() {
        return Ok(true);
    }

    if no_install {
        return Err(WrapperError::NotInstalled {
            path: mega.config().install_dir.to_string_lossy().into_owned(),
        }
        .into());
    }

    let accepted = assume_yes || prompt_install(input, output)?;
    if !accepted {
        return Ok(false);
    }

    mega.install()?;
    Ok(true)
}

fn run_operations<R: Runner>(mega: &MegaCli<R>, ops: &[Operation]) -> Result<()> {
    for op in ops {
        if op.is_mutating() {
            debug!("{} changes controller state", op.name());
        }
        mega.run(op)?;
    }
    Ok(())
}

fn cmd_list(json_output: bool) -> Result<()> {
    let entries = CommandTable::entries();

    if json_output {
        let json = serde_json::to_string_pretty(&entries)
            .context("failed to serialize command list to JSON")?;
        println!("{json}");
        return Ok(());
    }

    // Find the longest operation name for alignment
    let max_name_length = entries
        .iter()
        .map(|entry| entry.name.len())
        .max()
        .unwrap_or(0);

    println!("\u{001b}[4mAvailable commands:\u{001b}[0m");
    for entry in &entries {
        println!(
            "  {:<width$}  MegaCli64 {}",
            entry.name,
            entry.args,
            width = max_name_length
        );
    }

    Ok(())
}
