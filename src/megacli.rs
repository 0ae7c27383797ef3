use crate::system::{is_installed, render_command, run_command};
use anyhow::{bail, Context, Result};
use log::info;
use megawrap::{Adapter, Config, DriveAddress, Operation};
use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;

// A fully rendered command line
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn render(&self) -> String {
        render_command(&self.program, &self.args)
    }
}

// Executes invocations; swapped out for dry runs and tests
pub trait Runner {
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

// Spawns the process with its output going straight to the terminal
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        run_command(&invocation.program, &invocation.args)?;
        Ok(())
    }
}

// Prints what would be executed
pub struct DryRunner<W: Write> {
    out: RefCell<W>,
}

impl<W: Write> DryRunner<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl DryRunner<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Runner for DryRunner<W> {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        writeln!(self.out.borrow_mut(), "{}", invocation.render())
            .context("failed to write dry run output")
    }
}

// MegaCli maps operations onto invocations of the MegaCLI binary
pub struct MegaCli<R: Runner> {
    config: Config,
    runner: R,
}

impl<R: Runner> MegaCli<R> {
    pub fn new(config: Config, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn binary_path(&self) -> PathBuf {
        self.config.binary_path()
    }

    pub fn is_installed(&self) -> bool {
        is_installed(&self.config)
    }

    /// Run the configured package manager command once
    ///
    /// # Errors
    ///
    /// Returns an error if no installer is configured or the installer fails.
    pub fn install(&self) -> Result<()> {
        let Some((program, args)) = self.config.installer.split_first() else {
            bail!("no installer command configured");
        };

        let invocation = Invocation {
            program: PathBuf::from(program),
            args: args.to_vec(),
        };

        info!("installing MegaCLI with '{}'", invocation.render());
        self.runner
            .run(&invocation)
            .context("failed to install MegaCLI")?;
        info!("MegaCLI installed");
        Ok(())
    }

    pub fn invocation(&self, op: &Operation) -> Invocation {
        Invocation {
            program: self.binary_path(),
            args: op.args(Adapter::Index(self.config.adapter)),
        }
    }

    // Dispatch an operation to its named method
    pub fn run(&self, op: &Operation) -> Result<()> {
        match *op {
            Operation::Enclosures => self.view_enclosures(),
            Operation::PhysicalDrives => self.view_physical_drives(),
            Operation::VirtualDrives => self.view_virtual_drives(),
            Operation::Controller => self.view_controller(),
            Operation::Battery => self.battery_info(),
            Operation::RebuildStart(drive) => self.start_rebuild(drive),
            Operation::RebuildStop(drive) => self.stop_rebuild(drive),
            Operation::RebuildProgress(drive) => self.show_rebuild_progress(drive),
            Operation::AlarmDisable => self.alarm_disable(),
            Operation::AlarmEnable => self.alarm_enable(),
        }
    }

    fn execute(&self, op: &Operation) -> Result<()> {
        let invocation = self.invocation(op);
        self.runner
            .run(&invocation)
            .with_context(|| format!("failed to run {} operation", op.name()))
    }

    pub fn view_enclosures(&self) -> Result<()> {
        self.execute(&Operation::Enclosures)
    }

    pub fn view_physical_drives(&self) -> Result<()> {
        self.execute(&Operation::PhysicalDrives)
    }

    pub fn view_virtual_drives(&self) -> Result<()> {
        self.execute(&Operation::VirtualDrives)
    }

    pub fn view_controller(&self) -> Result<()> {
        self.execute(&Operation::Controller)
    }

    pub fn battery_info(&self) -> Result<()> {
        self.execute(&Operation::Battery)
    }

    pub fn start_rebuild(&self, drive: DriveAddress) -> Result<()> {
        self.execute(&Operation::RebuildStart(drive))
    }

    pub fn stop_rebuild(&self, drive: DriveAddress) -> Result<()> {
        self.execute(&Operation::RebuildStop(drive))
    }

    pub fn show_rebuild_progress(&self, drive: DriveAddress) -> Result<()> {
        self.execute(&Operation::RebuildProgress(drive))
    }

    pub fn alarm_disable(&self) -> Result<()> {
        self.execute(&Operation::AlarmDisable)
    }

    pub fn alarm_enable(&self) -> Result<()> {
        self.execute(&Operation::AlarmEnable)
    }
}


#[cfg(test)]
mod tests {
    use super::testutils::RecordingRunner;
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.set_install_dir("/opt/MegaRAID/");
        config.adapter = 1;
        config
    }

    #[test]
    fn test_queries_use_binary_under_install_dir() {
        let runner = RecordingRunner::default();
        let mega = MegaCli::new(test_config(), &runner);

        mega.view_enclosures().unwrap();
        mega.view_virtual_drives().unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].program,
            PathBuf::from("/opt/MegaRAID/MegaCli/MegaCli64")
        );
        assert_eq!(calls[0].args, vec!["-EncInfo", "-aALL"]);
        assert_eq!(calls[1].args, vec!["-LDInfo", "-Lall", "-aALL"]);
    }

    #[test]
    fn test_rebuild_targets_drive_and_adapter() {
        let runner = RecordingRunner::default();
        let mega = MegaCli::new(test_config(), &runner);
        let drive = DriveAddress::new(32, 4);

        mega.start_rebuild(drive).unwrap();
        mega.show_rebuild_progress(drive).unwrap();
        mega.stop_rebuild(drive).unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(
            calls[0].args,
            vec!["-PDRbld", "-Start", "-PhysDrv", "[32:4]", "-a1"]
        );
        assert_eq!(
            calls[1].args,
            vec!["-PDRbld", "-ShowProg", "-PhysDrv", "[32:4]", "-a1"]
        );
        assert_eq!(
            calls[2].args,
            vec!["-PDRbld", "-Stop", "-PhysDrv", "[32:4]", "-a1"]
        );
    }

    #[test]
    fn test_alarm_and_battery() {
        let runner = RecordingRunner::default();
        let mega = MegaCli::new(test_config(), &runner);

        mega.alarm_disable().unwrap();
        mega.alarm_enable().unwrap();
        mega.battery_info().unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls[0].args, vec!["-AdpSetProp", "AlarmDsbl", "-aALL"]);
        assert_eq!(calls[1].args, vec!["-AdpSetProp", "AlarmEnbl", "-aALL"]);
        assert_eq!(calls[2].args, vec!["-AdpBbuCmd", "-aALL"]);
    }

    #[test]
    fn test_runner_failure_names_operation() {
        let config = test_config();
        let runner = RecordingRunner::failing_on(config.binary_path());
        let mega = MegaCli::new(config, &runner);

        let err = mega.view_physical_drives().unwrap_err();
        assert!(err.to_string().contains("physical-drives"));
    }

    #[test]
    fn test_install_runs_configured_installer() {
        let runner = RecordingRunner::default();
        let mega = MegaCli::new(test_config(), &runner);

        mega.install().unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, PathBuf::from("/usr/bin/yum"));
        assert_eq!(calls[0].args, vec!["install", "megacli", "-y"]);
    }

    #[test]
    fn test_install_without_command_fails() {
        let config = Config {
            installer: Vec::new(),
            ..test_config()
        };
        let runner = RecordingRunner::default();
        let mega = MegaCli::new(config, &runner);

        assert!(mega.install().is_err());
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_dry_runner_prints_rendered_commands() {
        let mut config = test_config();
        config.binary = PathBuf::from("/usr/sbin/MegaCli64");
        let mega = MegaCli::new(config, DryRunner::new(Vec::new()));

        mega.view_controller().unwrap();
        mega.start_rebuild(DriveAddress::new(8, 2)).unwrap();

        let output = String::from_utf8(mega.runner.into_inner()).unwrap();
        assert_eq!(
            output,
            "/usr/sbin/MegaCli64 -AdpAllInfo -aALL\n\
             /usr/sbin/MegaCli64 -PDRbld -Start -PhysDrv [8:2] -a1\n"
        );
    }
}
