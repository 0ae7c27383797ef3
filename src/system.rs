use anyhow::{Context, Result};
use log::debug;
use std::env;
use std::ffi::OsStr;
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{exit, Command};

use megawrap::{Config, WrapperError};

const INSTALL_PROMPT: &str =
    "MegaCLI does not exist on this server!\nWould you like to install it now? (yes/no): ";

// Re-run ourselves through sudo when MegaCLI needs root
pub fn require_root() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    println!("info: elevated privileges are required for this action");

    let program = env::current_exe().context("failed to locate current executable")?;
    let status = Command::new("sudo")
        .arg(&program)
        .args(env::args_os().skip(1))
        .status()
        .context("failed to execute sudo command")?;

    exit(status.code().unwrap_or(1));
}

// Render a command line for logging and dry runs
pub fn render_command<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> String {
    let mut parts = vec![program.to_string_lossy().into_owned()];
    parts.extend(args.iter().map(|arg| {
        let arg = arg.as_ref().to_string_lossy();
        if arg.contains(' ') {
            format!("'{arg}'")
        } else {
            arg.into_owned()
        }
    }));
    parts.join(" ")
}

/// Spawn a process with inherited stdio and wait for it
///
/// # Errors
///
/// Returns an error if the process cannot be spawned or exits unsuccessfully.
pub fn run_command<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> Result<(), WrapperError> {
    let command = render_command(program, args);
    debug!("executing '{command}'");

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| WrapperError::Spawn {
            command: command.clone(),
            source,
        })?;

    debug!("executed '{command}': {status}");
    if status.success() {
        Ok(())
    } else {
        Err(WrapperError::ExitStatus {
            command,
            status: status.to_string(),
        })
    }
}

#[must_use]
pub fn is_installed(config: &Config) -> bool {
    // Only the install directory counts, even when `binary` points elsewhere
    config.install_dir.exists()
}

/// Ask whether MegaCLI should be installed
///
/// Repeats until a yes or no answer is given. End of input counts as no.
///
/// # Errors
///
/// Returns an error if reading the answer or writing the prompt fails.
pub fn prompt_install<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<bool> {
    loop {
        write!(output, "{INSTALL_PROMPT}").context("failed to write install prompt")?;
        output.flush().context("failed to flush install prompt")?;

        let mut answer = String::new();
        let read = input
            .read_line(&mut answer)
            .context("failed to read install answer")?;
        if read == 0 {
            writeln!(output).context("failed to write install prompt")?;
            return Ok(false);
        }

        match answer.trim().to_lowercase().as_str() {
            "yes" | "y" => return Ok(true),
            "no" | "n" => return Ok(false),
            _ => {}
        }
    }
}
