//! Shell completion generation for mongoport

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;
use crate::error::Result;

/// Binary name completions are registered for
const BIN_NAME: &str = "mongoport";

/// Write the completion script for `shell` to stdout
///
/// # Arguments
/// * `shell` - Target shell
///
/// # Returns
/// * `Result<()>` - Success or error
pub fn generate_completion(shell: Shell) -> Result<()> {
    let script = completion_script(shell);
    let mut stdout = io::stdout().lock();
    stdout.write_all(&script)?;
    stdout.flush()?;
    Ok(())
}

/// Render the completion script for `shell`
pub fn completion_script(shell: Shell) -> Vec<u8> {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_script_lists_subcommands() {
        let script = String::from_utf8(completion_script(Shell::Bash)).unwrap();
        assert!(script.contains("mongoport"));
        assert!(script.contains("export"));
        assert!(script.contains("preview"));
    }

    #[test]
    fn test_fish_script() {
        let script = String::from_utf8(completion_script(Shell::Fish)).unwrap();
        assert!(script.contains("complete -c mongoport"));
    }
}
