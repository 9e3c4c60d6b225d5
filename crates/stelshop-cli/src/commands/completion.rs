use anyhow::Result;
use clap::Command;
use clap_complete::{Shell, generate};
use std::io::Write;

/// Render the completion script for `shell`
pub fn render(shell: Shell, cmd: &mut Command) -> Result<String> {
    let bin_name = cmd.get_name().to_string();
    let mut script = Vec::new();
    generate(shell, cmd, bin_name, &mut script);
    Ok(String::from_utf8(script)?)
}

pub fn execute(shell: Shell, cmd: &mut Command) -> Result<()> {
    let script = render(shell, cmd)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(script.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uses_command_name() {
        let mut cmd = Command::new("stelshop").subcommand(Command::new("validate"));
        let script = render(Shell::Bash, &mut cmd).unwrap();

        assert!(script.contains("_stelshop()"));
        assert!(script.contains("validate"));
    }
}
