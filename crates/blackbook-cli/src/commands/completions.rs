use std::io;
use std::path::Path;

use clap::CommandFactory;
use clap_complete::{generate, shells};

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

pub fn run_completions(shell: CompletionShell, output: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();

    let mut buffer: Vec<u8> = Vec::new();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut command, &name, &mut buffer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut command, &name, &mut buffer),
        CompletionShell::Fish => generate(shells::Fish, &mut command, &name, &mut buffer),
    }

    match output {
        Some(path) => std::fs::write(path, buffer)?,
        None => io::Write::write_all(&mut io::stdout(), &buffer)?,
    }
    Ok(())
}
