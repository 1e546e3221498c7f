use anyhow::Result;
use clap::Parser;
use nocalhost_core::errors::NocalhostError;

mod cli;
mod commands;
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // A missing CLI gets an install hint instead of the raw spawn error
            if let Some(program) = err
                .downcast_ref::<NocalhostError>()
                .and_then(NocalhostError::missing_binary)
            {
                eprintln!("Error: {} not found", program);
                eprintln!(
                    "Install `{}` or point --{} (or the settings file) at its location.",
                    program,
                    ui::binary_flag(program)
                );
                std::process::exit(1);
            }
            Err(err)
        }
    }
}
