use anyhow::Result;
use screen_pilot_app::cli::{parse_args, Command, USAGE};
use screen_pilot_app::{commands, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("❌ {}", e);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    match command {
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        Command::Run(run_args) => {
            logging::init_tracing(run_args.log_level.as_deref())?;
            commands::run::run(run_args).await?;
            Ok(())
        }
    }
}
