use clap::Parser;
use log::{debug, LevelFilter};
use serde::Serialize;

use teller::teller::config_reader::{read_new_poll, read_settings};
use teller::teller::run_count;
use teller::{PollRegistry, ResultMode, ServiceSettings, TellerError, TellerResult, Vote};

mod args;

use crate::args::{Args, Command, PollCommand};

fn print_json<T: Serialize>(value: &T) -> TellerResult<()> {
    let js = serde_json::to_string_pretty(value)
        .map_err(|source| TellerError::WritingJson { source })?;
    println!("{}", js);
    Ok(())
}

fn load_settings(args: &Args) -> TellerResult<ServiceSettings> {
    let settings = match &args.settings {
        Some(p) => read_settings(p)?,
        None => ServiceSettings::default(),
    };
    Ok(match &args.polls {
        Some(folder) => settings.with_polls_folder(folder),
        None => settings,
    })
}

async fn run_poll_command(command: PollCommand, settings: ServiceSettings) -> TellerResult<()> {
    debug!("settings: {:?}", settings);
    let registry = PollRegistry::open(settings).await?;

    match command {
        PollCommand::Create { poll } => {
            let new_poll = read_new_poll(&poll)?;
            let id = registry.add_poll(new_poll).await?;
            println!("{}", id);
        }
        PollCommand::List => print_json(&registry.poll_list())?,
        PollCommand::Details { election } => print_json(&registry.details(election)?)?,
        PollCommand::Vote {
            election,
            preferences,
        } => {
            registry.submit(&Vote {
                election_id: election,
                preferences,
            })?;
        }
        PollCommand::Results {
            election,
            immediate,
        } => {
            let mode = if immediate {
                ResultMode::Immediate
            } else {
                ResultMode::Consistent
            };
            print_json(&registry.results(election, mode).await?)?;
        }
        PollCommand::Export { election } => print!("{}", registry.export(election).await?),
    }

    // Queued ballots are written before exiting.
    registry.shutdown().await;
    Ok(())
}

async fn run(args: Args) -> TellerResult<()> {
    let settings = load_settings(&args)?;
    match args.command {
        Command::Count {
            config,
            votes,
            out,
            reference,
        } => {
            run_count(&config, &votes, out, reference)?;
            Ok(())
        }
        Command::Poll(command) => run_poll_command(command, settings).await,
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    if let Err(e) = run(args).await {
        eprintln!("An error occured: {}", e);
        std::process::exit(1);
    }
}
