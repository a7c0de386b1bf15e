use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use colored::*;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use pitch_finder::cli::{resolve_log_filter, Args, Command, RangeAction};
use pitch_finder::config::Config;
use pitch_finder::dashboard::{format_history, load_dashboard, sign_out};
use pitch_finder::keyboard::{keyboard, keyboard_width, layout_of, resolve_key};
use pitch_finder::preview::{LogPlayer, PreviewVoice};
use pitch_finder::routes::Navigation;
use pitch_finder::workflow::ComparisonRequest;
use pitch_finder::{App, PitchError, Result};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(resolve_log_filter(args.verbose, config.log_filter())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> Result<()> {
    // commands that need neither backend nor analysis service
    match &command {
        Command::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Args::command(),
                "pitch-finder",
                &mut std::io::stdout(),
            );
            return Ok(());
        }
        Command::Keyboard => return print_keyboard(),
        _ => {}
    }

    let app = App::from_config(config)?;
    let route = command.route();
    if route.requires_session() {
        match app.navigate(route.path()).await {
            Navigation::Render(_, Some(session)) => {
                debug!(user_id = %session.user_id, route = %route, "session gate passed")
            }
            _ => return Err(PitchError::auth("Please log in first (pitch-finder login)")),
        }
    }

    match command {
        Command::Register { email, password } => {
            let account = app.backend().sign_up(&email, &password).await?;
            println!(
                "{} Account created for {}. Sign in with `pitch-finder login`.",
                "✓".green(),
                account.email.bold()
            );
        }
        Command::Login { email, password } => {
            let session = app.backend().sign_in(&email, &password).await?;
            println!("{} Signed in as {}", "✓".green(), session.email.bold());
        }
        Command::Logout => {
            sign_out(app.backend()).await?;
            println!("Signed out.");
        }
        Command::Whoami => match app.backend().current_session().await? {
            Some(session) => println!("{} ({})", session.email.bold(), session.user_id.dimmed()),
            None => println!("{}", "Not signed in.".yellow()),
        },
        Command::Range { action } => run_range(&app, action).await?,
        Command::Compare {
            original_url,
            cover_url,
            high,
            low,
        } => {
            let mut request = ComparisonRequest::new(original_url, cover_url);
            if let (Some(high), Some(low)) = (high, low) {
                request.user_high_note = Some(resolve_key(&high)?.display_name());
                request.user_low_note = Some(resolve_key(&low)?.display_name());
            }
            println!("{}", "Comparing, this can take a few minutes...".dimmed());
            let submission = app.workflow().submit(request).await?;
            println!("Key difference:  {}", submission.key_difference.to_string().bold());
            println!("Recommended key: {}", submission.recommended_key.to_string().bold());
            if let Some(record) = &submission.record {
                println!("{} Saved \"{}\" to your history", "✓".green(), record.title);
            }
            if let Some(warning) = &submission.warning {
                println!("{} {}", "warning:".yellow().bold(), warning);
            }
        }
        Command::History => {
            let dashboard = load_dashboard(app.backend()).await?;
            println!("History of {}", dashboard.session.email.bold());
            if dashboard.is_empty() {
                println!("{}", "No comparisons yet.".dimmed());
            } else {
                print!("{}", format_history(&dashboard.history));
            }
        }
        Command::Keyboard | Command::Completions { .. } => {}
    }
    Ok(())
}

async fn run_range(app: &App, action: RangeAction) -> Result<()> {
    let mut selector = app.range_selector(PreviewVoice::new(Box::new(LogPlayer)));
    match action {
        RangeAction::Show => {
            selector.load(app.backend()).await;
            if let Some(e) = selector.stored().rejected() {
                return Err(PitchError::persistence(format!("could not load your range ({e})")));
            }
            match selector.stored().resolved() {
                Some(Some(range)) => println!(
                    "Lowest: {}  Highest: {}",
                    range.low_sound.bold(),
                    range.high_sound.bold()
                ),
                _ => println!("{}", "No range saved yet.".dimmed()),
            }
        }
        RangeAction::Set { low, high } => {
            let low = resolve_key(&low)?;
            let high = resolve_key(&high)?;
            selector.arm_low();
            selector.key_pressed(low);
            selector.arm_high();
            selector.key_pressed(high);
            let range = selector.confirm(app.backend()).await?;
            println!(
                "{} Saved range {} .. {}",
                "✓".green(),
                range.low_sound.bold(),
                range.high_sound.bold()
            );
        }
    }
    Ok(())
}

fn print_keyboard() -> Result<()> {
    println!("{:<4} {:<4} {:<8} {:<6} {:>7} {:>9}", "#", "id", "name", "kind", "x", "Hz");
    for (index, key) in keyboard().iter().enumerate() {
        let line = format!(
            "{:<4} {:<4} {:<8} {:<6} {:>7.1} {:>9.2}",
            index,
            key.id,
            key.display_name(),
            key.kind.to_string(),
            layout_of(index)?,
            key.frequency()
        );
        if key.is_white() {
            println!("{line}");
        } else {
            println!("{}", line.dimmed());
        }
    }
    println!("width: {:.0}", keyboard_width());
    Ok(())
}
