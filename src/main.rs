use clap::Parser;
use intake::cli::commands::{completions, flows, init, session, status, validate, wizard};
use intake::cli::{Cli, Commands, GlobalOpts};
use miette::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_logging(&global);

    match cli.command {
        Commands::Init(args) => init::run(args),
        Commands::Flows(args) => flows::run(args, &global),
        Commands::Start(args) => session::start(args, &global).await,
        Commands::Set(args) => session::set(args, &global),
        Commands::Next => session::next(&global).await,
        Commands::Back => session::back(&global),
        Commands::Goto(args) => session::goto(args, &global),
        Commands::Skip => session::skip(&global),
        Commands::Analyze(args) => session::analyze(args, &global).await,
        Commands::Review(args) => session::review(args, &global),
        Commands::Submit => session::submit(&global).await,
        Commands::Status(args) => status::run(args, &global),
        Commands::Cancel => session::cancel(&global),
        Commands::Validate(args) => validate::run(args),
        Commands::Wizard(args) => wizard::run(args, &global).await,
        Commands::Completions(args) => completions::run(args),
    }
}

/// Log to stderr so stdout stays pipeable. `RUST_LOG` wins over `--verbose`.
fn init_logging(global: &GlobalOpts) {
    let default = if global.verbose { "intake=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
