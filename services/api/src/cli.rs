use crate::demo::{run_classify, run_demo, ClassifyArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use recovery_docs::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Recovery Document Service",
    about = "Run and demonstrate the surplus-funds recovery document service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run an in-memory walkthrough from intake to a submitted case
    Demo(DemoArgs),
    /// Classify a questionnaire file and list the documents it requires
    Classify(ClassifyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Open an agent session at startup and print its bearer token
    #[arg(long)]
    pub(crate) agent_email: Option<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Classify(args) => run_classify(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["recovery-docs-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn demo_flags_parse() {
        let cli = Cli::try_parse_from([
            "recovery-docs-api",
            "demo",
            "--heir",
            "--estate-open",
            "--state",
            "FL",
            "--audit-csv",
            "audit.csv",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert!(args.heir);
                assert!(args.estate_open);
                assert_eq!(args.state, "FL");
                assert!(args.audit_csv.is_some());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
