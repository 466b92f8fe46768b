use clap::{CommandFactory, Parser, Subcommand};
use miditrick::commands::{self, CommonOptions};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    opts: CommonOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Transpose and route MIDI between every connected port
    Run(commands::run::Options),
    /// List the MIDI ports the selected backend can see
    Ports(commands::ports::Options),
    /// `miditrick completions --generate=zsh > miditrick.zsh`
    Completions(Completions),
}

#[derive(Debug, Parser)]
#[command(arg_required_else_help(true))]
struct Completions {
    /// shell to generate the completion script for
    #[arg(long = "generate", value_enum)]
    shell: Option<clap_complete::Shell>,
}

impl Completions {
    fn generate(&self) -> anyhow::Result<()> {
        let Some(shell) = self.shell else {
            anyhow::bail!("no shell specified for autocompletion generation");
        };

        use std::io::Write;
        std::io::stdout().flush()?;

        let mut cli = Cli::command();
        clap_complete::generate(shell, &mut cli, "miditrick", &mut std::io::stdout());

        Ok(())
    }
}

fn run(args: Cli) -> anyhow::Result<i32> {
    match args.command {
        Commands::Run(opts) => Ok(commands::run::run(opts, args.opts)?.code()),
        Commands::Ports(opts) => commands::ports::run(opts, args.opts).map(|()| 0),
        Commands::Completions(c) => c.generate().map(|()| 0),
    }
}

fn main() {
    let code = match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            if miditrick::logger::is_active() {
                log::error!("{e:#}");
            } else {
                use colored::*;
                eprintln!("{} {}", "Error:".red().bold(), format!("{e:#}").bold());
            }
            1
        }
    };

    std::process::exit(code);
}
