use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "vidintro")]
#[command(about = "Record a candidate introduction video", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the recording session behind the local control API (default)
    Serve,
    /// Print version information
    Version,
    /// Record, review and save a video without the control API
    Record(RecordCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct RecordCliArgs {
    /// How long to record, in seconds
    #[arg(short, long, default_value = "10")]
    pub seconds: u64,
    /// Write the video to a local directory instead of uploading it
    #[arg(long)]
    pub save_local: bool,
}
