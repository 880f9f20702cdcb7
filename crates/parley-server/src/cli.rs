use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "parley-server", about = "AI-mediated realtime interview server")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "parley.toml")]
    pub config: String,

    /// Override the configured bind address.
    #[arg(long)]
    pub bind: Option<String>,
}
