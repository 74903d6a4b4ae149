use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "molnus")]
#[command(about = "Molnus camera detection bridge", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API and the fetch timers
    Serve(ServeArgs),
    /// Run one fetch cycle and print its result as JSON
    Fetch(FetchArgs),
    /// Validate the configuration and try to log in with every entry
    Check(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (default: $MOLNUS_CONFIG or config/molnus.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Entry id (first configured entry when omitted)
    #[arg(long)]
    pub entry: Option<String>,

    /// Camera id (entry default when omitted)
    #[arg(long)]
    pub camera: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub offset: u32,

    /// Page size (entry default_limit when omitted)
    #[arg(long)]
    pub limit: Option<u32>,

    /// Only images Molnus marked as wildlife
    #[arg(long)]
    pub wildlife_required: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}
