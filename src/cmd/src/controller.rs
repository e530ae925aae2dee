use clap::Parser;

#[derive(Debug, Clone, Parser)]
pub struct ControllerCmd {
    #[arg(short = 'f', long, help = "Config file path for the controller")]
    pub file: String,

    #[arg(long = "http-port", help = "HTTP server serving port")]
    pub http_port: Option<u32>,

    #[arg(
        long = "requeue-interval",
        help = "Periodic resync interval in seconds"
    )]
    pub requeue_interval: Option<u64>,
}
