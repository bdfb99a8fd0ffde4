use clap::Parser;
use log::info;
use server::network::Server;
use server::session::MAX_CLIENTS;
use shared::{ProtocolConfig, ADJUSTMENT_WINDOW, DEFAULT_PORT, EPSILON, MOVE_SPEED, TICK_RATE};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value_t = TICK_RATE)]
    tick_rate: u32,

    /// Entity speed in units per second
    #[arg(long, default_value_t = MOVE_SPEED)]
    move_speed: f32,

    /// Adjustment window in ticks
    #[arg(short = 'w', long, default_value_t = ADJUSTMENT_WINDOW)]
    window: u8,

    /// Maximum number of connected clients
    #[arg(short, long, default_value_t = MAX_CLIENTS)]
    max_clients: usize,
}

impl Args {
    /// Epsilon only matters to clients, so the server keeps the default
    fn config(&self) -> ProtocolConfig {
        ProtocolConfig {
            tick_rate: self.tick_rate,
            move_speed: self.move_speed,
            epsilon: EPSILON,
            adjustment_window: self.window,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.config();

    let address = format!("{}:{}", args.host, args.port);
    info!("Starting server on {} ({:?})", address, config);

    let mut server = Server::bind(&address, config, args.max_clients).await?;
    server.run().await?;

    info!("Server stopped");
    Ok(())
}
