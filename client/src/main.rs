use clap::{Parser, ValueEnum};
use client::input::{IdleInput, InputSource, ScriptedInput, WanderInput};
use client::network::Client;
use log::info;
use shared::{ProtocolConfig, ADJUSTMENT_WINDOW, DEFAULT_PORT, EPSILON, MOVE_SPEED, TICK_RATE};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum InputMode {
    /// Press nothing
    Idle,
    /// Random walk
    Wander,
    /// Walk a square
    Square,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Tick rate (updates per second); must match the server
    #[arg(short, long, default_value_t = TICK_RATE)]
    tick_rate: u32,

    /// Entity speed in units per second; must match the server
    #[arg(long, default_value_t = MOVE_SPEED)]
    move_speed: f32,

    /// Tolerance before a predicted position is replaced by the server's
    #[arg(long, default_value_t = EPSILON)]
    epsilon: f32,

    /// Where per-frame input comes from
    #[arg(short, long, value_enum, default_value_t = InputMode::Wander)]
    input: InputMode,

    /// Seed for the wander input
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    /// The adjustment window only matters to the server, so the client keeps the default
    fn config(&self) -> ProtocolConfig {
        ProtocolConfig {
            tick_rate: self.tick_rate,
            move_speed: self.move_speed,
            epsilon: self.epsilon,
            adjustment_window: ADJUSTMENT_WINDOW,
        }
    }
}

async fn run<I: InputSource>(
    address: &str,
    config: ProtocolConfig,
    input: I,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::connect(address, config, input).await?;
    client.run().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.config();

    info!("Starting client ({:?}, {:?} input)", config, args.input);

    match args.input {
        InputMode::Idle => run(&args.server, config, IdleInput).await?,
        InputMode::Square => run(&args.server, config, ScriptedInput::square(20)).await?,
        InputMode::Wander => {
            let input = match args.seed {
                Some(seed) => WanderInput::with_seed(seed, 30),
                None => WanderInput::new(30),
            };
            run(&args.server, config, input).await?
        }
    }

    info!("Client stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsilon_flag_reaches_config() {
        let args = Args::try_parse_from(["client", "--epsilon", "0.25", "--input", "idle"]).unwrap();
        let config = args.config();
        assert_eq!(config.epsilon, 0.25);
        assert_eq!(config.adjustment_window, ADJUSTMENT_WINDOW);
        assert!(matches!(args.input, InputMode::Idle));
    }

    #[test]
    fn test_window_flag_is_rejected() {
        assert!(Args::try_parse_from(["client", "--window", "4"]).is_err());
        assert!(Args::try_parse_from(["client", "-w", "4"]).is_err());
    }
}
