use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use melodia_engine::{ArtifactPaths, ServingState};
use melodia_server::{run_server, AppState, ServerConfig};

/// melodia-server: ABC-notation music generation API
#[derive(Parser)]
#[command(name = "melodia-server")]
struct Cli {
    /// Path to the char2idx.json vocabulary artifact.
    #[arg(long, default_value = "char2idx.json")]
    char2idx: PathBuf,

    /// Path to the idx2char.json vocabulary artifact.
    #[arg(long, default_value = "idx2char.json")]
    idx2char: PathBuf,

    /// Path to the model checkpoint (safetensors).
    #[arg(long, default_value = "model.safetensors")]
    checkpoint: PathBuf,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0:8000")]
    addr: String,

    /// Delimiter used to split the raw sequence into tunes. The default
    /// matches the reference implementation's literal "/n/n".
    #[arg(long, default_value = "/n/n")]
    tune_delimiter: String,

    /// Embedding width of the checkpoint.
    #[arg(long, default_value_t = 256)]
    embedding_dim: usize,

    /// Hidden width of the checkpoint.
    #[arg(long, default_value_t = 2048)]
    hidden_dim: usize,

    /// Maximum concurrent generation runs.
    #[arg(long, default_value_t = 4)]
    max_concurrent: usize,

    /// Default sampling temperature for requests that omit one.
    #[arg(long, default_value_t = 1.0)]
    temperature: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let paths = ArtifactPaths {
        char2idx: cli.char2idx,
        idx2char: cli.idx2char,
        checkpoint: cli.checkpoint,
    };

    // Everything loads before the listener binds; a bad artifact means the
    // process exits instead of serving half-initialized state.
    let serving = ServingState::initialize_with_dims(&paths, cli.embedding_dim, cli.hidden_dim)?;

    let config = ServerConfig {
        tune_delimiter: cli.tune_delimiter,
        default_temperature: cli.temperature,
        max_concurrent: cli.max_concurrent,
    };
    let state = AppState::new(Arc::new(serving), config);

    let addr: std::net::SocketAddr = cli.addr.parse()?;
    tracing::info!("starting server on {}", addr);

    run_server(state, addr).await?;
    Ok(())
}
