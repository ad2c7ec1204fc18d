//! Sends one audio file to the transcription API and prints the transcript.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use seesay::config::TranscribeConfig;
use seesay::logging;
use seesay::transcribe::TranscriptionClient;

#[derive(Parser, Debug)]
#[command(name = "transcribe")]
#[command(about = "Transcribe an audio recording with the configured speech API", long_about = None)]
struct Args {
    /// Audio file to transcribe (mp3, wav, webm, ...)
    audio: PathBuf,

    /// Model name, overrides OPENAI_TRANSCRIBE_MODEL
    #[arg(short, long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let args = Args::parse();
    let mut cfg = TranscribeConfig::from_env()?;
    if let Some(model) = args.model {
        cfg.model = model;
    }

    let client = TranscriptionClient::new(cfg)?;
    let text = client
        .transcribe_file(&args.audio)
        .await
        .with_context(|| format!("transcribe {}", args.audio.display()))?;

    println!("{}", text);
    Ok(())
}
