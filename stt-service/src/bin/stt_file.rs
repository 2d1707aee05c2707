/// File transcription CLI
///
/// Transcribes one audio file and prints the transcript, optionally with a
/// per-word table or as JSON.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use stt_bridge::{Engine, EngineBuilder, Transcript};
use stt_service::init_logging;
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[command(name = "stt-file")]
#[command(author = "AetherOS Team")]
#[command(version)]
#[command(about = "Transcribe an audio file with the native speech engine", long_about = None)]
struct Args {
    /// Audio file to transcribe
    #[arg(short, long, value_name = "PATH")]
    input: PathBuf,

    /// Access key for the native engine
    #[arg(short, long, env = "STT_ACCESS_KEY", hide_env_values = true)]
    access_key: String,

    /// Model parameter file (defaults to the bundled model for --language)
    #[arg(short, long, value_name = "PATH")]
    model_path: Option<PathBuf>,

    /// Native library (defaults to the bundled library for this platform)
    #[arg(short, long, value_name = "PATH")]
    library_path: Option<PathBuf>,

    /// Language of the bundled model
    #[arg(long, default_value = stt_bridge::DEFAULT_LANGUAGE)]
    language: String,

    /// Disable automatic punctuation
    #[arg(short, long)]
    disable_automatic_punctuation: bool,

    /// Tag each word with a speaker
    #[arg(short = 'r', long)]
    enable_diarization: bool,

    /// Decode a 16-bit mono WAV on the host and send raw samples
    #[arg(long)]
    pcm: bool,

    /// Print word metadata
    #[arg(short, long)]
    verbose: bool,

    /// Print the result as JSON
    #[arg(long, conflicts_with = "verbose")]
    json: bool,
}

fn main() {
    init_logging();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut builder = EngineBuilder::new(args.access_key.clone());
    builder
        .language(args.language.clone())
        .enable_automatic_punctuation(!args.disable_automatic_punctuation)
        .enable_diarization(args.enable_diarization);
    if let Some(model_path) = &args.model_path {
        builder.model_path(model_path);
    }
    if let Some(library_path) = &args.library_path {
        builder.library_path(library_path);
    }

    let mut engine = builder.init().context("Failed to create speech engine")?;
    debug!("Engine {:?}", engine);

    let result = if args.pcm {
        let pcm = read_pcm(&args.input, &engine)?;
        engine.process(&pcm)
    } else {
        engine.process_file(&args.input)
    };
    let transcript = result.with_context(|| format!("Failed to transcribe {}", args.input.display()))?;

    engine.delete()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&transcript)?);
    } else {
        println!("{}", transcript.transcript);
        if args.verbose {
            println!();
            print!("{}", word_table(&transcript));
        }
    }
    Ok(())
}

fn read_pcm(path: &Path, engine: &Engine) -> Result<Vec<i16>> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let sample_rate = engine.sample_rate()?;

    if spec.channels != 1 || spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        bail!(
            "{} must be 16-bit mono PCM (found {} channels, {} bits)",
            path.display(),
            spec.channels,
            spec.bits_per_sample
        );
    }
    if spec.sample_rate != sample_rate {
        bail!(
            "{} is sampled at {} Hz; the engine expects {} Hz",
            path.display(),
            spec.sample_rate,
            sample_rate
        );
    }

    reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to decode WAV samples")
}

fn word_table(transcript: &Transcript) -> String {
    let width = transcript
        .words
        .iter()
        .map(|w| w.word.chars().count())
        .max()
        .unwrap_or(0)
        .max("Word".len());

    let mut table = format!(
        "{:<width$}  {:>9}  {:>7}  {:>10}  {:>7}\n",
        "Word",
        "Start Sec",
        "End Sec",
        "Confidence",
        "Speaker",
        width = width
    );
    table.push_str(&format!(
        "{:<width$}  {:>9}  {:>7}  {:>10}  {:>7}\n",
        "----",
        "---------",
        "-------",
        "----------",
        "-------",
        width = width
    ));
    for word in &transcript.words {
        table.push_str(&format!(
            "{:<width$}  {:>9.2}  {:>7.2}  {:>10.2}  {:>7}\n",
            word.word,
            word.start_sec,
            word.end_sec,
            word.confidence,
            word.speaker_tag,
            width = width
        ));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use stt_bridge::Word;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "stt-file",
            "--input",
            "speech.wav",
            "--access-key",
            "key",
            "--enable-diarization",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(args.input, PathBuf::from("speech.wav"));
        assert!(args.enable_diarization);
        assert!(!args.disable_automatic_punctuation);
        assert_eq!(args.language, "en");
    }

    #[test]
    fn test_json_conflicts_with_verbose() {
        let result = Args::try_parse_from([
            "stt-file", "-i", "a.wav", "-a", "key", "--json", "--verbose",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_word_table() {
        let transcript = Transcript {
            transcript: "hello there".to_string(),
            words: vec![
                Word {
                    word: "hello".to_string(),
                    start_sec: 0.0,
                    end_sec: 0.42,
                    confidence: 0.97,
                    speaker_tag: 1,
                },
                Word {
                    word: "there".to_string(),
                    start_sec: 0.5,
                    end_sec: 0.9,
                    confidence: 0.88,
                    speaker_tag: 2,
                },
            ],
        };

        let table = word_table(&transcript);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Word"));
        assert!(lines[2].starts_with("hello"));
        assert!(lines[2].contains("0.42"));
        assert!(lines[3].trim_end().ends_with('2'));
    }
}
