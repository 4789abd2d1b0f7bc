use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::info;

use pintail_core::decoder::Decoder;
use pintail_core::dict::Dictionary;

#[derive(Parser)]
#[command(name = "pintail", about = "Structured-perceptron input method engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a model, evaluating after each epoch
    Train {
        /// Dictionary file (`code text` per line)
        dict_file: PathBuf,
        /// Training corpus (`code text` per line)
        train_file: PathBuf,
        /// Held-out corpus evaluated after each epoch
        eval_file: PathBuf,
        /// Where to write the trained model
        model_file: PathBuf,
        #[arg(long, default_value_t = 2)]
        epochs: usize,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
        #[arg(long, default_value_t = 20)]
        beam_size: usize,
        #[arg(long, default_value_t = 0.01)]
        learning_rate: f64,
        /// Worker threads for batch gradients (default: min(batch-size, 10))
        #[arg(long)]
        threads: Option<usize>,
        /// Drop dictionary entries with codes longer than this many bytes
        #[arg(long)]
        code_len_limit: Option<usize>,
        /// Drop dictionary entries with texts longer than this many bytes
        #[arg(long)]
        text_len_limit: Option<usize>,
    },

    /// Convert codes read from stdin, one candidate list per code
    Predict {
        /// Dictionary file (`code text` per line)
        dict_file: PathBuf,
        /// Trained model file
        model_file: PathBuf,
        #[arg(long, default_value_t = 20)]
        beam_size: usize,
        /// Candidates to print per code
        #[arg(short, long, default_value_t = 10)]
        n: usize,
        /// Output one JSON array per code instead of text
        #[arg(long)]
        json: bool,
        #[arg(long)]
        code_len_limit: Option<usize>,
        #[arg(long)]
        text_len_limit: Option<usize>,
    },

    /// Score a held-out corpus against a trained model
    Evaluate {
        /// Dictionary file (`code text` per line)
        dict_file: PathBuf,
        /// Trained model file
        model_file: PathBuf,
        /// Corpus to score (`code text` per line)
        eval_file: PathBuf,
        #[arg(long, default_value_t = 20)]
        beam_size: usize,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
        #[arg(long)]
        threads: Option<usize>,
        /// Output metrics as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn open_dict(
    path: &Path,
    code_len_limit: Option<usize>,
    text_len_limit: Option<usize>,
) -> Arc<Dictionary> {
    let start = Instant::now();
    let dict = Dictionary::open_limited(path, code_len_limit, text_len_limit).unwrap_or_else(|e| {
        eprintln!("Failed to load dictionary {}: {}", path.display(), e);
        process::exit(1);
    });
    info!(
        words = dict.len(),
        elapsed = ?start.elapsed(),
        "dictionary ready"
    );
    Arc::new(dict)
}

fn open_reader(path: &Path) -> BufReader<File> {
    let file = File::open(path).unwrap_or_else(|e| {
        eprintln!("Failed to open {}: {}", path.display(), e);
        process::exit(1);
    });
    BufReader::new(file)
}

fn init_threads(threads: Option<usize>, batch_size: usize) {
    let threads = threads.unwrap_or_else(|| batch_size.min(10)).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .unwrap_or_else(|e| {
            eprintln!("Failed to configure thread pool: {e}");
            process::exit(1);
        });
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            dict_file,
            train_file,
            eval_file,
            model_file,
            epochs,
            batch_size,
            beam_size,
            learning_rate,
            threads,
            code_len_limit,
            text_len_limit,
        } => {
            init_threads(threads, batch_size);
            let dict = open_dict(&dict_file, code_len_limit, text_len_limit);
            let mut decoder = Decoder::with_params(dict, beam_size, learning_rate);

            for epoch in 1..=epochs {
                let start = Instant::now();
                let metrics = decoder
                    .train(open_reader(&train_file), batch_size)
                    .unwrap_or_else(|e| {
                        eprintln!("Training failed: {e}");
                        process::exit(1);
                    });
                info!(epoch, elapsed = ?start.elapsed(), %metrics, "epoch trained");

                let start = Instant::now();
                let metrics = decoder
                    .evaluate(open_reader(&eval_file), batch_size)
                    .unwrap_or_else(|e| {
                        eprintln!("Evaluation failed: {e}");
                        process::exit(1);
                    });
                info!(epoch, elapsed = ?start.elapsed(), %metrics, "epoch evaluated");
            }

            decoder.save_model(&model_file).unwrap_or_else(|e| {
                eprintln!("Failed to write model {}: {}", model_file.display(), e);
                process::exit(1);
            });
        }

        Command::Predict {
            dict_file,
            model_file,
            beam_size,
            n,
            json,
            code_len_limit,
            text_len_limit,
        } => {
            let dict = open_dict(&dict_file, code_len_limit, text_len_limit);
            let mut decoder = Decoder::with_params(dict, beam_size, 0.01);
            decoder.load_model(&model_file).unwrap_or_else(|e| {
                eprintln!("Failed to load model {}: {}", model_file.display(), e);
                process::exit(1);
            });

            for line in io::stdin().lock().lines() {
                let line = line.unwrap_or_else(|e| {
                    eprintln!("Failed to read stdin: {e}");
                    process::exit(1);
                });
                for code in line.split_whitespace() {
                    let candidates = decoder.predict(code, n);
                    if json {
                        println!(
                            "{}",
                            serde_json::to_string(&candidates).expect("JSON serialization failed")
                        );
                    } else {
                        for (rank, candidate) in candidates.iter().enumerate() {
                            println!("{}: {} {}", rank + 1, candidate.text, candidate.prob);
                        }
                    }
                }
            }
        }

        Command::Evaluate {
            dict_file,
            model_file,
            eval_file,
            beam_size,
            batch_size,
            threads,
            json,
        } => {
            init_threads(threads, batch_size);
            let dict = open_dict(&dict_file, None, None);
            let mut decoder = Decoder::with_params(dict, beam_size, 0.01);
            decoder.load_model(&model_file).unwrap_or_else(|e| {
                eprintln!("Failed to load model {}: {}", model_file.display(), e);
                process::exit(1);
            });

            let metrics = decoder
                .evaluate(open_reader(&eval_file), batch_size)
                .unwrap_or_else(|e| {
                    eprintln!("Evaluation failed: {e}");
                    process::exit(1);
                });

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&metrics).expect("JSON serialization failed")
                );
            } else {
                println!("{metrics}");
            }
        }
    }
}
