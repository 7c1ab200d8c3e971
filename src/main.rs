use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wavglitch::glitcher::{glitch_file, glitch_speech, GlitchOptions, GlitchReport};
use wavglitch::synth::{CommandSynthesizer, Locale};
use wavglitch::{parse_header, BLOCK_SIZE};

#[derive(Parser)]
#[command(name = "wavglitch", version, about = "Glitch 16-bit PCM wave containers")]
struct Cli {
    /// Log every block's effect choice
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Glitch an existing wave file
    Glitch {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Seed for reproducible output (random if omitted)
        #[arg(short, long)]
        seed: Option<u64>,
        /// Block size in bytes (must be even)
        #[arg(short, long, default_value_t = BLOCK_SIZE)]
        block_size: usize,
    },
    /// Speak text with a host TTS program, then glitch it
    Speak {
        #[arg(short, long)]
        output: PathBuf,
        /// Locale: en-US or fr-FR
        #[arg(short, long, default_value = "en-US")]
        locale: String,
        /// TTS program to run (espeak-compatible flags)
        #[arg(long, default_value = "espeak-ng")]
        program: String,
        #[arg(short, long)]
        seed: Option<u64>,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Show the parsed header of a wave file
    Info {
        input: PathBuf,
        /// Emit JSON instead of a listing
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Glitch ───────────────────────────────────────────────────────────
        Commands::Glitch { input, output, seed, block_size } => {
            let opts = GlitchOptions { block_size, seed };
            let report = glitch_file(&input, &output, &opts)?;
            print_report(&report);
            println!("Wrote: {}", output.display());
        }

        // ── Speak ────────────────────────────────────────────────────────────
        Commands::Speak { output, locale, program, seed, text } => {
            let locale: Locale = locale.parse()?;
            let synth = CommandSynthesizer::new(program);
            let opts = GlitchOptions { seed, ..GlitchOptions::default() };

            let mut buf = Vec::new();
            let report = glitch_speech(&synth, &text.join(" "), locale, &mut buf, &opts)?;
            let mut out = BufWriter::new(File::create(&output)?);
            out.write_all(&buf)?;
            out.flush()?;
            print_report(&report);
            println!("Wrote: {}", output.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let table = parse_header(&mut File::open(&input)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&table.summary())?);
            } else {
                println!("── {} ──", input.display());
                print!("{table}");
                println!();
                println!("  Raw header         {}", hex::encode(table.full_header()));
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let default = if verbose { "wavglitch=debug" } else { "wavglitch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_report(r: &GlitchReport) {
    println!("  Size           {} -> {} B ({:+})", r.sizes.total_before, r.sizes.total_after, r.sizes.delta);
    println!("  Blocks         {} downsampled, {} distorted", r.downsample.blocks, r.distortion.blocks);
    println!("  chunkSize      {}", r.sizes.chunk_size);
    println!("  dataChunkSize  {}", r.sizes.data_chunk_size);
}
