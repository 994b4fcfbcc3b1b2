use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "spatialvideo", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a side-by-side stereo video to MV-HEVC (requires `ffmpeg` on PATH).
    Convert(ConvertArgs),
    /// Copy the audio track of a video into `extracted_audio.m4a`.
    ExtractAudio(ExtractAudioArgs),
    /// Combine the video track of one file with the audio track of another.
    Merge(MergeArgs),
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Side-by-side input video.
    input: PathBuf,

    /// Transcode options JSON (any omitted field keeps its default).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Suffix appended to the input file stem for the output name.
    #[arg(long)]
    suffix: Option<String>,

    /// Fail instead of replacing an existing output file.
    #[arg(long, default_value_t = false)]
    keep_existing: bool,
}

#[derive(Parser, Debug)]
struct ExtractAudioArgs {
    /// Source video with an audio track.
    input: PathBuf,

    /// Directory for `extracted_audio.m4a` (defaults to the input's directory).
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct MergeArgs {
    /// File providing the video track.
    video: PathBuf,

    /// File providing the audio track.
    audio: PathBuf,

    /// Output path (defaults to `output.mov` beside the video).
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Convert(args) => cmd_convert(args),
        Command::ExtractAudio(args) => cmd_extract_audio(args),
        Command::Merge(args) => cmd_merge(args),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_opts_json(path: &Path) -> anyhow::Result<spatialvideo::TranscodeOpts> {
    let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
    let opts = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse config '{}'", path.display()))?;
    Ok(opts)
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let mut opts = match args.config.as_deref() {
        Some(path) => read_opts_json(path)?,
        None => spatialvideo::TranscodeOpts::default(),
    };
    if let Some(suffix) = args.suffix {
        opts.output_suffix = suffix;
    }
    if args.keep_existing {
        opts.remove_existing_output = false;
    }

    let out = spatialvideo::spatial_video(&args.input, &opts)
        .with_context(|| format!("convert '{}'", args.input.display()))?;
    println!("{}", out.display());
    Ok(())
}

fn cmd_extract_audio(args: ExtractAudioArgs) -> anyhow::Result<()> {
    let out_dir = match args.out_dir {
        Some(dir) => dir,
        None => args
            .input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf(),
    };
    let out = spatialvideo::extract_audio(&args.input, &out_dir)
        .with_context(|| format!("extract audio from '{}'", args.input.display()))?;
    println!("{}", out.display());
    Ok(())
}

fn cmd_merge(args: MergeArgs) -> anyhow::Result<()> {
    let out = spatialvideo::merge(&args.video, &args.audio, args.out.as_deref())
        .with_context(|| {
            format!(
                "merge '{}' with '{}'",
                args.video.display(),
                args.audio.display()
            )
        })?;
    println!("{}", out.display());
    Ok(())
}
