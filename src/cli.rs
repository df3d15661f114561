use ai_shorts_gen::source::ContentRequest;
use ai_shorts_gen::upload::Privacy;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

#[derive(Parser, Debug)]
#[command(
    name = "ai-shorts-gen",
    about = "Generate and upload short-form videos from AI stories, articles, transcripts or time-lapses",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (environment variables override it)
    #[arg(long, global = true, default_value = "config.json", value_name = "FILE")]
    pub config: PathBuf,

    /// Directory that receives one timestamped folder per run
    #[arg(long, global = true, value_name = "DIR")]
    pub runs_dir: Option<PathBuf>,

    /// Keep the final video local
    #[arg(long, global = true)]
    pub no_upload: bool,

    /// Use still images only, never image-to-video
    #[arg(long, global = true)]
    pub no_video: bool,

    /// Upload privacy: public, unlisted or private
    #[arg(long, global = true, default_value = "public")]
    pub privacy: Privacy,

    /// Background track instead of a random one from the music directory
    #[arg(long, global = true, value_name = "FILE")]
    pub music: Option<PathBuf>,

    /// Keep producing videos until interrupted
    #[arg(long = "loop", global = true)]
    pub repeat: bool,

    /// Pause between runs in loop mode
    #[arg(long, global = true, default_value = "3600", value_name = "SECS")]
    pub interval_secs: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Generate a micro-story and narrate it
    Ai,

    /// Summarize a web article into a narrated short
    Internet {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Turn a YouTube video's transcript into a narrated short
    Transcript {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// One generated image per year, cross-faded into a silent slideshow
    Timelapse {
        topic: String,
        start_year: i32,
        end_year: i32,
    },
}

impl From<Commands> for ContentRequest {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Ai => ContentRequest::AiStory,
            Commands::Internet { url } => ContentRequest::Internet { url },
            Commands::Transcript { url } => ContentRequest::Transcript { url },
            Commands::Timelapse {
                topic,
                start_year,
                end_year,
            } => ContentRequest::Timelapse {
                topic,
                start_year,
                end_year,
            },
        }
    }
}

struct Prompter {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompter {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn ask(&mut self, question: &str) -> Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await?;
        stdout.flush().await?;
        let line = self
            .lines
            .next_line()
            .await
            .context("Failed to read from stdin")?
            .context("stdin closed")?;
        Ok(line.trim().to_string())
    }

    async fn ask_year(&mut self, question: &str) -> Result<i32> {
        let answer = self.ask(question).await?;
        answer
            .parse()
            .with_context(|| format!("Not a year: {answer}"))
    }
}

/// Interactive fallback when no subcommand was given.
pub async fn prompt_request() -> Result<ContentRequest> {
    let mut prompter = Prompter::new();
    let choice = prompter
        .ask("Choose a mode:\n  1) AI story\n  2) Internet article\n  3) YouTube transcript\n  4) Time-lapse\n> ")
        .await?;

    let request = match choice.as_str() {
        "1" | "ai" => ContentRequest::AiStory,
        "2" | "internet" => ContentRequest::Internet {
            url: prompter.ask("Article URL: ").await?,
        },
        "3" | "transcript" => ContentRequest::Transcript {
            url: prompter.ask("YouTube URL: ").await?,
        },
        "4" | "timelapse" => ContentRequest::Timelapse {
            topic: prompter.ask("Topic: ").await?,
            start_year: prompter.ask_year("Start year: ").await?,
            end_year: prompter.ask_year("End year: ").await?,
        },
        other => bail!("Unknown mode: {other}"),
    };
    Ok(request)
}
