use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storycards::core::config::{load_env_files, Config};
use storycards::core::io::{NativeStorage, Storage};
use storycards::core::models::BreakdownDocument;
use storycards::core::state::InMemoryStateStore;
use storycards::services::agent::{AgentRouter, BackendTools};
use storycards::services::breakdown::BreakdownGenerator;
use storycards::services::illustration::IllustrationGenerator;
use storycards::services::image::create_image_client;
use storycards::services::llm::create_llm;
use storycards::services::narration::NarrationGenerator;
use storycards::services::server;
use storycards::services::story::{StoryGenerator, LEARNING_THEMES};
use storycards::services::tts::create_tts_client;
use storycards::services::workflow::WorkflowManager;

#[derive(Parser)]
#[command(name = "storycards")]
#[command(about = "Children's stories, nine-card breakdowns, narration and illustrations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the YAML config file
    #[arg(long, global = true, default_value = "config.yml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write a short story for kids")]
    Story {
        #[arg(long, help = "Learning theme; random when omitted")]
        theme: Option<String>,
        #[arg(long, default_value_t = 1, help = "Number of stories to write")]
        count: usize,
        #[arg(long, help = "List the built-in learning themes and exit")]
        list_themes: bool,
    },
    #[command(about = "Break a story into nine illustrated cards (JSON)")]
    Breakdown {
        #[arg(help = "File holding the story text; '-' for stdin")]
        input: PathBuf,
        #[arg(long, short, help = "Write the JSON document here instead of stdout")]
        output: Option<PathBuf>,
    },
    #[command(about = "Generate narration audio for every card of a breakdown document")]
    Narrate {
        input: PathBuf,
        #[arg(long, help = "Directory for the audio files")]
        output_dir: Option<PathBuf>,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    #[command(about = "Generate an illustration for every card of a breakdown document")]
    Illustrate {
        input: PathBuf,
        #[arg(long, help = "Directory for the images")]
        output_dir: Option<PathBuf>,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    #[command(about = "Story, breakdown, narration and illustrations in one session")]
    Pipeline {
        #[arg(long)]
        theme: Option<String>,
    },
    #[command(about = "Serve the canvas agent over HTTP")]
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// Prints or saves the document. A failure document is still emitted before
/// the command reports the error.
fn emit(doc: &BreakdownDocument, output: Option<&Path>) -> Result<()> {
    let json = doc.to_json();
    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Saved {}", path.display());
        }
        None => println!("{}", json),
    }
    if !doc.success {
        bail!("{}", doc.error.as_deref().unwrap_or("Unknown error"));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    load_env_files(&cwd);

    let cli = Cli::parse();
    let mut config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure '{}' is valid YAML.", cli.config.display());
            return Err(e.into());
        }
    };
    config.ensure_directories()?;

    let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new());
    let output_root = PathBuf::from(&config.output_folder);

    match cli.command {
        Commands::Story {
            theme,
            count,
            list_themes,
        } => {
            if list_themes {
                for (i, theme) in LEARNING_THEMES.iter().enumerate() {
                    println!("{:>2}. {}", i + 1, theme);
                }
                return Ok(());
            }
            let generator = StoryGenerator::new(create_llm(&config)?, &config.llm.story_model);
            if count <= 1 {
                let story = generator.generate_story(theme.as_deref()).await?;
                println!("Theme: {}\nWords: {}\n\n{}", story.theme, story.word_count, story.story);
            } else {
                for (i, result) in generator.generate_multiple_stories(count).await.into_iter().enumerate() {
                    match result {
                        Ok(story) => println!(
                            "--- Story {} ({}, {} words) ---\n{}\n",
                            i + 1,
                            story.theme,
                            story.word_count,
                            story.story
                        ),
                        Err(e) => eprintln!("--- Story {} failed: {} ---", i + 1, e),
                    }
                }
            }
        }
        Commands::Breakdown { input, output } => {
            let summary = read_input(&input)?;
            let generator = BreakdownGenerator::new(create_llm(&config)?, &config.llm.breakdown_model);
            let doc = match generator.breakdown_story(&summary).await {
                Ok(breakdown) => BreakdownDocument::from_breakdown(&breakdown),
                Err(e) => BreakdownDocument::failure(&e),
            };
            emit(&doc, output.as_deref())?;
        }
        Commands::Narrate {
            input,
            output_dir,
            output,
        } => {
            let json = read_input(&input)?;
            let generator = NarrationGenerator::new(create_tts_client(&config)?, storage, output_root);
            let doc = generator
                .narrate_json(&json, output_dir.as_deref())
                .await
                .unwrap_or_else(|e| BreakdownDocument::failure(&e));
            emit(&doc, output.as_deref())?;
        }
        Commands::Illustrate {
            input,
            output_dir,
            output,
        } => {
            let json = read_input(&input)?;
            let generator =
                IllustrationGenerator::new(create_image_client(&config)?, storage, output_root);
            let doc = generator
                .illustrate_json(&json, output_dir.as_deref())
                .await
                .unwrap_or_else(|e| BreakdownDocument::failure(&e));
            emit(&doc, output.as_deref())?;
        }
        Commands::Pipeline { theme } => {
            let manager = WorkflowManager::new(
                &config,
                create_llm(&config)?,
                create_tts_client(&config)?,
                create_image_client(&config)?,
                storage,
            );
            let report = manager.run(theme.as_deref()).await?;
            println!(
                "Session {}: \"{}\" ({} narrations, {} illustrations)",
                report.session_dir.display(),
                report.document.title,
                report.document.narrations_generated.unwrap_or(0),
                report.document.illustrations_generated.unwrap_or(0)
            );
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let llm = create_llm(&config)?;
            let backend = BackendTools::new(
                llm.clone(),
                storage,
                PathBuf::from(&config.uploads_folder),
                &config.llm.agent_model,
            )
            .with_content_limit(config.agent.content_limit)
            .with_policy(config.llm.on_malformed_response);
            let agent = AgentRouter::new(
                llm,
                backend,
                Arc::new(InMemoryStateStore::new()),
                &config.llm.agent_model,
                config.agent.max_steps,
            );
            server::serve(&config.server, Arc::new(agent))
                .await
                .context("Server failed")?;
        }
    }

    Ok(())
}
