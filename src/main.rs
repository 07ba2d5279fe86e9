use anyhow::{bail, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::sync::Arc;
use tracing::warn;

use stardock_podium::config::Config;
use stardock_podium::library::BookLibrary;
use stardock_podium::llm::create_llm;
use stardock_podium::memory::{MemoryClient, ReferenceSync};
use stardock_podium::pipeline::AudioPipeline;
use stardock_podium::quality::{CheckOptions, QualityChecker, SectionReport};
use stardock_podium::store::EpisodeStore;
use stardock_podium::story::{EpisodeRequest, StoryBuilder};
use stardock_podium::tts::{ElevenLabsSynthesizer, NewVoice, VoiceRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("stardock_podium=info,warn")
        .init();

    let matches = build_cli().get_matches();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });
    config.validate()?;

    match matches.subcommand() {
        Some(("new-episode", args)) => new_episode(&config, args).await,
        Some(("generate-characters", args)) => generate_characters(&config, args).await,
        Some(("generate-scenes", args)) => generate_scenes(&config, args).await,
        Some(("generate-script", args)) => generate_script(&config, args).await,
        Some(("generate-audio", args)) => generate_audio(&config, args).await,
        Some(("list-episodes", args)) => list_episodes(&config, args).await,
        Some(("register-voice", args)) => register_voice(&config, args).await,
        Some(("list-voices", _)) => list_voices(&config).await,
        Some(("sync-memory", args)) => sync_memory(&config, args).await,
        Some(("check-quality", args)) => check_quality(&config, args).await,
        _ => {
            let mut cli = build_cli();
            cli.print_long_help()?;
            Ok(())
        }
    }
}

fn build_cli() -> Command {
    Command::new("Stardock Podium")
        .version("0.1.0")
        .author("Stardock")
        .about("AI-driven podcast episode generation")
        .subcommand(
            Command::new("new-episode")
                .about("Create a new episode with a planned beat timeline")
                .arg(
                    Arg::new("title")
                        .short('t')
                        .long("title")
                        .value_name("TITLE")
                        .help("Episode title (generated from the theme when omitted)"),
                )
                .arg(
                    Arg::new("theme")
                        .long("theme")
                        .value_name("THEME")
                        .help("Story theme for the episode"),
                )
                .arg(
                    Arg::new("series")
                        .short('s')
                        .long("series")
                        .value_name("SERIES")
                        .help("Series the episode belongs to"),
                )
                .arg(
                    Arg::new("episode-number")
                        .short('n')
                        .long("episode-number")
                        .value_name("NUM")
                        .help("Episode number (next in the series when omitted)"),
                )
                .arg(
                    Arg::new("duration")
                        .short('d')
                        .long("duration")
                        .value_name("MINUTES")
                        .help("Target episode length in minutes"),
                ),
        )
        .subcommand(
            Command::new("generate-characters")
                .about("Generate the cast for an episode")
                .arg(episode_id_arg()),
        )
        .subcommand(
            Command::new("generate-scenes")
                .about("Generate scene outlines for every story beat")
                .arg(episode_id_arg()),
        )
        .subcommand(
            Command::new("generate-script")
                .about("Generate the full episode script")
                .arg(episode_id_arg()),
        )
        .subcommand(
            Command::new("generate-audio")
                .about("Render scene audio and assemble the episode")
                .arg(episode_id_arg()),
        )
        .subcommand(
            Command::new("list-episodes")
                .about("List stored episodes")
                .arg(
                    Arg::new("series")
                        .short('s')
                        .long("series")
                        .value_name("SERIES")
                        .help("Only list episodes from this series"),
                ),
        )
        .subcommand(
            Command::new("register-voice")
                .about("Register an ElevenLabs voice for a character")
                .arg(
                    Arg::new("name")
                        .value_name("NAME")
                        .help("Character name for the voice")
                        .required(true),
                )
                .arg(
                    Arg::new("voice-id")
                        .value_name("VOICE_ID")
                        .help("ElevenLabs voice id")
                        .required(true),
                )
                .arg(
                    Arg::new("description")
                        .long("description")
                        .value_name("TEXT")
                        .help("How the voice sounds"),
                )
                .arg(
                    Arg::new("character-bio")
                        .long("character-bio")
                        .value_name("TEXT")
                        .help("Background for the character"),
                ),
        )
        .subcommand(Command::new("list-voices").about("List registered voices"))
        .subcommand(
            Command::new("sync-memory")
                .about("Sync processed reference books into semantic memory")
                .arg(
                    Arg::new("book-id")
                        .short('b')
                        .long("book-id")
                        .value_name("BOOK_ID")
                        .help("Sync a single book"),
                )
                .arg(
                    Arg::new("all")
                        .long("all")
                        .help("Sync every book in the library")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .help("Resync books that already completed")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("check-quality")
                .about("Run quality checks against an episode")
                .arg(episode_id_arg())
                .arg(
                    Arg::new("script-only")
                        .long("script-only")
                        .help("Only check the script")
                        .conflicts_with("audio-only")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("audio-only")
                        .long("audio-only")
                        .help("Only check the generated audio")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn episode_id_arg() -> Arg {
    Arg::new("episode-id")
        .value_name("EPISODE_ID")
        .help("Episode identifier")
        .required(true)
}

async fn open_store(config: &Config) -> Result<Arc<EpisodeStore>> {
    Ok(Arc::new(
        EpisodeStore::new(config.storage.episodes_dir()).await?,
    ))
}

fn memory_client(config: &Config) -> Result<MemoryClient> {
    MemoryClient::new(config.memory.clone())
}

fn story_builder(config: &Config, store: Arc<EpisodeStore>) -> Result<StoryBuilder> {
    let llm = create_llm(&config.llm)?;
    let memory = memory_client(config)?;
    Ok(StoryBuilder::new(store, llm, memory))
}

async fn open_registry(config: &Config) -> Result<Arc<VoiceRegistry>> {
    let synthesizer = Arc::new(ElevenLabsSynthesizer::new(config.tts.clone())?);
    let memory = memory_client(config)?;
    let registry = VoiceRegistry::new(config.storage.voices_dir(), synthesizer, memory).await?;
    Ok(Arc::new(registry))
}

async fn new_episode(config: &Config, args: &ArgMatches) -> Result<()> {
    let store = open_store(config).await?;
    let builder = story_builder(config, Arc::clone(&store))?;

    let episode_number = match args.get_one::<String>("episode-number") {
        Some(number) => Some(number.parse()?),
        None => None,
    };
    let target_duration_minutes = match args.get_one::<String>("duration") {
        Some(minutes) => minutes.parse()?,
        None => config.episode.default_duration_minutes,
    };

    let request = EpisodeRequest {
        title: args.get_one::<String>("title").cloned(),
        theme: args.get_one::<String>("theme").cloned(),
        series: args
            .get_one::<String>("series")
            .cloned()
            .unwrap_or_else(|| config.episode.default_series.clone()),
        episode_number,
        target_duration_minutes,
    };

    let episode = builder.create_episode(request).await?;
    println!(
        "Created episode {} - '{}' (episode {} of {})",
        episode.episode_id, episode.title, episode.episode_number, episode.series
    );
    println!(
        "Planned {} beats over {} minutes",
        episode.beats.len(),
        episode.target_duration_minutes
    );
    Ok(())
}

async fn generate_characters(config: &Config, args: &ArgMatches) -> Result<()> {
    let episode_id = args.get_one::<String>("episode-id").unwrap();
    let store = open_store(config).await?;
    let builder = story_builder(config, Arc::clone(&store))?;

    let characters = builder.generate_characters(episode_id).await?;
    println!("Generated {} characters:", characters.len());
    for character in &characters {
        println!(
            "  {} ({})",
            character.name,
            character.role.as_deref().unwrap_or("crew")
        );
    }
    Ok(())
}

async fn generate_scenes(config: &Config, args: &ArgMatches) -> Result<()> {
    let episode_id = args.get_one::<String>("episode-id").unwrap();
    let store = open_store(config).await?;
    let builder = story_builder(config, Arc::clone(&store))?;

    let scenes = builder.generate_scenes(episode_id).await?;
    println!("Generated {} scenes:", scenes.len());
    for scene in &scenes {
        println!(
            "  Scene {} [{}] {}",
            scene.scene_number,
            scene.beat,
            scene.setting.as_deref().unwrap_or("unknown setting")
        );
    }
    Ok(())
}

async fn generate_script(config: &Config, args: &ArgMatches) -> Result<()> {
    let episode_id = args.get_one::<String>("episode-id").unwrap();
    let store = open_store(config).await?;
    let builder = story_builder(config, Arc::clone(&store))?;

    let script = builder.generate_script(episode_id).await?;
    let line_count: usize = script.scenes.iter().map(|s| s.lines.len()).sum();
    println!(
        "Generated script for '{}': {} scenes, {} lines",
        script.title,
        script.scenes.len(),
        line_count
    );
    Ok(())
}

async fn generate_audio(config: &Config, args: &ArgMatches) -> Result<()> {
    let episode_id = args.get_one::<String>("episode-id").unwrap();
    let store = open_store(config).await?;
    let registry = open_registry(config).await?;

    let pipeline = AudioPipeline::new(
        Arc::clone(&store),
        registry,
        &config.assets.assets_dir,
        config.audio.renderer(),
        config.performance.max_workers,
    )
    .await?;

    let report = pipeline.generate_episode_audio(episode_id).await?;
    println!(
        "Generated audio for {}/{} scenes ({:.1}s of scene audio)",
        report.scenes_successful, report.scenes_generated, report.total_duration
    );
    match report.full_episode_file {
        Some(path) => println!("Episode file: {}", path.display()),
        None => println!("Episode assembly failed, see logs for details"),
    }
    Ok(())
}

async fn list_episodes(config: &Config, args: &ArgMatches) -> Result<()> {
    let store = open_store(config).await?;
    let series = args.get_one::<String>("series").map(|s| s.as_str());

    let episodes = store.list(series).await;
    if episodes.is_empty() {
        println!("No episodes found");
        return Ok(());
    }

    for summary in episodes {
        let mut extras = String::new();
        if summary.has_script {
            extras.push_str(", script");
        }
        if summary.has_audio {
            extras.push_str(", audio");
        }
        println!(
            "{}  [{}] episode {} - '{}' ({:?}{})",
            summary.episode_id,
            summary.series,
            summary.episode_number,
            summary.title,
            summary.status,
            extras
        );
    }
    Ok(())
}

async fn register_voice(config: &Config, args: &ArgMatches) -> Result<()> {
    let registry = open_registry(config).await?;

    let voice = NewVoice {
        name: args.get_one::<String>("name").unwrap().clone(),
        voice_id: args.get_one::<String>("voice-id").unwrap().clone(),
        description: args
            .get_one::<String>("description")
            .cloned()
            .unwrap_or_default(),
        character_bio: args
            .get_one::<String>("character-bio")
            .cloned()
            .unwrap_or_default(),
        settings: None,
    };

    let profile = registry.register_voice(voice).await?;
    println!(
        "Registered voice '{}' as {}",
        profile.name, profile.voice_registry_id
    );
    Ok(())
}

async fn list_voices(config: &Config) -> Result<()> {
    let registry = open_registry(config).await?;

    let voices = registry.list_voices().await;
    if voices.is_empty() {
        println!("No voices registered");
        return Ok(());
    }

    println!("Registered voices:");
    for voice in voices {
        println!(
            "  {}  {} ({})",
            voice.voice_registry_id, voice.name, voice.voice_id
        );
        if !voice.description.is_empty() {
            println!("      {}", voice.description);
        }
    }
    Ok(())
}

async fn sync_memory(config: &Config, args: &ArgMatches) -> Result<()> {
    let library = BookLibrary::new(config.storage.books_dir());
    let memory = memory_client(config)?;
    let sync = ReferenceSync::new(library, memory, config.storage.data_dir.join("sync"));
    let force = args.get_flag("force");

    if let Some(book_id) = args.get_one::<String>("book-id") {
        let status = sync.sync_book(book_id, force).await?;
        println!(
            "Synced {}/{} sections of '{}'",
            status.synced_sections, status.total_sections, status.title
        );
    } else if args.get_flag("all") {
        let summary = sync.sync_all(force).await?;
        println!(
            "Synced {} of {} books ({} sections)",
            summary.successful_syncs, summary.total_books, summary.total_sections_synced
        );
    } else {
        bail!("Specify --book-id or --all");
    }
    Ok(())
}

async fn check_quality(config: &Config, args: &ArgMatches) -> Result<()> {
    let episode_id = args.get_one::<String>("episode-id").unwrap();
    let store = open_store(config).await?;
    let checker = QualityChecker::new(Arc::clone(&store));

    let options = CheckOptions {
        check_script: !args.get_flag("audio-only"),
        check_audio: !args.get_flag("script-only"),
    };

    let report = checker.check_episode(episode_id, options).await?;
    println!("Quality report for '{}'", report.title);
    if let Some(section) = &report.script_quality {
        print_section("Script", section);
    }
    if let Some(section) = &report.audio_quality {
        print_section("Audio", section);
    }
    match &report.overall_quality {
        Some(overall) => println!("Overall: {:.1}/10 ({})", overall.score, overall.grade),
        None => println!("Nothing to check for this episode yet"),
    }
    Ok(())
}

fn print_section(name: &str, section: &SectionReport) {
    println!("{}: {:.1}/10 ({})", name, section.score, section.grade);
    for issue in &section.issues {
        match &issue.location {
            Some(location) => println!(
                "  [{:?}] {} ({})",
                issue.severity, issue.description, location
            ),
            None => println!("  [{:?}] {}", issue.severity, issue.description),
        }
    }
    for recommendation in &section.recommendations {
        println!("  Recommendation: {}", recommendation);
    }
}
