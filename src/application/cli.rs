#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::io;
use std::io::Write;
use std::path;

use anyhow::bail;
use anyhow::Result;
use base64::engine::general_purpose;
use base64::Engine;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgGroup;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use yansi::Paint;

use super::server;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Capability;
use crate::domain::models::Conversation;
use crate::domain::models::Generation;
use crate::domain::models::GenerationOptions;
use crate::domain::models::GenerationRequest;
use crate::domain::models::HistoryKind;
use crate::domain::models::HistoryRecord;
use crate::domain::models::ProviderName;
use crate::domain::models::ProviderStatus;
use crate::domain::models::Role;
use crate::domain::services::ChatService;
use crate::domain::services::Conversations;
use crate::domain::services::Dispatcher;
use crate::domain::services::History;
use crate::infrastructure::providers::ProviderManager;

const DEFAULT_LANGUAGE: &str = "python";
const PREVIEW_CHARS: usize = 70;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    std::process::exit(0);
}

fn build_dispatcher() -> Dispatcher {
    return Dispatcher::new(ProviderManager::registry())
        .with_cache(Config::get_bool(ConfigKey::ResponseCache));
}

fn join_words(matches: &ArgMatches, id: &str) -> String {
    return matches
        .get_many::<String>(id)
        .map(|words| return words.map(|e| return e.as_str()).collect::<Vec<&str>>().join(" "))
        .unwrap_or_default();
}

pub fn format_conversation(conversation: &Conversation) -> String {
    let mut res = format!("- (ID: {}) {}", conversation.id, conversation.timestamp);

    if !conversation.model.is_empty() {
        res = format!("{res}, Model: {}", conversation.model);
    }

    if let Some(message) = conversation.messages.first() {
        res = format!("{res}, {}", message.preview(PREVIEW_CHARS));
    }

    return res;
}

pub fn format_record(idx: usize, record: &HistoryRecord) -> String {
    let line = record.prompt.lines().next().unwrap_or_default().trim();
    let prompt = if line.chars().count() > PREVIEW_CHARS {
        format!(
            "{}...",
            line.chars().take(PREVIEW_CHARS - 3).collect::<String>()
        )
    } else {
        line.to_string()
    };

    return format!(
        "[{idx}] {} {}/{}: {prompt}",
        record.timestamp, record.provider, record.model
    );
}

pub fn format_status(status: &ProviderStatus) -> String {
    let capabilities = status
        .capabilities
        .iter()
        .map(|e| return e.to_string())
        .collect::<Vec<String>>()
        .join(", ");

    let state = if status.enabled { "enabled" } else { "disabled" };

    return format!(
        "{:<10} {:<8} priority {}, capabilities: {capabilities}",
        status.name.to_string(),
        state,
        status.priority
    );
}

/// Best effort language name for a source file, used when `explain` is not
/// given `--language`.
pub fn language_from_path(file_path: &path::Path) -> Option<String> {
    let ext = file_path.extension()?.to_str()?.to_lowercase();
    let language = match ext.as_str() {
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "java" => "java",
        "js" | "mjs" | "cjs" => "javascript",
        "kt" => "kotlin",
        "php" => "php",
        "py" => "python",
        "rb" => "ruby",
        "rs" => "rust",
        "sh" | "bash" => "bash",
        "sql" => "sql",
        "swift" => "swift",
        "ts" | "tsx" => "typescript",
        _ => return None,
    };

    return Some(language.to_string());
}

/// Bytes of a `data:<mime>;base64,<payload>` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let Some(rest) = url.strip_prefix("data:") else {
        bail!("Image is not an inline data URL");
    };
    let Some((_, payload)) = rest.split_once(";base64,") else {
        bail!("Image data URL is not base64 encoded");
    };

    return Ok(general_purpose::STANDARD.decode(payload)?);
}

pub fn generation_options(matches: &ArgMatches) -> GenerationOptions {
    return GenerationOptions {
        temperature: matches.try_get_one::<f32>("temperature").ok().flatten().copied(),
        max_tokens: matches.try_get_one::<u32>("max-tokens").ok().flatten().copied(),
        model: matches.try_get_one::<String>("model").ok().flatten().cloned(),
        size: matches.try_get_one::<String>("size").ok().flatten().cloned(),
        width: matches.try_get_one::<u32>("width").ok().flatten().copied(),
        height: matches.try_get_one::<u32>("height").ok().flatten().copied(),
        steps: matches.try_get_one::<u32>("steps").ok().flatten().copied(),
        cfg_scale: matches.try_get_one::<f32>("cfg-scale").ok().flatten().copied(),
        engine: matches.try_get_one::<String>("engine").ok().flatten().cloned(),
    };
}

fn provider_from_matches(matches: &ArgMatches) -> Option<ProviderName> {
    return matches
        .try_get_one::<String>("provider")
        .ok()
        .flatten()
        .and_then(|e| return ProviderName::parse(e));
}

/// Saves a finished generation. The result has already been shown by then, so
/// a history failure is logged instead of failing the command.
async fn record_history(
    history: &History,
    kind: HistoryKind,
    prompt: &str,
    generation: &Generation,
    metadata: Vec<(&str, String)>,
) {
    let mut record = HistoryRecord::new(prompt, generation);
    for (key, value) in metadata {
        record = record.with_metadata(key, &value);
    }

    if let Err(err) = history.push(kind, record).await {
        tracing::error!(
            kind = %kind,
            dir = %history.dir.to_string_lossy(),
            error = %err,
            "Failed to save history"
        );
    }
}

async fn generate_and_show<W: Write>(
    dispatcher: &Dispatcher,
    history: &History,
    request: GenerationRequest,
    kind: HistoryKind,
    prompt: &str,
    metadata: Vec<(&str, String)>,
    out: &mut W,
) -> Result<Generation> {
    let generation = dispatcher.dispatch(&request).await?;
    writeln!(out, "{}", generation.content())?;
    out.flush()?;

    record_history(history, kind, prompt, &generation, metadata).await;

    return Ok(generation);
}

async fn write_image(url: &str, output: &str) -> Result<()> {
    let bytes = if url.starts_with("data:") {
        decode_data_url(url)?
    } else {
        reqwest::get(url).await?.error_for_status()?.bytes().await?.to_vec()
    };

    let mut file = fs::File::create(output).await?;
    file.write_all(&bytes).await?;

    return Ok(());
}

async fn read_explain_source(matches: &ArgMatches) -> Result<(String, Option<String>)> {
    if let Some(file) = matches.get_one::<String>("file") {
        let file_path = path::PathBuf::from(file);
        if !file_path.exists() {
            bail!(format!("File {file} does not exist"));
        }
        let code = fs::read_to_string(&file_path).await?;
        return Ok((code, language_from_path(&file_path)));
    }

    let mut code = String::new();
    tokio::io::stdin().read_to_string(&mut code).await?;
    return Ok((code, None));
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!(
        "Created default config file at {}",
        config_file_path.to_string_lossy()
    );
    return Ok(());
}

async fn print_conversations_list() -> Result<()> {
    let conversations = Conversations::default()
        .list()
        .await?
        .iter()
        .map(|conversation| {
            return format_conversation(conversation);
        })
        .collect::<Vec<String>>();

    if conversations.is_empty() {
        println!("There are no conversations available. You should start your first one!");
    } else {
        println!("{}", conversations.join("\n"));
    }

    return Ok(());
}

async fn select_conversation_interactive() -> Result<Option<Conversation>> {
    let conversations = Conversations::default().list().await?;
    if conversations.is_empty() {
        println!("There are no conversations available. You should start your first one!");
        return Ok(None);
    }

    let options = conversations
        .iter()
        .map(|conversation| {
            return format_conversation(conversation);
        })
        .collect::<Vec<String>>();

    let idx = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Which conversation would you like to open?")
        .default(0)
        .items(&options)
        .interact_opt()?;

    return Ok(idx.map(|idx| return conversations[idx].clone()));
}

fn prompt_marker() -> Result<()> {
    print!("{} ", Paint::cyan(">").bold());
    io::stdout().flush()?;
    return Ok(());
}

async fn chat_loop(
    mut conversation: Conversation,
    options: GenerationOptions,
    provider: Option<ProviderName>,
) -> Result<()> {
    let conversations = Conversations::default();
    let dispatcher = build_dispatcher();
    let chat = ChatService::new(&dispatcher, &conversations);

    println!(
        "Conversation {}. Type /new to start over, /quit to exit.",
        conversation.id
    );
    for message in conversation.messages.iter() {
        let author = match message.role {
            Role::User => Paint::cyan("you").bold(),
            Role::Assistant => Paint::green("assistant").bold(),
        };
        println!("{author}: {}", message.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker()?;
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }
        if text == "/new" {
            conversation = Conversation::new(&Conversations::create_id());
            println!("Started conversation {}", conversation.id);
            continue;
        }

        let reply = chat.send(&mut conversation, text, &options, provider).await?;
        println!("{}: {}", Paint::green("assistant").bold(), reply.content);
    }

    return Ok(());
}

fn arg_config(key: ConfigKey, help: &str) -> Arg {
    let default = Config::default(key);
    let help = if default.is_empty() {
        help.to_string()
    } else {
        format!("{help} [default: {default}]")
    };

    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(format!(
            "WAYNE_{}",
            key.to_string().to_uppercase().replace('-', "_")
        ))
        .num_args(1)
        .help(help)
        .global(true);
}

fn arg_prompt() -> Arg {
    return Arg::new("prompt")
        .help("Prompt to send.")
        .num_args(1..)
        .required(true);
}

fn arg_language() -> Arg {
    return Arg::new("language")
        .short('l')
        .long("language")
        .num_args(1)
        .help("Programming language.");
}

fn args_generation() -> Vec<Arg> {
    return vec![
        Arg::new("provider")
            .short('p')
            .long("provider")
            .num_args(1)
            .help("Only use this provider instead of falling back across all of them.")
            .value_parser(PossibleValuesParser::new(ProviderName::VARIANTS)),
        Arg::new("model")
            .short('m')
            .long("model")
            .num_args(1)
            .requires("provider")
            .help("Model to request from the provider given with --provider."),
        Arg::new("temperature")
            .long("temperature")
            .num_args(1)
            .value_parser(value_parser!(f32))
            .help("Sampling temperature. [default: 0.7, or 0.2 for code]"),
        Arg::new("max-tokens")
            .long("max-tokens")
            .num_args(1)
            .value_parser(value_parser!(u32))
            .help("Maximum number of tokens to generate. [default: 2048]"),
    ];
}

fn subcommand_text() -> Command {
    return Command::new("text")
        .about("Generates text for a prompt.")
        .arg(arg_prompt())
        .args(args_generation());
}

fn subcommand_code() -> Command {
    return Command::new("code")
        .about("Generates code for a description.")
        .arg(arg_prompt())
        .arg(arg_language().default_value(DEFAULT_LANGUAGE))
        .args(args_generation());
}

fn subcommand_explain() -> Command {
    return Command::new("explain")
        .about("Explains a piece of code read from a file, or stdin when no file is given.")
        .arg(Arg::new("file").help("Source file to explain.").num_args(1))
        .arg(arg_language())
        .args(args_generation());
}

fn subcommand_image() -> Command {
    return Command::new("image")
        .about("Generates an image for a prompt.")
        .arg(arg_prompt())
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .num_args(1)
                .help("Write the image to this file instead of printing its URL."),
        )
        .arg(
            Arg::new("size")
                .long("size")
                .num_args(1)
                .help("Image size for OpenAI. [default: 1024x1024]"),
        )
        .arg(
            Arg::new("engine")
                .long("engine")
                .num_args(1)
                .help("Stability AI engine, overrides stability-engine for this request."),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .help("Image width for Stability AI. [default: 1024]"),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .help("Image height for Stability AI. [default: 1024]"),
        )
        .arg(
            Arg::new("steps")
                .long("steps")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .help("Diffusion steps for Stability AI. [default: 30]"),
        )
        .arg(
            Arg::new("cfg-scale")
                .long("cfg-scale")
                .num_args(1)
                .value_parser(value_parser!(f32))
                .help("Prompt adherence for Stability AI. [default: 7]"),
        )
        .args(args_generation());
}

fn subcommand_chat() -> Command {
    return Command::new("chat")
        .about("Chat on stdin. Resumes the latest conversation unless --id or --new is given.")
        .arg(
            Arg::new("id")
                .short('i')
                .long("id")
                .num_args(1)
                .help("Conversation ID to resume."),
        )
        .arg(
            Arg::new("new")
                .long("new")
                .action(ArgAction::SetTrue)
                .conflicts_with("id")
                .help("Start a new conversation."),
        )
        .args(args_generation());
}

fn subcommand_conversations_delete() -> Command {
    return Command::new("delete")
        .about("Delete one or all conversations.")
        .arg(
            Arg::new("id")
                .short('i')
                .long("id")
                .help("Conversation ID")
                .num_args(1),
        )
        .arg(
            Arg::new("all")
                .long("all")
                .help("Delete all conversations.")
                .action(ArgAction::SetTrue),
        )
        .group(
            ArgGroup::new("delete-args")
                .args(["id", "all"])
                .required(true),
        );
}

fn subcommand_conversations() -> Command {
    return Command::new("conversations")
        .about("Manage past chat conversations.")
        .arg_required_else_help(true)
        .subcommand(Command::new("list").about("List all conversations, most recent first."))
        .subcommand(
            Command::new("open")
                .about("Continue a conversation by ID. Omit the ID to pick one interactively.")
                .arg(
                    Arg::new("id")
                        .short('i')
                        .long("id")
                        .help("Conversation ID")
                        .required(false),
                )
                .args(args_generation()),
        )
        .subcommand(subcommand_conversations_delete());
}

fn arg_kind() -> Arg {
    return Arg::new("kind")
        .short('k')
        .long("kind")
        .num_args(1)
        .help("History list to use.")
        .value_parser(PossibleValuesParser::new(HistoryKind::VARIANTS));
}

fn subcommand_history() -> Command {
    return Command::new("history")
        .about("Manage generation history.")
        .arg_required_else_help(true)
        .subcommand(Command::new("dir").about("Print the history directory path."))
        .subcommand(
            Command::new("list")
                .about("List past generations, most recent first.")
                .arg(arg_kind().required(true)),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a single history entry.")
                .arg(arg_kind().required(true))
                .arg(
                    Arg::new("index")
                        .long("index")
                        .num_args(1)
                        .required(true)
                        .value_parser(value_parser!(usize))
                        .help("Index as shown by history list."),
                ),
        )
        .subcommand(
            Command::new("clear")
                .about("Clear one history list, or all of them when no kind is given.")
                .arg(arg_kind()),
        )
        .subcommand(
            Command::new("export")
                .about("Export all history and conversations as JSON.")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .num_args(1)
                        .help("Write the export to this file instead of stdout."),
                ),
        );
}

fn subcommand_status() -> Command {
    return Command::new("status")
        .about("Show which providers are enabled.")
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Also run a health check against every enabled provider."),
        );
}

fn subcommand_serve() -> Command {
    return Command::new("serve")
        .about("Run the HTTP proxy exposing POST /api.")
        .arg(
            Arg::new("address")
                .short('a')
                .long("address")
                .num_args(1)
                .help("Address to listen on, overrides serve-address."),
        );
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    return Command::new("wayne")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .subcommand(subcommand_text())
        .subcommand(subcommand_code())
        .subcommand(subcommand_explain())
        .subcommand(subcommand_image())
        .subcommand(subcommand_chat())
        .subcommand(subcommand_conversations())
        .subcommand(subcommand_history())
        .subcommand(subcommand_status())
        .subcommand(subcommand_serve())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(Command::new("manpages").about("Generates manpages and outputs to stdout."))
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("WAYNE_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(arg_config(ConfigKey::ConversationLimit, "Number of chat conversations kept on disk."))
        .arg(arg_config(ConfigKey::ConversationMessageLimit, "Number of messages kept per chat conversation."))
        .arg(arg_config(ConfigKey::GeminiModel, "Gemini model used for text and code."))
        .arg(arg_config(ConfigKey::GeminiPriority, "Gemini fallback priority, lower is tried first."))
        .arg(arg_config(ConfigKey::GeminiToken, "Google AI Studio API key. Gemini is disabled without it."))
        .arg(arg_config(ConfigKey::GeminiURL, "Gemini API URL."))
        .arg(arg_config(ConfigKey::HealthCheckTimeout, "Time to wait in milliseconds before timing out a provider health check."))
        .arg(arg_config(ConfigKey::HistoryDir, "Directory holding history and conversation files."))
        .arg(arg_config(ConfigKey::HistoryLimit, "Number of entries kept per history list."))
        .arg(arg_config(ConfigKey::OpenAiChatModel, "OpenAI model used for text and code."))
        .arg(arg_config(ConfigKey::OpenAiImageModel, "OpenAI model used for images."))
        .arg(arg_config(ConfigKey::OpenAiPriority, "OpenAI fallback priority, lower is tried first."))
        .arg(arg_config(ConfigKey::OpenAiToken, "OpenAI API token. OpenAI is disabled without it."))
        .arg(arg_config(ConfigKey::OpenAiURL, "OpenAI API URL. Can be swapped to a compatible proxy."))
        .arg(
            arg_config(ConfigKey::ResponseCache, "Reuse responses for repeated prompts within a single run.")
                .value_parser(PossibleValuesParser::new(["true", "false"])),
        )
        .arg(arg_config(ConfigKey::ServeAddress, "Address the proxy server listens on."))
        .arg(arg_config(ConfigKey::StabilityEngine, "Stability AI engine used for images."))
        .arg(arg_config(ConfigKey::StabilityPriority, "Stability AI fallback priority, lower is tried first."))
        .arg(arg_config(ConfigKey::StabilityToken, "Stability AI API key. Stability AI is disabled without it."))
        .arg(arg_config(ConfigKey::StabilityURL, "Stability AI API URL."));
}

async fn run_text(matches: &ArgMatches) -> Result<()> {
    let prompt = join_words(matches, "prompt");
    let request = GenerationRequest::text(&prompt)
        .with_options(generation_options(matches))
        .with_provider(provider_from_matches(matches));

    generate_and_show(
        &build_dispatcher(),
        &History::default(),
        request,
        HistoryKind::Text,
        &prompt,
        vec![],
        &mut io::stdout(),
    )
    .await?;

    return Ok(());
}

async fn run_code(matches: &ArgMatches) -> Result<()> {
    let prompt = join_words(matches, "prompt");
    let language = matches
        .get_one::<String>("language")
        .cloned()
        .unwrap_or_else(|| return DEFAULT_LANGUAGE.to_string());

    let request = GenerationRequest::code(&prompt, &language)
        .with_options(generation_options(matches))
        .with_provider(provider_from_matches(matches));

    generate_and_show(
        &build_dispatcher(),
        &History::default(),
        request,
        HistoryKind::Code,
        &prompt,
        vec![("language", language.to_string())],
        &mut io::stdout(),
    )
    .await?;

    return Ok(());
}

async fn run_explain(matches: &ArgMatches) -> Result<()> {
    let (code, detected) = read_explain_source(matches).await?;
    if code.trim().is_empty() {
        bail!("There is no code to explain");
    }

    let language = matches
        .get_one::<String>("language")
        .cloned()
        .or(detected)
        .unwrap_or_else(|| return DEFAULT_LANGUAGE.to_string());

    let request = GenerationRequest::explain(&code, &language)
        .with_options(generation_options(matches))
        .with_provider(provider_from_matches(matches));

    generate_and_show(
        &build_dispatcher(),
        &History::default(),
        request,
        HistoryKind::Code,
        &code,
        vec![
            ("action", "explain".to_string()),
            ("language", language.to_string()),
        ],
        &mut io::stdout(),
    )
    .await?;

    return Ok(());
}

async fn run_image(matches: &ArgMatches) -> Result<()> {
    let prompt = join_words(matches, "prompt");
    let options = generation_options(matches);
    let request = GenerationRequest::image(&prompt)
        .with_options(options.clone())
        .with_provider(provider_from_matches(matches));

    let generation = build_dispatcher().dispatch(&request).await?;

    if let Some(output) = matches.get_one::<String>("output") {
        write_image(generation.content(), output).await?;
        println!(
            "Saved image from {}/{} to {output}",
            generation.provider, generation.model
        );
    } else {
        println!("{}", generation.content());
    }

    record_history(
        &History::default(),
        HistoryKind::Image,
        &prompt,
        &generation,
        vec![
            ("size", options.size()),
            ("dimensions", format!("{}x{}", options.width(), options.height())),
        ],
    )
    .await;

    return Ok(());
}

async fn run_chat(matches: &ArgMatches) -> Result<()> {
    let conversations = Conversations::default();
    let conversation = if let Some(id) = matches.get_one::<String>("id") {
        conversations.load(id).await?
    } else if matches.get_flag("new") {
        Conversation::new(&Conversations::create_id())
    } else {
        conversations
            .latest()
            .await?
            .unwrap_or_else(|| return Conversation::new(&Conversations::create_id()))
    };

    return chat_loop(
        conversation,
        generation_options(matches),
        provider_from_matches(matches),
    )
    .await;
}

async fn run_history(matches: &ArgMatches) -> Result<()> {
    let history = History::default();

    match matches.subcommand() {
        Some(("dir", _)) => {
            println!("{}", history.dir.to_string_lossy());
        }
        Some(("list", list_matches)) => {
            let kind = history_kind(list_matches)?;
            let records = history.list(kind).await?;
            if records.is_empty() {
                println!("There is no {kind} history yet.");
            } else {
                let lines = records
                    .iter()
                    .enumerate()
                    .map(|(idx, record)| return format_record(idx, record))
                    .collect::<Vec<String>>();
                println!("{}", lines.join("\n"));
            }
        }
        Some(("delete", delete_matches)) => {
            let kind = history_kind(delete_matches)?;
            let index = delete_matches.get_one::<usize>("index").copied().unwrap_or_default();
            let removed = history.delete(kind, index).await?;
            println!("Deleted {}", format_record(index, &removed));
        }
        Some(("clear", clear_matches)) => {
            if clear_matches.get_one::<String>("kind").is_some() {
                let kind = history_kind(clear_matches)?;
                history.clear(kind).await?;
                println!("Cleared {kind} history");
            } else {
                history.clear_all().await?;
                println!("Cleared all history");
            }
        }
        Some(("export", export_matches)) => {
            let export = history.export(&Conversations::default()).await?;
            let payload = serde_json::to_string_pretty(&export)?;
            if let Some(output) = export_matches.get_one::<String>("output") {
                let mut file = fs::File::create(output).await?;
                file.write_all(payload.as_bytes()).await?;
                println!("Exported history to {output}");
            } else {
                println!("{payload}");
            }
        }
        _ => {
            subcommand_history().print_long_help()?;
        }
    }

    return Ok(());
}

fn history_kind(matches: &ArgMatches) -> Result<HistoryKind> {
    let Some(kind) = matches.get_one::<String>("kind") else {
        bail!("A history kind is required");
    };

    return Ok(kind.parse::<HistoryKind>()?);
}

async fn run_status(matches: &ArgMatches) -> Result<()> {
    let dispatcher = build_dispatcher();
    let lines = dispatcher
        .status()
        .iter()
        .map(|status| return format_status(status))
        .collect::<Vec<String>>();
    println!("{}", lines.join("\n"));

    for capability in [Capability::Text, Capability::Code, Capability::Image] {
        if dispatcher.available(capability, None).is_empty() {
            println!(
                "{}",
                Paint::yellow(format!("No enabled provider can generate {capability}"))
            );
        }
    }

    if !matches.get_flag("check") {
        return Ok(());
    }

    for (name, res) in dispatcher.health().await {
        match res {
            Ok(_) => println!("{name}: {}", Paint::green("ok")),
            Err(err) => println!("{name}: {}", Paint::red(err.to_string())),
        }
    }

    return Ok(());
}

pub async fn parse() -> Result<()> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
            }
            _ => {
                subcommand_config().print_long_help()?;
            }
        },
        Some(("manpages", _)) => {
            clap_mangen::Man::new(build()).render(&mut io::stdout())?;
        }
        Some(("text", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            run_text(subcmd_matches).await?;
        }
        Some(("code", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            run_code(subcmd_matches).await?;
        }
        Some(("explain", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            run_explain(subcmd_matches).await?;
        }
        Some(("image", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            run_image(subcmd_matches).await?;
        }
        Some(("chat", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            run_chat(subcmd_matches).await?;
        }
        Some(("conversations", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("list", list_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, list_matches]).await?;
                print_conversations_list().await?;
            }
            Some(("open", open_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, open_matches]).await?;
                let conversation = if let Some(id) = open_matches.get_one::<String>("id") {
                    Some(Conversations::default().load(id).await?)
                } else {
                    select_conversation_interactive().await?
                };

                if let Some(conversation) = conversation {
                    chat_loop(
                        conversation,
                        generation_options(open_matches),
                        provider_from_matches(open_matches),
                    )
                    .await?;
                }
            }
            Some(("delete", delete_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, delete_matches]).await?;
                if let Some(id) = delete_matches.get_one::<String>("id") {
                    Conversations::default().delete(id).await?;
                    println!("Deleted conversation {id}");
                } else if delete_matches.get_flag("all") {
                    Conversations::default().delete_all().await?;
                    println!("Deleted all conversations");
                } else {
                    subcommand_conversations_delete().print_long_help()?;
                }
            }
            _ => {
                subcommand_conversations().print_long_help()?;
            }
        },
        Some(("history", subcmd_matches)) => {
            let mut all_matches = vec![&matches, subcmd_matches];
            if let Some((_, nested)) = subcmd_matches.subcommand() {
                all_matches.push(nested);
            }
            Config::load(build(), all_matches).await?;
            run_history(subcmd_matches).await?;
        }
        Some(("status", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            run_status(subcmd_matches).await?;
        }
        Some(("serve", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            let address = subcmd_matches
                .get_one::<String>("address")
                .cloned()
                .unwrap_or_else(|| return Config::get(ConfigKey::ServeAddress));
            server::run(&address, build_dispatcher()).await?;
        }
        _ => {
            build().print_long_help()?;
        }
    }

    return Ok(());
}
