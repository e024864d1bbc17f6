//! devtools CLI: run flow files, import and export request collections.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use devtools::config;
use devtools::export::{load_export_request, load_export_responses, to_curl, to_har, to_postman};
use devtools::flowfile::{compile_flow_file, execute_file, parse_flow_file};
use devtools::httpclient::HttpClientProvider;
use devtools::ident::{Id, IdSource, MonotonicIdSource};
use devtools::import::{materialize_imports, parse_curl, parse_har, parse_postman};
use devtools::jsclient::{NullJsEvaluator, RemoteJsEvaluator};
use devtools::report::{
    exit_code, to_json_report, to_junit_report, write_console_report, ReportTarget,
};
use devtools::repo::{MemoryRepository, Repository};
use devtools::runner::RunnerDeps;

#[derive(Parser)]
#[command(name = "devtools", version, about = "API flow runner and request toolbox")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flow operations
    Flow {
        #[command(subcommand)]
        command: FlowCommand,
    },
    /// Import requests into the data model
    Import {
        #[arg(value_enum)]
        format: WireFormat,
        /// Input file ('-' reads stdin)
        input: PathBuf,
        #[arg(long)]
        workspace: Option<String>,
        /// Skip producer→consumer linking of imported requests
        #[arg(long)]
        no_link: bool,
    },
    /// Export a request (imported in the same invocation via --input)
    Export {
        #[arg(value_enum)]
        format: WireFormat,
        /// Name or id of the request to export
        id: String,
        /// Source to populate the in-memory model from
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        input_format: Option<WireFormat>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the version
    Version,
}

#[derive(Subcommand)]
enum FlowCommand {
    /// Execute one or more flows from a YAML file
    Run {
        path: PathBuf,
        /// Reporter spec, repeatable: console | json:<path> | junit:<path>
        #[arg(long = "report")]
        reports: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum WireFormat {
    Curl,
    Postman,
    Har,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            2
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Version => {
            println!("devtools {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Command::Flow {
            command: FlowCommand::Run { path, reports },
        } => flow_run(path, reports).await,
        Command::Import {
            format,
            input,
            workspace,
            no_link,
        } => import(format, input, workspace, !no_link).await,
        Command::Export {
            format,
            id,
            input,
            input_format,
            output,
        } => export(format, id, input, input_format, output).await,
    }
}

fn load_config() -> config::Config {
    match config::default_path() {
        Some(path) => config::load_or_init(&path).unwrap_or_default(),
        None => config::Config::default(),
    }
}

fn runner_deps(cfg: &config::Config) -> RunnerDeps {
    let http = Arc::new(HttpClientProvider::default());
    let js: Arc<dyn devtools::jsclient::JsEvaluator> = match &cfg.js_evaluator_url {
        Some(url) => Arc::new(RemoteJsEvaluator::new(http.client(), url.clone())),
        None => Arc::new(NullJsEvaluator),
    };
    RunnerDeps {
        http,
        js,
        ids: Arc::new(MonotonicIdSource::new()),
        per_node_timeout: std::time::Duration::from_secs(cfg.timeout_secs),
    }
}

async fn flow_run(path: PathBuf, reports: Vec<String>) -> Result<i32, Box<dyn std::error::Error>> {
    let cfg = load_config();
    let mut targets = Vec::new();
    for spec in &reports {
        targets.push(ReportTarget::parse(spec).map_err(std::io::Error::other)?);
    }
    if targets.is_empty() {
        targets.push(ReportTarget::parse(&cfg.report).unwrap_or(ReportTarget::Console));
    }

    let text = std::fs::read_to_string(&path)?;
    let file = parse_flow_file(&text)?;

    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let ids = MonotonicIdSource::new();
    let workspace = ids.next_id();
    let flows = compile_flow_file(repo.as_ref(), &ids, workspace, &file).await?;
    let summaries = execute_file(Arc::clone(&repo), runner_deps(&cfg), flows).await?;

    for target in targets {
        match target {
            ReportTarget::Console => {
                let mut stdout = std::io::stdout();
                write_console_report(&mut stdout, &summaries)?;
            }
            ReportTarget::Json(path) => {
                std::fs::write(&path, serde_json::to_vec_pretty(&to_json_report(&summaries))?)?;
            }
            ReportTarget::Junit(path) => {
                std::fs::write(&path, to_junit_report(&summaries))?;
            }
        }
    }

    Ok(exit_code(&summaries))
}

fn read_input(path: &PathBuf) -> Result<String, std::io::Error> {
    if path.as_os_str() == "-" {
        use std::io::Read;
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(path)
    }
}

async fn populate(
    repo: &dyn Repository,
    ids: &dyn IdSource,
    workspace: Id,
    format: WireFormat,
    text: &str,
    link: bool,
) -> Result<Vec<Id>, Box<dyn std::error::Error>> {
    let requests = match format {
        WireFormat::Curl => vec![parse_curl(text)?],
        WireFormat::Postman => parse_postman(text)?,
        WireFormat::Har => parse_har(text)?,
    };
    Ok(materialize_imports(repo, ids, workspace, requests, link).await?)
}

async fn import(
    format: WireFormat,
    input: PathBuf,
    workspace: Option<String>,
    link: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let text = read_input(&input)?;
    let repo = MemoryRepository::new();
    let ids = MonotonicIdSource::new();
    let workspace_id = match workspace {
        Some(text) => Id::parse_str(&text)?,
        None => ids.next_id(),
    };
    let created = populate(&repo, &ids, workspace_id, format, &text, link).await?;
    for id in &created {
        let def = repo.get_request_def(*id).await?;
        println!("{id}  {} {} {}", def.method, def.url, def.name);
    }
    eprintln!("imported {} request(s)", created.len());
    Ok(0)
}

async fn export(
    format: WireFormat,
    selector: String,
    input: PathBuf,
    input_format: Option<WireFormat>,
    output: Option<PathBuf>,
) -> Result<i32, Box<dyn std::error::Error>> {
    let text = read_input(&input)?;
    let repo = MemoryRepository::new();
    let ids = MonotonicIdSource::new();
    let workspace = ids.next_id();
    let source_format = input_format.unwrap_or(format);
    let created = populate(&repo, &ids, workspace, source_format, &text, false).await?;

    // resolve by id or by template name; "all" exports everything
    let mut selected = Vec::new();
    for id in &created {
        let def = repo.get_request_def(*id).await?;
        if selector == "all" || def.name == selector || id.to_string() == selector {
            selected.push(*id);
        }
    }
    if selected.is_empty() {
        return Err(format!("no request matches {selector}").into());
    }

    let mut rendered = String::new();
    match format {
        WireFormat::Curl => {
            for id in &selected {
                let request = load_export_request(&repo, *id).await?;
                rendered.push_str(&to_curl(&request));
                rendered.push('\n');
            }
        }
        WireFormat::Postman => {
            let mut requests = Vec::new();
            for id in &selected {
                requests.push(load_export_request(&repo, *id).await?);
            }
            rendered = serde_json::to_string_pretty(&to_postman("devtools export", &requests))?;
        }
        WireFormat::Har => {
            let mut pairs = Vec::new();
            for id in &selected {
                let request = load_export_request(&repo, *id).await?;
                let response = load_export_responses(&repo, *id).await?.into_iter().next();
                pairs.push((request, response));
            }
            rendered = serde_json::to_string_pretty(&to_har(&pairs))?;
        }
    }

    match output {
        Some(path) => std::fs::write(path, rendered)?,
        None => print!("{rendered}"),
    }
    Ok(0)
}
