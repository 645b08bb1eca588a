use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;

use litcurate::agent::CommandAgent;
use litcurate::config::{Config, ConfigLoader};
use litcurate::domain::{
    AnnotationRecord, GeneMode, PaperAnnotation, Pmid, SpeciesGeneEntry, TaxonomyMode,
    parse_compact_date,
};
use litcurate::error::CurateError;
use litcurate::filter::ExclusionSet;
use litcurate::logging::LogContext;
use litcurate::lookup::LookupClient;
use litcurate::model_species;
use litcurate::ncbi::NcbiHttpClient;
use litcurate::output::JsonOutput;
use litcurate::pipeline::Pipeline;
use litcurate::pubtator::PubtatorHttpClient;
use litcurate::recovery::Recovery;
use litcurate::runner::{ProcessLauncher, Runner};
use litcurate::store::{self, AnnotationStore};
use litcurate::worker::{self, Worker};

#[derive(Parser)]
#[command(name = "litcurate")]
#[command(about = "Literature curation pipeline for non-model organism gene studies")]
#[command(version, author)]
struct Cli {
    /// Configuration file (defaults to ./litcurate.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search, annotate, enrich and filter papers for a date range")]
    PreAgent(PreAgentArgs),
    #[command(about = "Re-apply the model organism filter to a metadata CSV")]
    Filter(FilterArgs),
    #[command(about = "Fetch full PubTator mention lists and filter at document level")]
    PubtatorFilter(FilterArgs),
    #[command(about = "Look up a taxonomy id or name")]
    Taxonomy(TaxonomyArgs),
    #[command(about = "Look up gene information")]
    Gene(GeneArgs),
    #[command(about = "Append one paper annotation to the ledger")]
    StoreAppend(StoreAppendArgs),
    #[command(about = "Run the annotation agent over the paper table in batches")]
    RunBatch(RunBatchArgs),
    #[command(about = "Annotate rows [start, end) of the paper table")]
    Worker(WorkerArgs),
    #[command(about = "Recover annotations missing from the ledger out of worker logs")]
    Recover(RecoverArgs),
    #[command(about = "Build the model organism list from a sample metadata table")]
    SelectSpecies(SelectSpeciesArgs),
}

#[derive(Args)]
struct PreAgentArgs {
    /// First publication date, YYYYMMDD.
    #[arg(long)]
    start: String,

    /// Last publication date, YYYYMMDD.
    #[arg(long)]
    end: String,

    #[arg(long)]
    exclusion: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct FilterArgs {
    input: Utf8PathBuf,

    #[arg(long)]
    exclusion: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct TaxonomyArgs {
    query: String,

    #[arg(long, value_enum, default_value = "auto")]
    mode: TaxonomyMode,
}

#[derive(Args)]
struct GeneArgs {
    query: String,

    #[arg(long, value_enum, default_value = "auto")]
    mode: GeneMode,

    #[arg(long)]
    species_id: Option<String>,
}

#[derive(Args)]
struct StoreAppendArgs {
    #[arg(long)]
    pmid: String,

    /// JSON array of {species_name, species_id, species_class, gene_name, gene_id}.
    #[arg(long)]
    species_gene_list: String,

    #[arg(long = "research-type")]
    research_types: Vec<String>,

    #[arg(long)]
    ledger: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct RunBatchArgs {
    #[arg(long, default_value_t = 0)]
    start_index: usize,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    use_mcp: bool,
}

#[derive(Args)]
struct WorkerArgs {
    start_index: usize,
    end_index: usize,
    use_mcp: String,
}

#[derive(Args)]
struct RecoverArgs {
    #[arg(long)]
    papers_csv: Option<Utf8PathBuf>,

    #[arg(long)]
    log_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    exclusion: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct SelectSpeciesArgs {
    #[arg(long)]
    top_n: Option<usize>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CurateError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CurateError) -> u8 {
    match error {
        CurateError::InvalidPmid(_)
        | CurateError::InvalidDate(_)
        | CurateError::InvalidDateRange { .. }
        | CurateError::EmptySpeciesGeneList(_)
        | CurateError::ConfigRead(_)
        | CurateError::ConfigParse(_)
        | CurateError::Usage(_) => 2,
        CurateError::NcbiHttp(_)
        | CurateError::NcbiStatus { .. }
        | CurateError::PubtatorHttp(_)
        | CurateError::PubtatorStatus { .. }
        | CurateError::EmptyResponse(_) => 3,
        CurateError::Interrupted { .. } => 130,
        _ => 1,
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::PreAgent(_) => "pre_agent",
        Commands::Filter(_) => "filter",
        Commands::PubtatorFilter(_) => "pubtator_filter",
        Commands::Taxonomy(_) => "taxonomy",
        Commands::Gene(_) => "gene",
        Commands::StoreAppend(_) => "store_append",
        Commands::RunBatch(_) => "run_batch",
        Commands::Worker(_) => "worker",
        Commands::Recover(_) => "recover",
        Commands::SelectSpecies(_) => "select_species",
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let log_name = format!(
        "{}_{}",
        command_name(&cli.command),
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let logging = LogContext::init(config.log_dir.as_deref(), &log_name)?;
    if let Some(path) = logging.log_file() {
        tracing::info!(path = %path, "logging to file");
    }

    match cli.command {
        Commands::PreAgent(args) => {
            let start = parse_compact_date(&args.start)?;
            let end = parse_compact_date(&args.end)?;
            let exclusion = load_exclusion(args.exclusion, &config)?;
            let pipeline = build_pipeline(config)?;
            let result = pipeline.run_pre_agent(start, end, &exclusion, &JsonOutput)?;
            JsonOutput::print_json(&result).into_diagnostic()
        }
        Commands::Filter(args) => {
            let exclusion = load_exclusion(args.exclusion, &config)?;
            let pipeline = build_pipeline(config)?;
            let result = pipeline.run_filter(&args.input, &exclusion, &JsonOutput)?;
            JsonOutput::print_json(&result).into_diagnostic()
        }
        Commands::PubtatorFilter(args) => {
            let exclusion = load_exclusion(args.exclusion, &config)?;
            let pipeline = build_pipeline(config)?;
            let result = pipeline.run_pubtator_filter(&args.input, &exclusion, &JsonOutput)?;
            JsonOutput::print_json(&result).into_diagnostic()
        }
        Commands::Taxonomy(args) => {
            let lookup = build_lookup(&config)?;
            let result = lookup.resolve_taxonomy(&args.query, args.mode);
            JsonOutput::print_json(&result).into_diagnostic()
        }
        Commands::Gene(args) => {
            let lookup = build_lookup(&config)?;
            let result = lookup.resolve_gene(&args.query, args.mode, args.species_id.as_deref());
            JsonOutput::print_json(&result).into_diagnostic()
        }
        Commands::StoreAppend(args) => {
            let pmid: Pmid = args.pmid.parse()?;
            let species_gene_list: Vec<SpeciesGeneEntry> =
                serde_json::from_str(&args.species_gene_list).map_err(|err| {
                    CurateError::Usage(format!("--species-gene-list is not a JSON list: {err}"))
                })?;
            let annotation = PaperAnnotation::new(pmid, species_gene_list, args.research_types)?;
            let ledger = args.ledger.unwrap_or(config.agent.ledger_path);
            let outcome = AnnotationStore::new(ledger).append(&annotation)?;
            JsonOutput::print_json(&outcome).into_diagnostic()
        }
        Commands::RunBatch(args) => {
            let total = store::read_csv::<AnnotationRecord>(&config.agent.papers_csv)?.len();
            let batch_size = args.batch_size.unwrap_or(config.runner.batch_size);
            if batch_size == 0 {
                return Err(CurateError::Usage("--batch-size must be at least 1".to_string()).into());
            }
            let interrupted = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&interrupted);
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
                .map_err(|err| CurateError::SignalHandler(err.to_string()))?;
            let launcher = ProcessLauncher::new(cli.config.clone())?;
            let runner = Runner::new(launcher, batch_size, config.runner.cooldown())
                .with_interrupt_flag(interrupted);
            let report = match runner.run(total, args.start_index, args.use_mcp, &JsonOutput) {
                Ok(report) => report,
                Err(err @ CurateError::Interrupted { resume_from, .. }) => {
                    eprintln!("interrupted; resume with --start-index {resume_from}");
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            };
            JsonOutput::print_json(&report).into_diagnostic()
        }
        Commands::Worker(args) => {
            let use_mcp = worker::parse_use_mcp(&args.use_mcp);
            let agent = CommandAgent::new(config.agent.program.clone(), config.agent.args.clone());
            let ledger = AnnotationStore::new(config.agent.ledger_path.clone());
            let mut worker: Worker<CommandAgent, NcbiHttpClient> =
                Worker::new(agent, ledger, config.agent.log_dir.clone());
            if use_mcp {
                worker = worker.with_lookup(build_lookup(&config)?);
            }
            let summary = worker.run(
                &config.agent.papers_csv,
                args.start_index,
                args.end_index,
                use_mcp,
            )?;
            JsonOutput::print_json(&summary).into_diagnostic()
        }
        Commands::Recover(args) => {
            let exclusion = load_exclusion(args.exclusion, &config)?;
            let papers_csv = args.papers_csv.unwrap_or(config.agent.papers_csv.clone());
            let log_dir = args.log_dir.unwrap_or(config.agent.log_dir.clone());
            let ledger = AnnotationStore::new(config.agent.ledger_path.clone());
            let recovery = Recovery::new(config.recovery.log_prefix.clone());
            let report = recovery.run(
                &papers_csv,
                &ledger,
                &log_dir,
                &exclusion,
                &config.recovery.output_all,
                &config.recovery.output_filtered,
            )?;
            JsonOutput::print_json(&report).into_diagnostic()
        }
        Commands::SelectSpecies(args) => {
            let mut settings = config.model_species.clone();
            if let Some(top_n) = args.top_n {
                settings.top_n = top_n;
            }
            let ncbi = NcbiHttpClient::new(config.http.eutils_timeout())?;
            let lookup = LookupClient::new(ncbi).with_pace(settings.pace());
            let report = model_species::select_model_species(&lookup, &settings)?;
            JsonOutput::print_json(&report).into_diagnostic()
        }
    }
}

fn load_exclusion(path: Option<Utf8PathBuf>, config: &Config) -> Result<ExclusionSet, CurateError> {
    let path = path.unwrap_or_else(|| config.pre_agent.model_species_csv.clone());
    ExclusionSet::load(&path)
}

fn build_pipeline(config: Config) -> Result<Pipeline<NcbiHttpClient, PubtatorHttpClient>, CurateError> {
    let ncbi = NcbiHttpClient::new(config.http.eutils_timeout())?;
    let pubtator = PubtatorHttpClient::new(config.http.pubtator_timeout())?;
    Ok(Pipeline::new(ncbi, pubtator, config))
}

fn build_lookup(config: &Config) -> Result<LookupClient<NcbiHttpClient>, CurateError> {
    let ncbi = NcbiHttpClient::new(config.http.eutils_timeout())?;
    Ok(LookupClient::new(ncbi).with_pace(config.http.pace()))
}
