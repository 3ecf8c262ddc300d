use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde_json::json;
use slicemig_core::client::{PrismicClient, PrismicClientConfig};
use slicemig_core::config::{ResolvedSettings, load_config};
use slicemig_core::document::resolve_alternates;
use slicemig_core::prompt::{TerminalPrompter, value_or_ask};
use slicemig_core::push::PushReport;
use slicemig_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, normalize_for_display, resolve_paths,
};
use slicemig_core::workflow::{
    MigrationPlan, RunConfig, RunInputs, RunOutcome, RunSettings, fetch_base, plan_migration,
    run_interactive,
};

#[derive(Debug, Parser)]
#[command(
    name = "slicemig",
    version,
    about = "Replace Prismic slices with references to a shared section document"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Fetch, preview, save and optionally push a migration")]
    Run(RunArgs),
    #[command(about = "Show which documents and slices a migration would touch")]
    Preview(PreviewArgs),
    #[command(about = "List the alternates of a document matching a language prefix")]
    Alternates(AlternatesArgs),
    #[command(about = "Print the resolved configuration")]
    Config,
}

#[derive(Debug, Args)]
struct TargetArgs {
    #[arg(long, value_name = "REPO", help = "Prismic repository id")]
    repository: Option<String>,
    #[arg(long = "document", value_name = "ID", help = "Base document id")]
    document_id: Option<String>,
    #[arg(long = "lang", value_name = "PREFIX", help = "Language prefix, e.g. fr")]
    lang_prefix: Option<String>,
    #[arg(long, value_name = "TYPE", help = "Slice type to replace")]
    slice_type: Option<String>,
    #[arg(long = "shared", value_name = "ID", help = "Shared section document id")]
    shared_document_id: Option<String>,
    #[arg(long, value_name = "FIELD", help = "Field of `data` holding the slices")]
    slice_zone: Option<String>,
    #[arg(long, help = "Also migrate the base document when its language matches")]
    include_base: bool,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, value_name = "PATH", help = "Directory for the updated documents")]
    output_dir: Option<PathBuf>,
    #[arg(long, value_name = "MS", help = "Pause after each push request")]
    delay_ms: Option<u64>,
    #[arg(short = 'y', long, help = "Answer yes to both confirmations")]
    yes: bool,
}

#[derive(Debug, Args)]
struct PreviewArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, help = "Print the preview as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct AlternatesArgs {
    #[arg(long, value_name = "REPO")]
    repository: Option<String>,
    #[arg(long = "document", value_name = "ID")]
    document_id: Option<String>,
    #[arg(long = "lang", value_name = "PREFIX")]
    lang_prefix: Option<String>,
}

struct Runtime {
    paths: ResolvedPaths,
    settings: ResolvedSettings,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Run(args)) => run_migration(&runtime, args),
        Some(Commands::Preview(args)) => run_preview(&runtime, args),
        Some(Commands::Alternates(args)) => run_alternates(&runtime, args),
        Some(Commands::Config) => run_config(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_migration(options: &RuntimeOptions, args: RunArgs) -> Result<()> {
    let runtime = load_runtime(options)?;
    let mut client = build_client(&runtime.settings)?;
    let mut prompter = TerminalPrompter::stdio();

    let inputs = RunInputs {
        repository: args
            .target
            .repository
            .clone()
            .or_else(|| runtime.settings.repository.clone()),
        document_id: args.target.document_id.clone(),
        lang_prefix: args.target.lang_prefix.clone(),
        slice_type: args.target.slice_type.clone(),
        shared_document_id: args.target.shared_document_id.clone(),
        token: runtime.settings.write_token.clone(),
    };
    let output_dir = match &args.output_dir {
        Some(path) => runtime.paths.output_dir(path),
        None => runtime.paths.output_dir(&runtime.settings.output_dir),
    };
    let settings = RunSettings {
        slice_zone: slice_zone(&args.target, &runtime.settings),
        output_dir,
        include_base: args.target.include_base,
        push_delay: Duration::from_millis(
            args.delay_ms.unwrap_or(runtime.settings.push_delay_ms),
        ),
        assume_yes: args.yes,
    };

    let outcome = run_interactive(&mut client, &mut prompter, &inputs, &settings)?;

    println!();
    match outcome {
        RunOutcome::Aborted => println!("outcome: aborted"),
        RunOutcome::Saved { paths } => {
            println!("outcome: saved");
            println!("saved.count: {}", paths.len());
        }
        RunOutcome::Pushed { paths, report } => {
            println!("outcome: pushed");
            println!("saved.count: {}", paths.len());
            print_push_report("push", &report);
        }
    }
    println!("output_dir: {}", normalize_for_display(&settings.output_dir));
    if options.diagnostics {
        println!("\n[diagnostics]\n{}", runtime.paths.diagnostics());
    }
    Ok(())
}

fn run_preview(options: &RuntimeOptions, args: PreviewArgs) -> Result<()> {
    let runtime = load_runtime(options)?;
    let mut client = build_client(&runtime.settings)?;
    let mut prompter = TerminalPrompter::stdio();

    let target = &args.target;
    let repository = target
        .repository
        .clone()
        .or_else(|| runtime.settings.repository.clone());
    let config = RunConfig {
        repository: value_or_ask(&mut prompter, repository.as_deref(), "Repository id")?,
        base_document_id: value_or_ask(
            &mut prompter,
            target.document_id.as_deref(),
            "Base document id",
        )?,
        lang_prefix: value_or_ask(
            &mut prompter,
            target.lang_prefix.as_deref(),
            "Language prefix (e.g. fr)",
        )?,
        slice_type: value_or_ask(
            &mut prompter,
            target.slice_type.as_deref(),
            "Slice type to replace",
        )?,
        shared_document_id: value_or_ask(
            &mut prompter,
            target.shared_document_id.as_deref(),
            "Shared section document id",
        )?,
        slice_zone: slice_zone(target, &runtime.settings),
        output_dir: runtime.paths.output_dir(&runtime.settings.output_dir),
        include_base: target.include_base,
    };

    let plan = plan_migration(&mut client, &config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&preview_json(&plan, &config))?);
    } else {
        print_preview(&plan, &config);
    }
    if options.diagnostics {
        println!("\n[diagnostics]\n{}", runtime.paths.diagnostics());
    }
    Ok(())
}

fn run_alternates(options: &RuntimeOptions, args: AlternatesArgs) -> Result<()> {
    let runtime = load_runtime(options)?;
    let mut client = build_client(&runtime.settings)?;
    let mut prompter = TerminalPrompter::stdio();

    let repository = args
        .repository
        .or_else(|| runtime.settings.repository.clone());
    let repository = value_or_ask(&mut prompter, repository.as_deref(), "Repository id")?;
    let document_id = value_or_ask(
        &mut prompter,
        args.document_id.as_deref(),
        "Base document id",
    )?;
    let lang_prefix = value_or_ask(
        &mut prompter,
        args.lang_prefix.as_deref(),
        "Language prefix (e.g. fr)",
    )?;

    let base = fetch_base(&mut client, &repository, &document_id)?;
    let alternates = resolve_alternates(&base.alternate_languages, &lang_prefix);
    println!("base: {} ({})", base.id, base.lang);
    println!("alternates.total: {}", base.alternate_languages.len());
    println!("alternates.matching: {}", alternates.len());
    if alternates.is_empty() {
        println!("alternates: <none>");
    }
    for alternate in alternates {
        println!(
            "alternates.document: {} ({}) uid={}",
            alternate.id,
            alternate.lang,
            alternate.uid.as_deref().unwrap_or("<none>")
        );
    }
    if options.diagnostics {
        println!("\n[diagnostics]\n{}", runtime.paths.diagnostics());
    }
    Ok(())
}

fn run_config(options: &RuntimeOptions) -> Result<()> {
    let runtime = load_runtime(options)?;
    let settings = &runtime.settings;
    println!("config_path: {}", normalize_for_display(&runtime.paths.config_path));
    println!(
        "repository: {}",
        settings.repository.as_deref().unwrap_or("<unset>")
    );
    println!("cdn_url: {}", settings.cdn_url);
    println!("migration_url: {}", settings.migration_url);
    println!("api_key: {}", format_secret(settings.api_key.as_deref()));
    println!("write_token: {}", format_secret(settings.write_token.as_deref()));
    println!("user_agent: {}", settings.user_agent);
    println!("slice_zone: {}", settings.slice_zone);
    println!(
        "output_dir: {}",
        normalize_for_display(&runtime.paths.output_dir(&settings.output_dir))
    );
    println!("push_delay_ms: {}", settings.push_delay_ms);
    println!("http_timeout_ms: {}", settings.http_timeout_ms);
    if options.diagnostics {
        println!("\n[diagnostics]\n{}", runtime.paths.diagnostics());
    }
    Ok(())
}

fn print_preview(plan: &MigrationPlan, config: &RunConfig) {
    println!("preview");
    println!("repository: {}", config.repository);
    println!("base: {} ({})", plan.base.id, plan.base.lang);
    println!("lang_prefix: {}", config.lang_prefix);
    println!("alternates.count: {}", plan.alternates.len());
    println!("shared_section: {} ({})", plan.shared.id(), plan.shared.lang());
    println!("slice_type: {}", config.slice_type);
    println!("slice_zone: {}", config.slice_zone);
    if plan.targets.is_empty() {
        println!("targets: <none>");
    }
    for target in &plan.targets {
        println!(
            "targets.document: {} ({}) matches={}",
            target.document.id, target.document.lang, target.matches
        );
    }
    println!("total_matches: {}", plan.total_matches());
}

fn preview_json(plan: &MigrationPlan, config: &RunConfig) -> serde_json::Value {
    let targets = plan
        .targets
        .iter()
        .map(|target| {
            json!({
                "id": target.document.id,
                "lang": target.document.lang,
                "matches": target.matches,
            })
        })
        .collect::<Vec<_>>();
    json!({
        "repository": config.repository,
        "base": { "id": plan.base.id, "lang": plan.base.lang },
        "lang_prefix": config.lang_prefix,
        "slice_type": config.slice_type,
        "slice_zone": config.slice_zone,
        "shared_section": plan.shared.to_value(),
        "targets": targets,
        "total_matches": plan.total_matches(),
    })
}

fn print_push_report(prefix: &str, report: &PushReport) {
    println!("{prefix}.success: {}", format_flag(report.success));
    println!("{prefix}.pushed: {}", report.pushed);
    println!("{prefix}.failed: {}", report.failed);
    println!("{prefix}.request_count: {}", report.request_count);
    for error in &report.errors {
        println!("{prefix}.error: {error}");
    }
}

fn slice_zone(target: &TargetArgs, settings: &ResolvedSettings) -> String {
    target
        .slice_zone
        .clone()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| settings.slice_zone.clone())
}

fn build_client(settings: &ResolvedSettings) -> Result<PrismicClient> {
    PrismicClient::new(PrismicClientConfig::from_settings(settings))
}

fn load_runtime(options: &RuntimeOptions) -> Result<Runtime> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: options.project_root.clone(),
        config: options.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    let paths = resolve_paths(&context, &overrides)?;
    let config = load_config(&paths.config_path)?;
    Ok(Runtime {
        settings: config.resolve(),
        paths,
    })
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    let _ = builder.try_init();
}

fn format_secret(value: Option<&str>) -> &'static str {
    if value.is_some() { "<set>" } else { "<unset>" }
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
