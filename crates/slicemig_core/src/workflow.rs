use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;

use crate::client::{ContentReadApi, MigrationWriteApi, fetch_document};
use crate::document::{Alternate, Document, SharedSectionReference, resolve_alternates};
use crate::persist::save_documents;
use crate::prompt::{Prompter, value_or_ask};
use crate::push::{PushOptions, PushReport, push_documents};

/// Values the operator may supply up front; anything missing is prompted.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub repository: Option<String>,
    pub document_id: Option<String>,
    pub lang_prefix: Option<String>,
    pub slice_type: Option<String>,
    pub shared_document_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub slice_zone: String,
    pub output_dir: PathBuf,
    pub include_base: bool,
    pub push_delay: Duration,
    pub assume_yes: bool,
}

/// Everything a migration needs, fixed once the operator has answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub repository: String,
    pub base_document_id: String,
    pub lang_prefix: String,
    pub slice_type: String,
    pub shared_document_id: String,
    pub slice_zone: String,
    pub output_dir: PathBuf,
    pub include_base: bool,
}

#[derive(Debug, Clone)]
pub struct TargetPreview {
    pub document: Document,
    pub matches: usize,
}

#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub base: Document,
    pub alternates: Vec<Alternate>,
    pub shared: SharedSectionReference,
    pub targets: Vec<TargetPreview>,
}

impl MigrationPlan {
    pub fn total_matches(&self) -> usize {
        self.targets.iter().map(|target| target.matches).sum()
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Aborted,
    Saved {
        paths: Vec<PathBuf>,
    },
    Pushed {
        paths: Vec<PathBuf>,
        report: PushReport,
    },
}

pub fn fetch_base<A: ContentReadApi + ?Sized>(
    api: &mut A,
    repository: &str,
    document_id: &str,
) -> Result<Document> {
    fetch_document(api, repository, document_id)
        .with_context(|| format!("failed to fetch base document {document_id}"))
}

pub fn fetch_shared_reference<A: ContentReadApi + ?Sized>(
    api: &mut A,
    repository: &str,
    document_id: &str,
) -> Result<SharedSectionReference> {
    let shared = fetch_document(api, repository, document_id)
        .with_context(|| format!("failed to fetch shared section document {document_id}"))?;
    Ok(SharedSectionReference::from_document(&shared))
}

/// Fetches every target document and counts the slices that would change.
/// The base document leads the list when `include_base` is set and its
/// language matches the prefix.
pub fn fetch_targets<A: ContentReadApi + ?Sized>(
    api: &mut A,
    config: &RunConfig,
    base: &Document,
    alternates: &[Alternate],
) -> Result<Vec<TargetPreview>> {
    let mut documents = Vec::with_capacity(alternates.len() + 1);
    if config.include_base && base.lang.starts_with(&format!("{}-", config.lang_prefix)) {
        documents.push(base.clone());
    }
    for alternate in alternates {
        debug!("fetching alternate {} ({})", alternate.id, alternate.lang);
        let document = fetch_document(api, &config.repository, &alternate.id)
            .with_context(|| format!("failed to fetch alternate {}", alternate.id))?;
        documents.push(document);
    }

    documents
        .into_iter()
        .map(|document| {
            let matches = document.count_slices(&config.slice_zone, &config.slice_type)?;
            Ok(TargetPreview { document, matches })
        })
        .collect()
}

/// Runs every read-only stage of a migration.
pub fn plan_migration<A: ContentReadApi + ?Sized>(
    api: &mut A,
    config: &RunConfig,
) -> Result<MigrationPlan> {
    let base = fetch_base(api, &config.repository, &config.base_document_id)?;
    let alternates = resolve_alternates(&base.alternate_languages, &config.lang_prefix);
    let shared = fetch_shared_reference(api, &config.repository, &config.shared_document_id)?;
    let targets = fetch_targets(api, config, &base, &alternates)?;
    Ok(MigrationPlan {
        base,
        alternates,
        shared,
        targets,
    })
}

pub fn apply_plan(plan: &MigrationPlan, config: &RunConfig) -> Result<Vec<Document>> {
    plan.targets
        .iter()
        .map(|target| {
            target
                .document
                .with_shared_section(&config.slice_zone, &config.slice_type, &plan.shared)
        })
        .collect()
}

/// Interactive run: collect inputs, preview, then save and push behind
/// two confirmations. Declining the save ends the run without writing.
pub fn run_interactive<A, P>(
    api: &mut A,
    prompter: &mut P,
    inputs: &RunInputs,
    settings: &RunSettings,
) -> Result<RunOutcome>
where
    A: MigrationWriteApi + ?Sized,
    P: Prompter + ?Sized,
{
    let repository = value_or_ask(prompter, inputs.repository.as_deref(), "Repository id")?;
    let base_document_id =
        value_or_ask(prompter, inputs.document_id.as_deref(), "Base document id")?;
    let lang_prefix = value_or_ask(
        prompter,
        inputs.lang_prefix.as_deref(),
        "Language prefix (e.g. fr)",
    )?;

    let base = fetch_base(api, &repository, &base_document_id)?;
    prompter.say(&format!("base: {} ({})", base.id, base.lang))?;
    let alternates = resolve_alternates(&base.alternate_languages, &lang_prefix);
    prompter.say(&format!("alternates.count: {}", alternates.len()))?;
    for alternate in &alternates {
        prompter.say(&format!("alternates.document: {} ({})", alternate.id, alternate.lang))?;
    }

    let slice_type = value_or_ask(
        prompter,
        inputs.slice_type.as_deref(),
        "Slice type to replace",
    )?;
    let shared_document_id = value_or_ask(
        prompter,
        inputs.shared_document_id.as_deref(),
        "Shared section document id",
    )?;
    let config = RunConfig {
        repository,
        base_document_id,
        lang_prefix,
        slice_type,
        shared_document_id,
        slice_zone: settings.slice_zone.clone(),
        output_dir: settings.output_dir.clone(),
        include_base: settings.include_base,
    };

    let shared = fetch_shared_reference(api, &config.repository, &config.shared_document_id)?;
    prompter.say(&format!("shared_section: {} ({})", shared.id(), shared.lang()))?;

    let targets = fetch_targets(api, &config, &base, &alternates)?;
    let plan = MigrationPlan {
        base,
        alternates,
        shared,
        targets,
    };
    for target in &plan.targets {
        prompter.say(&format!(
            "preview.document: {} ({}) {} x {}",
            target.document.id, target.document.lang, target.matches, config.slice_type
        ))?;
    }
    prompter.say(&format!("preview.total_matches: {}", plan.total_matches()))?;

    if !confirm_or_assume(prompter, settings.assume_yes, "Replace and save locally?")? {
        prompter.say("aborted: nothing written")?;
        return Ok(RunOutcome::Aborted);
    }
    let updated = apply_plan(&plan, &config)?;
    let paths = save_documents(&config.output_dir, &updated)?;
    for path in &paths {
        prompter.say(&format!("saved: {}", path.display()))?;
    }

    if !confirm_or_assume(
        prompter,
        settings.assume_yes,
        "Push the updated documents to the migration API?",
    )? {
        return Ok(RunOutcome::Saved { paths });
    }
    api.check_write_access()?;
    let token = value_or_ask(prompter, inputs.token.as_deref(), "Access token")?;
    let report = push_documents(
        api,
        &updated,
        &PushOptions {
            repository: config.repository.clone(),
            token,
            delay: settings.push_delay,
        },
    )?;
    for page in &report.pages {
        match &page.detail {
            Some(detail) => prompter.say(&format!(
                "push.{}: {} {}",
                page.action, page.document_id, detail
            ))?,
            None => prompter.say(&format!("push.{}: {}", page.action, page.document_id))?,
        }
    }
    Ok(RunOutcome::Pushed { paths, report })
}

fn confirm_or_assume<P: Prompter + ?Sized>(
    prompter: &mut P,
    assume_yes: bool,
    question: &str,
) -> Result<bool> {
    if assume_yes {
        prompter.say(&format!("{question} yes (--yes)"))?;
        return Ok(true);
    }
    prompter.confirm(question)
}
