use anyhow::{bail, Context};
use clap::Parser;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use pplx_batch::batch::{BatchEvent, BatchHandle, BatchJob, BatchPhase, BatchReport};
use pplx_batch::cli::{Cli, Commands, ProfileAction};
use pplx_batch::config::{project_root, timestamp, ConfigManager};
use pplx_batch::error::PplxError;
use pplx_batch::excel::{run_fill_details, FillDetailsJob, NodeTable};
use pplx_batch::inspect::{batch_update_aux, directory_report};
use pplx_batch::pplx::PplxDocument;
use pplx_batch::processor::FileStatus;
use pplx_common::{assign, AuxSlot, Category, NodeFacts};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(verbose: bool) {
    let default = if verbose {
        "pplx_batch=debug,pplx_common=debug"
    } else {
        "pplx_batch=warn,pplx_common=warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// CLI value, else the remembered session path when it still exists
fn pick_path(arg: Option<PathBuf>, remembered: &str) -> Option<PathBuf> {
    arg.or_else(|| {
        let path = PathBuf::from(remembered);
        (!remembered.is_empty() && path.exists()).then_some(path)
    })
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

async fn run_process(
    config: &mut ConfigManager,
    existing: Option<PathBuf>,
    proposed: Option<PathBuf>,
    excel: Option<PathBuf>,
    output: Option<PathBuf>,
    verbose: bool,
) -> anyhow::Result<()> {
    println!("PPLX batch processing\n");

    let existing = pick_path(existing, &config.state().last_existing_folder_path);
    let proposed = pick_path(proposed, &config.state().last_proposed_folder_path);
    let excel = config.excel_workbook(excel)?;

    let mut inputs = Vec::new();
    if let Some(path) = &existing {
        config.set_existing_folder(path);
        inputs.push((Category::Existing, path.clone()));
    }
    if let Some(path) = &proposed {
        config.set_proposed_folder(path);
        inputs.push((Category::Proposed, path.clone()));
    }
    if inputs.is_empty() {
        bail!("no input given: pass --existing and/or --proposed");
    }
    if !excel.exists() {
        bail!(PplxError::FileNotFound(excel.display().to_string()));
    }
    config.set_excel_file(&excel);
    config.save_state().context("saving session state")?;

    let output_root = output.unwrap_or_else(|| config.default_output_dir(Some(&excel)));
    println!("  Profile: {}", config.profile_name());
    println!("  Output:  {}\n", output_root.display());

    let job = BatchJob {
        inputs,
        excel: Some(excel),
        output_root,
        profile: config.profile().clone(),
        timestamp: timestamp(),
    };

    let mut handle = BatchHandle::spawn(job);
    let cancel = handle.cancel_token();
    let pb = progress_bar();
    let mut cancelling = false;

    loop {
        tokio::select! {
            event = handle.events.recv() => {
                let Some(event) = event else { break };
                render_event(&pb, event, verbose);
            }
            _ = tokio::signal::ctrl_c(), if !cancelling => {
                pb.println("Stopping after the current file...");
                cancel.cancel();
                cancelling = true;
            }
        }
    }
    pb.finish_and_clear();

    let report = tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("joining batch worker")??;
    print_summary(&report);
    Ok(())
}

fn render_event(pb: &ProgressBar, event: BatchEvent, verbose: bool) {
    match event {
        BatchEvent::NodesLoaded(stats) => pb.println(format!(
            "✔ Nodes sheet: {} valid of {} rows ({} without SCID, {} filtered)",
            stats.valid, stats.total_rows, stats.skipped_no_scid, stats.skipped_filtered
        )),
        BatchEvent::NodesUnavailable(reason) => {
            pb.println(format!("! Continuing without node data: {}", reason))
        }
        BatchEvent::Phase(BatchPhase::Scanning) => pb.println("[1/3] Scanning inputs..."),
        BatchEvent::Phase(BatchPhase::Processing) => pb.println("[2/3] Processing files..."),
        BatchEvent::Phase(BatchPhase::Reporting) => pb.println("[3/3] Writing change logs..."),
        BatchEvent::Phase(BatchPhase::Idle) => {}
        BatchEvent::Scanned { category, files } => {
            pb.inc_length(files as u64);
            pb.println(format!("✔ {}: {} files", category, files));
        }
        BatchEvent::FileStarted { category, file_name, .. } => {
            pb.set_message(format!("{} {}", category, file_name));
        }
        BatchEvent::FileFinished { outcome, .. } => {
            pb.inc(1);
            if verbose {
                for line in &outcome.logs {
                    pb.println(line);
                }
            }
            if outcome.status == FileStatus::Failed {
                pb.println(format!(
                    "✗ {}: {}",
                    outcome.file_name,
                    outcome.error.as_deref().unwrap_or("failed")
                ));
            }
        }
        BatchEvent::ChangeLogWritten { category, path } => {
            pb.println(format!("✔ {} change log: {}", category, path.display()))
        }
        BatchEvent::Cancelled => pb.println("Batch stopped before all files were processed"),
    }
}

fn print_summary(report: &BatchReport) {
    println!();
    for cat in &report.categories {
        println!(
            "{}: {} files, {} written, {} skipped, {} failed",
            cat.category, cat.total, cat.success, cat.skipped, cat.failed
        );
        if let Some(err) = &cat.error {
            println!("  ! {}", err);
        }
    }
    if !report.errors.is_empty() {
        println!("\nErrors:");
        for err in &report.errors {
            println!("  {} ({}): {}", err.file_name, err.category, err.error);
        }
    }
    println!("\nOutput: {}", report.output_root.display());
    if report.cancelled {
        println!("\n⚠ Stopped early");
    } else {
        println!("\n✅ Done");
    }
}

fn run_inspect(file: &Path, structure: Option<PathBuf>, spans: bool) -> anyhow::Result<()> {
    let doc = PplxDocument::load(file)?;
    let info = doc.file_info();
    println!("File: {}", file.display());
    println!("  Date: {}", info.date.as_deref().unwrap_or("-"));
    println!("  User: {}", info.user.as_deref().unwrap_or("-"));
    if let (Some(lat), Some(lon)) = doc.scene_lat_lon() {
        println!("  Location: {:.6}, {:.6}", lat, lon);
    }

    for pole in 0..doc.wood_pole_count() {
        println!("\nWoodPole {}", pole + 1);
        for (name, value) in doc.aux_data(pole)? {
            println!("  {}: {}", name, value);
        }
    }

    println!("\nElements:");
    for (name, count) in doc.element_counts() {
        println!("  {}: {}", name, count);
    }

    if spans {
        println!("\nSpans:");
        for (span_type, lengths) in doc.spans_by_type_and_length() {
            println!("  {}", span_type);
            for l in lengths {
                println!("    {:.1} in  {}", l.length_inches, l.conductor_type);
            }
        }
    }

    if let Some(path) = structure {
        std::fs::write(&path, serde_json::to_string_pretty(&doc.structure_json())?)?;
        println!("\n✔ Structure written: {}", path.display());
    }
    Ok(())
}

fn run_profile(config: &mut ConfigManager, action: ProfileAction) -> anyhow::Result<()> {
    match action {
        ProfileAction::List => {
            for name in config.available_profiles() {
                let marker = if name == config.profile_name() { "*" } else { " " };
                println!("{} {}", marker, name);
            }
        }
        ProfileAction::Show => {
            println!("{} ({})", config.profile_name(), config.profile_path().display());
            println!("{}", config.profile().to_json()?);
        }
        ProfileAction::Use { name } => {
            let name = match name {
                Some(name) => name,
                None => {
                    let names = config.available_profiles();
                    let current = names.iter().position(|n| n == config.profile_name()).unwrap_or(0);
                    let choice = Select::new()
                        .with_prompt("Profile")
                        .items(&names)
                        .default(current)
                        .interact()?;
                    names[choice].clone()
                }
            };
            config.switch_profile(&name)?;
            println!("✔ Active profile: {}", name);
        }
        ProfileAction::Set { key, value } => {
            config.set_profile_value(&key, &value)?;
            println!("✔ {}.{} updated", config.profile_name(), key);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let root = cli.root.clone().unwrap_or_else(project_root);

    match cli.command {
        Commands::Process { existing, proposed, excel, output, config } => {
            let mut manager = ConfigManager::load(&root, config.as_deref());
            run_process(&mut manager, existing, proposed, excel, output, cli.verbose).await?;
        }

        Commands::FillDetails { source, excel, modified, output } => {
            println!("PPLX fill details\n");
            let config = ConfigManager::load(&root, None);

            println!("[1/2] Loading nodes sheet...");
            let nodes = NodeTable::load(&excel)?;
            println!("✔ {} pole rows\n", nodes.len());

            println!("[2/2] Filling aux data...");
            let mut job = FillDetailsJob::new(&source);
            if let Some(modified) = modified {
                job.modified_dir = modified;
            }
            if let Some(output) = output {
                job.output = output;
            }
            let summary = run_fill_details(&job, &nodes, config.profile())?;
            println!(
                "✔ Processed: {}, Skipped: {}, Updated: {}, Failed: {}",
                summary.processed, summary.skipped, summary.updated, summary.failed
            );
            if summary.workbook_written {
                println!("✔ Workbook: {}", job.output.display());
            } else {
                println!("No data to write.");
            }
        }

        Commands::Report { dir, output } => {
            let report = directory_report(&dir)?;
            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("✔ Report written: {} ({} files)", path.display(), report.total_files);
                }
                None => println!("{}", json),
            }
        }

        Commands::Inspect { file, structure, spans } => {
            run_inspect(&file, structure, spans)?;
        }

        Commands::SetAux { dir, slot, value, pattern } => {
            let slot = AuxSlot::new(slot)?;
            let results = batch_update_aux(&dir, slot, &value, pattern.as_deref())?;
            for (name, result) in &results {
                match &result.error {
                    Some(err) => println!("✗ {}: {}", name, err),
                    None if result.changes.is_empty() => println!("- {}: unchanged", name),
                    None => println!("✔ {}: {} = {}", name, slot, value),
                }
            }
        }

        Commands::AnalyzeNote { text, category } => {
            let config = ConfigManager::load(&root, None);
            let facts = NodeFacts {
                mr_note: text,
                ..Default::default()
            };
            let assignment = assign(config.profile(), category, Some(&facts));
            println!("Profile: {}", config.profile_name());
            for (slot, value, source) in assignment.iter() {
                println!("  {}: {} ({})", slot, value, source);
            }
        }

        Commands::Profile { action } => {
            let mut config = ConfigManager::load(&root, None);
            run_profile(&mut config, action)?;
        }
    }

    Ok(())
}
