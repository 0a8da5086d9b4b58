// ========================================================================================
//
//                      The orchestrator: select-germline
//
// ========================================================================================
//
// This binary turns a list of participant ids into a set of independent selection
// jobs and drives them to completion. It owns the lifecycle from argument parsing to
// the final run summary; all of the per-sample work lives in the library.
//
// ### Orchestration steps ###
//
// 1.  Minimal configuration: the user names a registry and the participants to
//     process. Thresholds and window sizes are fixed constants of the library, not
//     command-line knobs.
//
// 2.  Job construction: ids are resolved through the registry. Unknown ids and
//     incomplete registry entries are reported and skipped, never fatal on their own.
//
// 3.  Execution: the job set is handed to the dispatcher, which runs it on a pool
//     of worker threads and returns once every job has finished or failed.

use clap::Parser;
use log::warn;
use select_germline::dispatch::{run_jobs, worker_count};
use select_germline::registry::Registry;
use std::path::PathBuf;
use std::process;

// ========================================================================================
//                         Command-line interface definition
// ========================================================================================

#[derive(Parser, Debug)]
#[clap(
    name = "select-germline",
    version,
    about = "Selects isolated, well-covered heterozygous germline SNVs per participant."
)]
struct Args {
    /// Participant ids to process.
    #[clap(required = true)]
    participants: Vec<String>,

    /// Tab-separated registry with participant_id, vcf_path, dna_allcount_path and
    /// rna_allcount_path columns.
    #[clap(long)]
    registry: PathBuf,

    /// Number of worker threads. Defaults to one per core.
    #[clap(long)]
    threads: Option<usize>,
}

// ========================================================================================
//                           The main orchestration logic
// ========================================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --- Phase 1: Argument Parsing ---
    let args = Args::parse();

    // --- Phase 2: Job Construction ---
    let registry = match Registry::load(&args.registry) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Fatal error loading registry: {e}");
            process::exit(1);
        }
    };
    if registry.is_empty() {
        warn!("registry {} lists no participants", args.registry.display());
    } else {
        eprintln!(
            "> Loaded registry {} with {} participants.",
            args.registry.display(),
            registry.len()
        );
    }

    let (jobs, skipped) = registry.jobs_for(&args.participants);
    for skip in &skipped {
        warn!("skipping participant '{}': {}", skip.participant_id, skip.reason);
    }
    if jobs.is_empty() {
        eprintln!("Fatal error: none of the requested participants can be processed.");
        process::exit(1);
    }

    // --- Phase 3: Execution ---
    let workers = worker_count(args.threads, jobs.len());
    eprintln!(
        "> Processing {} participants on {} worker threads...",
        jobs.len(),
        workers
    );
    let summary = run_jobs(jobs, workers);

    // --- Phase 4: Summary ---
    eprintln!(
        "> Done in {:.2?}: {} succeeded, {} failed, {} skipped, {} variants selected.",
        summary.elapsed,
        summary.completed.len(),
        summary.failed.len(),
        skipped.len(),
        summary.selected_variants()
    );
    if !summary.failed.is_empty() {
        eprintln!("> Failed participants: {}", summary.failed.join(", "));
    }
}
