use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};

use warc_tally::{report, select_files, utils, Analyzer, Args};

fn main() -> Result<()> {
    let args = Args::parse();
    utils::setup_logging(args.verbose);
    utils::validate_args(&args)?;

    let files = select_files(&args.files)?;

    let analyzer = Analyzer::new(args.analyzer_config());
    let token = analyzer.cancellation_token();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        warn!(action = "install", component = "signal_handler", error = %e, "Failed to install Ctrl-C handler");
    }
    if !args.quiet && !args.json {
        analyzer.subscribe(report::LiveProgress::stderr());
    }

    let outcome = analyzer.submit_batch(&files);
    let snapshot = analyzer.snapshot();

    if args.json {
        println!("{}", report::render_json(&snapshot)?);
    } else {
        print!("{}", report::render_text(&snapshot, &args.report_options()));
    }

    match outcome {
        Ok(_) => Ok(()),
        Err(e) => {
            error!(action = "analyze", component = "main", error = %e, "Analysis failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
