//  ██████╗ █████╗ ██╗   ██╗███████╗███████╗    ██╗     ██╗███████╗████████╗
// ██╔════╝██╔══██╗██║   ██║██╔════╝██╔════╝    ██║     ██║██╔════╝╚══██╔══╝
// ██║     ███████║██║   ██║███████╗█████╗      ██║     ██║███████╗   ██║
// ██║     ██╔══██║██║   ██║╚════██║██╔══╝      ██║     ██║╚════██║   ██║
// ╚██████╗██║  ██║╚██████╔╝███████║███████╗    ███████╗██║███████║   ██║
//  ╚═════╝╚═╝  ╚═╝ ╚═════╝ ╚══════╝╚══════╝    ╚══════╝╚═╝╚══════╝   ╚═╝
//
// One question, asked of a portal that would rather not answer it:
// is this case on the list today, where, and at what number?
//
//   causelist --cnr MH01-001234-2023 --today
//   causelist --case-type CRL --case-number 45 --case-year 2022 --tomorrow
//   causelist --causelist --tomorrow
//   causelist --serve
//
// Exit codes: 0 answered (listed, not listed or ambiguous), 2 bad identifier,
// 3 portal unreachable, 4 cause list unreadable, 5 document fetch failed,
// 1 anything else.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use causelist_engine::assembler::assemble_failure;
use causelist_engine::output::{self, OutputFormat};
use causelist_engine::{api, Config, DaySelector, Engine, RawIdentifier, ResolveRequest};

#[derive(Debug, Parser)]
#[command(
    name = "causelist",
    version,
    about = "Check whether a case is listed on the eCourts cause list today or tomorrow."
)]
struct Args {
    /// Case Number Record, e.g. MH01-001234-2023.
    #[arg(long, conflicts_with_all = ["case_type", "case_number", "case_year"])]
    cnr: Option<String>,

    #[arg(long)]
    case_type: Option<String>,

    #[arg(long)]
    case_number: Option<String>,

    #[arg(long)]
    case_year: Option<String>,

    /// Today's list (the default).
    #[arg(long, conflicts_with = "tomorrow")]
    today: bool,

    #[arg(long)]
    tomorrow: bool,

    /// Also download the full cause list PDF. Works without an identifier.
    #[arg(long)]
    causelist: bool,

    /// Also download the case PDF when the case is listed.
    #[arg(long)]
    case_pdf: bool,

    #[arg(long, value_enum, default_value = "json")]
    output_format: OutputFormat,

    /// Overrides CAUSELIST_OUTPUT_DIR.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Run the HTTP API instead of answering one question.
    #[arg(long)]
    serve: bool,

    /// Overrides CAUSELIST_API_PORT.
    #[arg(long)]
    port: Option<u16>,
}

impl Args {
    fn day(&self) -> DaySelector {
        if self.tomorrow {
            DaySelector::Tomorrow
        } else {
            DaySelector::Today
        }
    }

    fn has_identifier(&self) -> bool {
        self.cnr.is_some()
            || self.case_type.is_some()
            || self.case_number.is_some()
            || self.case_year.is_some()
    }
}

fn init_tracing(json: bool) {
    let builder = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Process exit code for a failure kind. None means the question was answered.
fn exit_code(kind: Option<&str>) -> ExitCode {
    match kind {
        None => ExitCode::SUCCESS,
        Some("InvalidIdentifier") => ExitCode::from(2),
        Some("NetworkFailure") => ExitCode::from(3),
        Some("UnparseableListing") => ExitCode::from(4),
        Some("RetrievalFailed") => ExitCode::from(5),
        Some(_) => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut config = Config::from_env();
    init_tracing(config.log_json);

    if let Some(dir) = args.output_dir.clone() {
        config.output_dir = dir;
    }
    if let Some(port) = args.port {
        config.api_port = port;
    }

    match run(args, config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "causelist failed");
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: Config) -> anyhow::Result<ExitCode> {
    let output_dir = config.output_dir.clone();
    let api_addr = config.api_addr();
    let engine = Engine::new(config).context("building HTTP client")?;

    if args.serve {
        serve(engine, api_addr).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let day = args.day();
    let mut resolution = if !args.has_identifier() && args.causelist {
        engine.cause_list(day).await
    } else {
        let identifier = match RawIdentifier::from_parts(
            args.cnr.clone(),
            args.case_type.clone(),
            args.case_number.clone(),
            args.case_year.clone(),
        ) {
            Ok(identifier) => identifier,
            Err(e) => {
                let report = assemble_failure(None, None, &e);
                println!("{}", output::render(&report, args.output_format)?);
                return Ok(exit_code(Some(e.kind())));
            }
        };
        let mut request = ResolveRequest::new(identifier, day);
        request.cause_list = args.causelist;
        request.want_case_pdf = args.case_pdf;
        engine.resolve(&request).await
    };

    let saved = output::save(
        &mut resolution.report,
        &resolution.documents,
        &output_dir,
        args.output_format,
    )?;
    println!("{}", output::render(&resolution.report, args.output_format)?);
    info!(
        report = %saved.report.display(),
        documents = saved.documents.len(),
        status = %resolution.report.status,
        "results saved"
    );

    Ok(exit_code(resolution.error_kind()))
}

async fn serve(engine: Engine, addr: String) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine = Arc::new(engine);

    let mut server = {
        let addr = addr.clone();
        tokio::spawn(async move { api::run_api_server(engine, &addr, shutdown_rx).await })
    };

    info!(addr = addr.as_str(), "cause list API starting, Ctrl+C to stop");

    tokio::select! {
        finished = &mut server => {
            // The server only returns on its own when it could not bind.
            return finished
                .context("api server task panicked")?
                .with_context(|| format!("serving on {}", addr));
        }
        signalled = signal::ctrl_c() => {
            match signalled {
                Ok(()) => warn!("shutdown signal received"),
                Err(e) => error!(error = %e, "signal listener failed, shutting down"),
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(10), server).await;
    info!("cause list API stopped");
    Ok(())
}
