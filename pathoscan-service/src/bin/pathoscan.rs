use anyhow::Context as _;
use clap::Parser;
use pathoscan_service::{
    AnalysisSession, OpenRouterBackend, RunStatus, ServiceConfig, answer_question,
    build_analysis_pipeline, create_analysis_session, logging::init_cli_tracing,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Analyze a blood test report and ask follow-up questions about it
#[derive(Parser, Debug)]
#[command(name = "pathoscan", version, about)]
struct Args {
    /// Blood test report: a PDF, or a .txt file with already extracted text
    report: PathBuf,

    /// Question to ask once the analysis completes (repeatable)
    #[arg(short, long = "ask")]
    ask: Vec<String>,

    /// Read further questions from stdin until an empty line
    #[arg(short, long)]
    interactive: bool,

    /// Print stage results as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Log each prompt and raw response
    #[arg(short, long)]
    verbose: bool,
}

fn print_results(state: &AnalysisSession, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }
    if let Some(analysis) = &state.blood_test {
        println!("## Blood Test Analysis\n");
        println!("{}\n", analysis.summary);
        for value in &analysis.abnormal_values {
            println!(
                "- {}: {} (reference {}) - {}",
                value.parameter, value.value, value.reference_range, value.interpretation
            );
        }
        println!();
    }
    if let Some(issues) = &state.health_issues {
        println!("## Potential Health Issues\n");
        for issue in &issues.potential_health_issues {
            println!("- {}", issue);
        }
        println!();
    }
    if let Some(advice) = &state.lifestyle {
        println!("{}\n", advice.render_markdown());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::from_env().context("failed to load configuration")?;
    init_cli_tracing(args.verbose);

    let mut state = AnalysisSession::new(args.report.clone());
    if args
        .report
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
    {
        let text = tokio::fs::read_to_string(&args.report)
            .await
            .with_context(|| format!("failed to read {}", args.report.display()))?;
        state.report_text = Some(text);
    }

    let backend = Arc::new(OpenRouterBackend::from_config(&config));
    let pipeline = build_analysis_pipeline(backend.clone(), config.stage3_policy);
    let mut session = create_analysis_session(None, state);

    eprintln!("Analyzing {} ...", args.report.display());
    pipeline.execute_session(&mut session).await?;

    print_results(&session.state, args.json)?;

    match RunStatus::from_session_status(&session.status) {
        RunStatus::Completed => {}
        RunStatus::Failed { stage, reason } => {
            let label = stage.map(|s| s.number()).map_or("?".to_string(), |n| n.to_string());
            eprintln!("Stage {} failed: {}", label, reason);
            std::process::exit(1);
        }
        RunStatus::Pending => anyhow::bail!("analysis did not run"),
    }

    for question in &args.ask {
        let answer = answer_question(backend.as_ref(), &mut session.state, question).await?;
        println!("Q: {}\nA: {}\n", question.trim(), answer);
    }

    if args.interactive {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        loop {
            stdout.write_all(b"question> ").await?;
            stdout.flush().await?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();
            if question.is_empty() || question == "exit" || question == "quit" {
                break;
            }
            match answer_question(backend.as_ref(), &mut session.state, question).await {
                Ok(answer) => println!("{}\n", answer),
                Err(e) => eprintln!("Error: {}", e),
            }
        }
    }

    Ok(())
}
