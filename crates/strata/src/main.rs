use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use strata_core::cluster::Cluster;
use strata_core::config::ClusterConfig;
use strata_core::rapids::value::Value;
use strata_core::session::Session;
use strata_error::{DbError, Result, ResultExt};

mod pretty;

#[derive(Parser)]
#[clap(name = "strata")]
struct Arguments {
    /// Number of simulated nodes.
    #[clap(long)]
    nodes: Option<usize>,
    /// Worker threads shared by all nodes.
    #[clap(long)]
    threads: Option<usize>,
    /// Set a cluster setting, `name=value`. May be repeated.
    #[clap(long = "set", value_name = "NAME=VALUE")]
    settings: Vec<String>,
    /// Default log level, overridden by RUST_LOG.
    #[clap(long, default_value = "error")]
    log_level: tracing::Level,
    /// Log as JSON lines.
    #[clap(long)]
    json_logs: bool,
    /// Print every setting with its value, then exit.
    #[clap(long)]
    show_config: bool,
    /// Evaluate expressions from files, in order.
    #[clap(short = 'f', long)]
    files: Vec<PathBuf>,
    /// Expressions to evaluate after any files.
    #[clap(trailing_var_arg = true)]
    exprs: Vec<String>,
}

fn main() {
    let args = Arguments::parse();
    let format = if args.json_logs {
        logutil::LogFormat::Json
    } else {
        logutil::LogFormat::HumanReadable
    };
    logutil::configure_global_logger(args.log_level, format, io::stderr);

    if let Err(err) = inner(args) {
        println!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn build_config(args: &Arguments) -> Result<ClusterConfig> {
    let mut config = ClusterConfig::default();
    if let Some(nodes) = args.nodes {
        config.num_nodes = nodes;
    }
    if let Some(threads) = args.threads {
        config.num_threads = threads;
    }
    for setting in &args.settings {
        let (name, value) = setting
            .split_once('=')
            .ok_or_else(|| DbError::validation("Expected NAME=VALUE").with_field("setting", setting))?;
        config.set_from_str(name.trim(), value.trim())?;
    }
    Ok(config)
}

fn inner(args: Arguments) -> Result<()> {
    let config = build_config(&args)?;
    let mut stdout = BufWriter::new(io::stdout());

    if args.show_config {
        for (name, description) in ClusterConfig::settings() {
            writeln!(stdout, "{name} = {}    -- {description}", config.get_as_scalar(name)?)?;
        }
        stdout.flush()?;
        return Ok(());
    }

    let mut exprs = Vec::new();
    for path in &args.files {
        let content =
            std::fs::read_to_string(path).context_fn(|| format!("Failed to read '{}'", path.display()))?;
        exprs.extend(split_exprs(&content)?);
    }
    exprs.extend(args.exprs.iter().cloned());

    let cluster = Cluster::try_new(config)?;
    let session = Session::new(cluster);

    for expr in &exprs {
        let value = match session.exec(expr) {
            Ok(value) => value,
            Err(err) => return Err(session.end_quietly(err.with_field("expr", expr))),
        };
        match &value {
            Value::Frame(frame) => pretty::write_frame(&mut stdout, session.cluster(), frame)?,
            other => writeln!(stdout, "{other}")?,
        }
        stdout.flush()?;
        session.release(&value)?;
    }

    session.end(None)?;
    Ok(())
}

/// Split text into top level expressions. Blank lines and lines starting
/// with `;` are skipped.
fn split_exprs(text: &str) -> Result<Vec<String>> {
    let mut exprs = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for line in text.lines() {
        if depth == 0 && (line.trim().is_empty() || line.trim_start().starts_with(';')) {
            continue;
        }
        for c in line.chars() {
            current.push(c);
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => (),
                (None, '"' | '\'') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| DbError::validation("Unbalanced ')'").with_field("expr", current.trim()))?;
                }
                _ => (),
            }
        }
        current.push('\n');
        if depth == 0 && quote.is_none() {
            let expr = std::mem::take(&mut current);
            if !expr.trim().is_empty() {
                exprs.push(expr.trim().to_string());
            }
        }
    }

    if !current.trim().is_empty() {
        return Err(DbError::validation("Unterminated expression").with_field("expr", current.trim()));
    }
    Ok(exprs)
}
