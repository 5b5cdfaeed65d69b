use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context};
use bundl_protocol::{assemble, BundleBuilder, BundleContents, BundleEnvelope, ParserOptions};
use bundl_server::{BundlServer, ServerConfig};
use bundl_store::{FsStorage, InMemoryLockProvider};
use bundl_upload::{BundleOrchestrator, BundleReport, CommitOutcome};
use colored::Colorize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Pack(args) => cmd_pack(args),
        Command::Inspect(args) => cmd_inspect(args),
        Command::Apply(args) => cmd_apply(args),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = serve_config(&args)?;
    println!(
        "bundl server on {} (root: {})",
        config.bind_addr.to_string().bold(),
        config.storage_root.display()
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(BundlServer::new(config).serve())?;
    Ok(())
}

fn serve_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(root) = &args.root {
        config.storage_root = root.clone();
    }
    if args.direct {
        config.staged_writes = false;
    }
    Ok(config)
}

fn cmd_pack(args: PackArgs) -> anyhow::Result<()> {
    let builder = build_bundle(&args.files, args.boundary.as_deref(), args.keep_mtime)?;
    let body = builder.build()?;
    fs::write(&args.output, &body)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("{} Packed {} file(s), {} bytes", "✓".green().bold(), args.files.len(), body.len());
    println!("Content-Type: {}", builder.content_type().cyan());
    Ok(())
}

fn build_bundle(files: &[String], boundary: Option<&str>, keep_mtime: bool) -> anyhow::Result<BundleBuilder> {
    let mut builder = match boundary {
        Some(boundary) => BundleBuilder::new(boundary, "manifest"),
        None => BundleBuilder::random(),
    };
    for (index, spec) in files.iter().enumerate() {
        let (local, remote) = match spec.split_once('=') {
            Some((local, remote)) => (Path::new(local), remote.to_string()),
            None => {
                let local = Path::new(spec.as_str());
                let Some(name) = local.file_name() else {
                    bail!("{spec} has no file name");
                };
                (local, name.to_string_lossy().into_owned())
            }
        };
        let data = fs::read(local).with_context(|| format!("reading {}", local.display()))?;
        let mtime = if keep_mtime { modified_secs(local) } else { None };
        builder.add_file(remote, (index + 1).to_string(), data, mtime);
    }
    Ok(builder)
}

fn modified_secs(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let mut contents = read_bundle(&args.input, &args.content_type)?;
    println!(
        "{} manifest entries, {} binary part(s)",
        contents.manifest.len().to_string().bold(),
        contents.binaries.len().to_string().bold()
    );
    for (path, attrs) in contents.manifest.iter() {
        let Some(id) = attrs.content_id.as_deref() else {
            println!("  {} {}", path, "no content id".red());
            continue;
        };
        match contents.binaries.get_mut(id) {
            Some(body) => println!("  {} {} ({} bytes)", path, format!("[{id}]").dimmed(), body.len()),
            None => println!("  {} {} {}", path, format!("[{id}]").dimmed(), "missing".red()),
        }
    }
    Ok(())
}

fn read_bundle(input: &Path, content_type: &str) -> anyhow::Result<BundleContents> {
    let envelope = BundleEnvelope::parse(Some(content_type))?;
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    Ok(assemble(BufReader::new(file), &envelope, ParserOptions::default())?)
}

fn cmd_apply(args: ApplyArgs) -> anyhow::Result<()> {
    let report = apply_bundle(&args.input, &args.content_type, &args.root, &args.collection)?;
    if args.xml {
        print!("{}", report.to_multistatus().to_xml());
        return Ok(());
    }
    for (path, outcome) in report.entries() {
        match outcome {
            CommitOutcome::Committed(receipt) => {
                println!("  {} {} {}", "✓".green(), path, receipt.etag.dimmed())
            }
            CommitOutcome::Failed { kind, message } => {
                println!("  {} {} {} {}", "✗".red(), path, kind.to_string().yellow(), message)
            }
        }
    }
    println!("{} committed, {} failed", report.committed(), report.failed());
    Ok(())
}

fn apply_bundle(input: &Path, content_type: &str, root: &Path, collection: &str) -> anyhow::Result<BundleReport> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    let orchestrator = BundleOrchestrator::new(
        Arc::new(FsStorage::new(root)),
        Arc::new(InMemoryLockProvider::new()),
    );
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    Ok(orchestrator.handle(collection, Some(content_type), BufReader::new(file))?)
}
