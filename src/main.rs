use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};
use serde_json::json;

use docx_templater::config::{init_default_config, load_or_default, locate_config, AppConfig};
use docx_templater::docx::Package;
use docx_templater::progress::{emit, ConsoleProgress, Level};
use docx_templater::render::batch::{render_batch, BatchJob, BatchSummary};
use docx_templater::render::media::{summarize, ImageSource, MediaSlot};
use docx_templater::render::{render_file, scan, validate, ImageMap, TemplateData};

#[derive(Parser, Debug)]
#[command(name = "docx-templater")]
#[command(about = "Fill DOCX templates: placeholders, lists, table rows and images", long_about = None)]
struct Args {
    /// Write the default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Template .docx
    #[arg(value_name = "DOCX")]
    template: Option<PathBuf>,

    /// Output .docx (default: <template_stem>_filled.docx); a directory with --batch-dir
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// JSON object with the template values
    #[arg(long, value_name = "JSON")]
    data: Option<PathBuf>,

    /// Directory of replacement images named by key (body_0.png, header_0_0.jpg, ...)
    #[arg(long, value_name = "DIR")]
    images: Option<PathBuf>,

    /// Single image replacement, e.g. --image footer_0=logo.png (repeatable)
    #[arg(long, value_name = "KEY=PATH")]
    image: Vec<String>,

    /// Fail when a placeholder has no value
    #[arg(long)]
    strict: bool,

    /// Rewrite edited paragraphs as single runs instead of editing runs in place
    #[arg(long)]
    no_preserve_format: bool,

    /// Print document statistics, placeholders and images as JSON, then exit
    #[arg(long)]
    info: bool,

    /// Check --data against the template's placeholders, then exit
    #[arg(long)]
    validate: bool,

    /// Render the template once per *.json file in DIR
    #[arg(long, value_name = "DIR")]
    batch_dir: Option<PathBuf>,

    /// Config file path (default: search for docx-templater.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reject templates larger than this (0 = no limit)
    #[arg(long, value_name = "MB")]
    max_file_size_mb: Option<u64>,

    /// Print debug events
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(true).verbose(args.verbose);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let template = match args.template.clone() {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  docx-templater <template.docx> --data values.json [-o out.docx]\n\nTIPS:\n  - Default config search: docx-templater.toml (upwards), or set DOCX_TEMPLATER_CONFIG.\n"
            );
            return Ok(());
        }
    };

    let workdir = template
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let cfg_path = locate_config(args.config.clone(), &workdir);
    let mut cfg = load_or_default(cfg_path.as_deref())?;
    if let Some(mb) = args.max_file_size_mb {
        cfg.limits.max_file_size_mb = Some(mb);
    }
    let mut opts = cfg.render_options();
    opts.strict |= args.strict;
    if args.no_preserve_format {
        opts.preserve_format = false;
    }

    if args.info {
        let pkg = Package::open_with(&template, &opts.load)
            .with_context(|| format!("open {}", template.display()))?;
        let report = json!({
            "statistics": pkg.statistics(),
            "placeholders": scan(&pkg),
            "images": summarize(&pkg),
            "integrity": pkg.integrity(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let data = match args.data.as_ref() {
        Some(p) => TemplateData::from_json_file(p)
            .with_context(|| format!("read data: {}", p.display()))?,
        None => TemplateData::new(),
    };

    if args.validate {
        let pkg = Package::open_with(&template, &opts.load)
            .with_context(|| format!("open {}", template.display()))?;
        let v = validate(&pkg, data.keys());
        println!("{}", serde_json::to_string_pretty(&v)?);
        if !v.is_complete() {
            return Err(anyhow!("{} placeholder(s) without data", v.missing.len()));
        }
        return Ok(());
    }

    let images = collect_images(&args, &cfg, cfg_path.as_deref())?;

    if let Some(batch_dir) = args.batch_dir.as_ref() {
        let out_dir = args.output.clone().unwrap_or_else(|| batch_dir.join("out"));
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("create output dir: {}", out_dir.display()))?;
        let jobs = batch_jobs(&template, batch_dir, &out_dir, &images)?;
        let total = jobs.len();
        progress.info(format!("batch: {total} job(s) from {}", batch_dir.display()));
        let outcomes = render_batch(jobs, &opts, cfg.batch.workers)?;
        for (i, o) in outcomes.iter().enumerate() {
            for ev in &o.events {
                emit(&progress, ev.level, format!("[{}] {}", o.output.display(), ev.message));
            }
            if let Err(e) = &o.result {
                emit(&progress, Level::Error, format!("{}: {e}", o.output.display()));
            }
            progress.progress("batch", i + 1, total);
        }
        let summary = BatchSummary::of(&outcomes);
        progress.info(format!(
            "batch done: {} ok, {} failed",
            summary.succeeded, summary.failed
        ));
        if summary.failed > 0 {
            return Err(anyhow!("{} batch job(s) failed", summary.failed));
        }
        return Ok(());
    }

    let output = match args.output.clone() {
        Some(p) => p,
        None => {
            let stem = template
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
                .to_string();
            template.with_file_name(format!("{stem}_filled.docx"))
        }
    };

    let report = render_file(&template, &output, &data, &images, &opts, &progress)
        .with_context(|| format!("render {}", template.display()))?;
    progress.info(format!(
        "done: {} replacement(s), {} list(s), {} table(s), {} image(s) ({} failed)",
        report.replacements,
        report.expansion.lists_expanded,
        report.expansion.tables_expanded,
        report.images.len(),
        report.images_failed()
    ));
    Ok(())
}

fn collect_images(
    args: &Args,
    cfg: &AppConfig,
    cfg_path: Option<&Path>,
) -> anyhow::Result<ImageMap> {
    let mut images = ImageMap::new();
    let dir = args.images.clone().or_else(|| cfg.images_dir(cfg_path));
    if let Some(dir) = dir {
        images.extend(
            ImageSource::from_dir(&dir)
                .with_context(|| format!("scan images: {}", dir.display()))?,
        );
    }
    for pair in &args.image {
        let (key, path) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--image expects KEY=PATH, got `{pair}`"))?;
        key.parse::<MediaSlot>()?;
        images.insert(key.to_string(), ImageSource::path(path));
    }
    Ok(images)
}

fn batch_jobs(
    template: &Path,
    batch_dir: &Path,
    out_dir: &Path,
    images: &ImageMap,
) -> anyhow::Result<Vec<BatchJob>> {
    let mut data_files: Vec<PathBuf> = std::fs::read_dir(batch_dir)
        .with_context(|| format!("read batch dir: {}", batch_dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    data_files.sort();

    let mut jobs = Vec::with_capacity(data_files.len());
    for path in data_files {
        let data = TemplateData::from_json_file(&path)
            .with_context(|| format!("read data: {}", path.display()))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
            .to_string();
        jobs.push(BatchJob {
            template: template.to_path_buf(),
            output: out_dir.join(format!("{stem}.docx")),
            data,
            images: images.clone(),
        });
    }
    Ok(jobs)
}
