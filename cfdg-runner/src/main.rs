mod batch;
mod reports;
mod store;
mod util;

use anyhow::{Context, Result};
use cfdg_sim::{AppConfig, Engine, Manifest, ScenarioSource};
use clap::Parser;
use colored::Colorize;
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;

use batch::{SceneReport, manifest_of, run_batch};
use reports::{ReportFormat, write_report};
use store::{DirMapProvider, DirScenarioSource, FsSceneWriter};
use util::select_tokens;

type FsEngine = Engine<DirScenarioSource, DirMapProvider, FsSceneWriter>;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Parser)]
#[command(name = "cfdg-runner", version)]
#[command(about = "Counterfactual driving-scene generation: perturb, roll out and label recorded scenes")]
struct Args {
    /// Config files merged over the bundled defaults, later files winning
    #[arg(long)]
    config: Vec<PathBuf>,

    /// Directory holding one `<scene_token>.json` per scene
    #[arg(long)]
    scenes: PathBuf,

    /// Directory holding one `<map_name>.json` lane map per map
    #[arg(long)]
    map_root: Option<PathBuf>,

    /// Root of the generated dataset
    #[arg(long, default_value = "cfdg-output")]
    output: PathBuf,

    /// Scene tokens to run (repeatable or comma-separated); all scenes when omitted
    #[arg(long)]
    scene_token: Vec<String>,

    /// Only run scenes whose token matches this regular expression
    #[arg(long)]
    filter: Option<String>,

    /// Override the configured global seed
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads (0 = one per core)
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report to instead of stdout
    #[arg(long)]
    report_output: Option<PathBuf>,

    /// List the available scene tokens and exit
    #[arg(long)]
    list_scenes: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let cfg = load_config(&args)?;
    let source = DirScenarioSource::new(&args.scenes)
        .with_context(|| format!("cannot open scene directory {}", args.scenes.display()))?;

    if maybe_list_scenes(&args, &source)? {
        return Ok(());
    }

    if args.report == ReportFormat::Console && args.report_output.is_none() {
        announce_banner();
    }

    let start_time = Instant::now();
    let engine = build_engine(&args, cfg, source)?;
    let filter = args
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid --filter pattern")?;
    let tokens = select_tokens(engine.scene_tokens()?, &args.scene_token, filter.as_ref());
    if tokens.is_empty() {
        log::warn!("no scenes selected");
    }

    let results = run_batch(&engine, &tokens, args.jobs)?;
    let manifest = manifest_of(&results);
    write_manifest(&args.output, &manifest)?;
    write_reports(&args, &results, &manifest, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let cfg = AppConfig::from_files(&args.config).context("failed to load configuration")?;
    Ok(match args.seed {
        Some(seed) => cfg.with_seed(seed),
        None => cfg,
    })
}

fn maybe_list_scenes(args: &Args, source: &DirScenarioSource) -> Result<bool> {
    if !args.list_scenes {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.report_output.clone())?;
    writeln!(output_target.writer(), "Available scenes:")?;
    for token in source.scene_tokens()? {
        writeln!(output_target.writer(), "  {token}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🚗 Counterfactual Scene Runner".bright_cyan().bold());
    println!("{}", "==============================".cyan());
}

fn build_engine(args: &Args, cfg: AppConfig, source: DirScenarioSource) -> Result<FsEngine> {
    let map_root = args
        .map_root
        .as_deref()
        .context("--map-root is required to run scenes")?;
    let maps = DirMapProvider::new(map_root, cfg.map.search_radius)
        .with_context(|| format!("cannot open map directory {}", map_root.display()))?;
    let sink = FsSceneWriter::new(&args.output, cfg.output.trajectory_format)
        .with_context(|| format!("cannot prepare output {}", args.output.display()))?;
    let engine = FsEngine::builder(cfg)
        .source(source)
        .maps(maps)
        .sink(sink)
        .build()?;
    Ok(engine)
}

fn write_manifest(output: &Path, manifest: &Manifest) -> Result<()> {
    let path = output.join(MANIFEST_FILE);
    let encoded = serde_json::to_vec_pretty(manifest)?;
    fs::write(&path, encoded).with_context(|| format!("failed to write {}", path.display()))
}

fn write_reports(
    args: &Args,
    results: &[SceneReport],
    manifest: &Manifest,
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.report_output.clone())?;
    write_report(
        output_target.writer(),
        args.report,
        results,
        manifest,
        start_time.elapsed(),
    )?;
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfdg_sim::Labels;
    use std::time::Duration;

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "cfdg-main-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    fn base_args() -> Args {
        Args {
            config: Vec::new(),
            scenes: PathBuf::from("scenes"),
            map_root: None,
            output: PathBuf::from("cfdg-output"),
            scene_token: Vec::new(),
            filter: None,
            seed: None,
            jobs: 1,
            report: ReportFormat::Console,
            report_output: None,
            list_scenes: false,
            verbose: false,
        }
    }

    fn sample_result() -> SceneReport {
        SceneReport {
            scene_token: "scene-1".to_string(),
            passed: true,
            frames: 10,
            perturbation: Some("impulse".to_string()),
            labels: Some(Labels::default()),
            error: None,
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn cli_flags_parse() {
        let args = Args::try_parse_from([
            "cfdg-runner",
            "--scenes",
            "in",
            "--config",
            "a.json",
            "--config",
            "b.json",
            "--scene-token",
            "x",
            "--report",
            "markdown",
            "--seed",
            "7",
        ])
        .unwrap();
        assert_eq!(args.config.len(), 2);
        assert_eq!(args.scene_token, vec!["x".to_string()]);
        assert_eq!(args.report, ReportFormat::Markdown);
        assert_eq!(args.seed, Some(7));
        assert!(Args::try_parse_from(["cfdg-runner"]).is_err());
    }

    #[test]
    fn seed_flag_overrides_config() {
        let args = Args {
            seed: Some(99),
            ..base_args()
        };
        assert_eq!(load_config(&args).unwrap().seed, 99);
        assert_eq!(load_config(&base_args()).unwrap().seed, 0);
    }

    #[test]
    fn build_engine_requires_map_root() {
        let scenes = temp_path("scenes");
        fs::create_dir_all(&scenes).unwrap();
        let source = DirScenarioSource::new(&scenes).unwrap();
        let err = build_engine(&base_args(), AppConfig::load_from_static(), source)
            .err()
            .unwrap();
        assert!(err.to_string().contains("--map-root"));
        fs::remove_dir_all(&scenes).ok();
    }

    #[test]
    fn maybe_list_scenes_writes_output() {
        let scenes = temp_path("list");
        fs::create_dir_all(&scenes).unwrap();
        fs::write(scenes.join("abc.json"), "{}").unwrap();
        let report = temp_path("list.txt");
        let args = Args {
            list_scenes: true,
            report_output: Some(report.clone()),
            ..base_args()
        };
        let source = DirScenarioSource::new(&scenes).unwrap();
        assert!(maybe_list_scenes(&args, &source).unwrap());
        let content = fs::read_to_string(&report).unwrap();
        assert!(content.contains("Available scenes"));
        assert!(content.contains("abc"));
        assert!(!maybe_list_scenes(&base_args(), &source).unwrap());
        fs::remove_dir_all(&scenes).ok();
        fs::remove_file(&report).ok();
    }

    #[test]
    fn write_reports_emits_json_output() {
        let path = temp_path("report.json");
        let args = Args {
            report: ReportFormat::Json,
            report_output: Some(path.clone()),
            ..base_args()
        };
        let results = [sample_result()];
        let manifest = manifest_of(&results);
        write_reports(&args, &results, &manifest, Instant::now()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("scene-1"));
        assert!(content.contains("\"manifest\""));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn manifest_lands_in_output_root() {
        let out = temp_path("manifest");
        fs::create_dir_all(&out).unwrap();
        let manifest = manifest_of(&[sample_result()]);
        write_manifest(&out, &manifest).unwrap();
        let stored: Manifest =
            serde_json::from_str(&fs::read_to_string(out.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(stored, manifest);
        fs::remove_dir_all(&out).ok();
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
