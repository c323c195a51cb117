use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;

use ib::config::{find_src_root, Cfg};
use ib::error::IbError;
use ib::planner::Planner;
use ib::script;
use ib::test_runner;

const MARKER_FILE: &str = "__ib__";

#[derive(Parser)]
#[command(name = "ib", about = "build planner for mixed C/C++ source trees")]
struct Cli {
    /// Root of the source tree; if unset, search upward from cwd for __ib__
    #[arg(long)]
    src_root: Option<PathBuf>,

    /// Output root, relative to src_root (the config name is joined on as a subdirectory)
    #[arg(long, default_value = "../out")]
    out_root: PathBuf,

    /// Config root, relative to src_root
    #[arg(long, default_value = ".")]
    cfg_root: PathBuf,

    /// Config to load
    #[arg(long, default_value = "debug")]
    cfg: String,

    /// Print the resolved arguments and exit
    #[arg(long)]
    print_args: bool,

    /// Print the loaded config
    #[arg(long)]
    print_cfg: bool,

    /// Print each wave's emitted script
    #[arg(long)]
    print_script: bool,

    /// Inject a progress preamble into the emitted script
    #[arg(long)]
    show_progress: bool,

    /// Plan only; never invoke the build-runner
    #[arg(long)]
    no_run: bool,

    /// Pass the config's force flag to the build-runner
    #[arg(long)]
    force: bool,

    /// After a successful build, run target artifacts whose atom ends -test
    #[arg(long)]
    test: bool,

    /// Discover *-test.cc under each positional argument and make them implicit targets
    #[arg(long)]
    test_all: bool,

    /// Target specs; /-prefixed are src-root absolute, others are cwd-relative
    targets: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run() {
        eprintln!("{} {}", "** ib error **".red(), e);
        std::process::exit(-1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("failed to read current directory")?;

    let src_root = match &cli.src_root {
        Some(p) => p.clone(),
        None => find_src_root(&cwd, MARKER_FILE).context("failed to locate source root")?,
    };
    let cfg_root = src_root.join(&cli.cfg_root);
    let out_root = src_root.join(&cli.out_root).join(&cli.cfg);

    if cli.print_args {
        println!("src_root = {}", src_root.display());
        println!("out_root = {}", out_root.display());
        println!("cfg_root = {}", cfg_root.display());
        println!("cfg = {}", cli.cfg);
    }

    let cfg = Cfg::load(&cfg_root, &cli.cfg).context("failed to load config")?;
    if cli.print_cfg {
        println!("{:#?}", cfg);
    }

    let branch = cwd
        .strip_prefix(&src_root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut targets = cli.targets.clone();
    if cli.test_all {
        for root in &cli.targets {
            let abs = if let Some(stripped) = root.strip_prefix('/') {
                src_root.join(stripped)
            } else {
                cwd.join(root)
            };
            for entry in walkdir::WalkDir::new(&abs).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                let is_test_source = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with("-test.cc"))
                    .unwrap_or(false);
                if is_test_source {
                    let relpath = path.strip_prefix(&src_root).unwrap_or(path);
                    targets.push(format!("/{}", relpath.with_extension("").display()));
                }
            }
        }
    }

    let mut planner = Planner::new(src_root.clone(), out_root.clone(), branch, cfg.cc.clone());
    let specs: Vec<_> = targets
        .iter()
        .map(|t| planner.convert_target(t))
        .collect::<std::result::Result<_, IbError>>()
        .context("failed to resolve target")?;

    std::fs::create_dir_all(&out_root).context("failed to create output root")?;

    // `yield_waves` returns an iterator borrowing `planner` mutably; drain it
    // into an owned vec first so the borrow ends before `render_wave` needs
    // its own `&mut planner` per wave.
    let waves: Vec<Vec<_>> = planner
        .yield_waves(&specs)
        .context("failed to plan build")?
        .collect::<std::result::Result<_, IbError>>()
        .context("planner failed")?;

    for jobs in waves {
        let rendered = script::render_wave(&mut planner, &cfg, &jobs, cli.show_progress)
            .context("failed to render script")?;

        if cli.print_script {
            println!("{}", rendered);
        }

        if cli.no_run {
            continue;
        }

        run_script(&cfg, &rendered, cli.force)?;
    }

    if cli.test || cli.test_all {
        let outcomes = test_runner::run_tests(&out_root, &specs);
        if !test_runner::report(&outcomes) {
            anyhow::bail!("one or more tests failed");
        }
    }

    Ok(())
}

fn run_script(cfg: &ib::config::Cfg, script: &str, force: bool) -> Result<()> {
    let mut file = tempfile::NamedTempFile::new().context("failed to create temp script")?;
    std::io::Write::write_all(&mut file, script.as_bytes()).context("failed to write temp script")?;
    let path = file.path().to_path_buf();

    let mut cmd = std::process::Command::new(if cfg.make.tool.is_empty() { "make" } else { &cfg.make.tool });
    cmd.args(&cfg.make.flags);
    if force && !cfg.make.force_flag.is_empty() {
        cmd.arg(&cfg.make.force_flag);
    }
    cmd.arg(format!("-f{}", path.display()));
    if !cfg.make.all_pseudo_target.is_empty() {
        cmd.arg(&cfg.make.all_pseudo_target);
    }

    let output = cmd.output().context("failed to invoke build-runner")?;
    if !output.status.success() {
        return Err(IbError::Tool {
            command: format!("{:?}", cmd),
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    }
    Ok(())
}
