//! Script emitter (C6): turns a wave of jobs into a Make-style build script
//! whose dependency graph reproduces the planner's graph.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::config::Cfg;
use crate::job::JobKind;
use crate::plan::JobRef;
use crate::planner::Planner;
use crate::error::Result;

pub struct Rule {
    pub outputs: Vec<PathBuf>,
    pub dependencies: BTreeSet<PathBuf>,
    pub recipe_lines: Vec<String>,
    pub action: &'static str,
}

impl Rule {
    /// One `$(SHOW_PROGRESS)` line precedes the recipe: `action $@` for a
    /// rule with commands, `action done` for one without (the all-rule).
    fn render(&self, show_progress: bool) -> String {
        let outputs = self
            .outputs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let deps = self
            .dependencies
            .iter()
            .map(|p| format!(" \\\n\t{}", p.display()))
            .collect::<String>();

        let mut recipe = String::new();
        if show_progress {
            if self.recipe_lines.is_empty() {
                recipe.push_str(&format!("\t@$(SHOW_PROGRESS) {} done\n", self.action));
            } else {
                recipe.push_str(&format!("\t@$(SHOW_PROGRESS) {} $@\n", self.action));
            }
        }
        for line in &self.recipe_lines {
            recipe.push('\t');
            recipe.push_str(line);
            recipe.push('\n');
        }

        format!("{}:{}\n{}", outputs, deps, recipe)
    }
}

fn is_unix_like() -> bool {
    !matches!(std::env::consts::OS, "macos" | "windows")
}

fn build_compile_rule(planner: &mut Planner, cfg: &Cfg, job: &JobRef) -> Result<Rule> {
    let (input, output) = {
        let job = job.borrow();
        (job.input.clone(), job.output())
    };
    let source_abs = planner.src_root.join(input.relpath());
    let output_abs = planner.out_root.join(output.relpath());

    let mut dependencies = BTreeSet::new();
    dependencies.insert(source_abs.clone());
    for hdr in planner.transitive_headers(&source_abs)? {
        let plan = planner.get_plan(&hdr)?;
        if plan.is_doable() {
            dependencies.insert(planner.src_root.join(hdr.relpath()));
        }
    }

    let mut args = vec![cfg.cc.tool.clone()];
    args.push(format!("-I{}", planner.src_root.display()));
    args.push(format!("-I{}", planner.out_root.display()));
    for dir in &cfg.cc.incl_dirs {
        args.push(format!("-I{}", dir));
    }
    args.push(format!("-DIB_SRC_ROOT={}", planner.src_root.display()));
    args.push(format!("-DIB_OUT_ROOT={}", planner.out_root.display()));
    args.extend(cfg.cc.flags.iter().cloned());
    args.push("-c".to_string());
    args.push("-o".to_string());
    args.push(output_abs.display().to_string());
    args.push(source_abs.display().to_string());

    Ok(Rule {
        outputs: vec![output_abs],
        dependencies,
        recipe_lines: vec![args.join(" ")],
        action: JobKind::Compile.action(),
    })
}

fn build_link_rule(planner: &mut Planner, cfg: &Cfg, job: &JobRef) -> Result<Rule> {
    let (job_kind, input, output, rename_to) = {
        let job = job.borrow();
        (job.job_kind, job.input.clone(), job.output(), job.rename_to())
    };
    let output_abs = planner.out_root.join(output.relpath());

    let mut dependencies = BTreeSet::new();
    for object in planner.transitive_objects(&input)? {
        dependencies.insert(planner.out_root.join(object.relpath()));
    }

    let extra_link_opts: &[&str] = match job_kind {
        JobKind::LinkSo => &["-shared", "-rdynamic"],
        _ => &[],
    };

    let mut args = vec![cfg.link.tool.clone()];
    args.extend(extra_link_opts.iter().map(|s| s.to_string()));
    args.extend(cfg.link.flags.iter().cloned());
    args.push(format!("{}{}", cfg.link.out_flag_prefix, output_abs.display()));
    args.extend(dependencies.iter().map(|p| p.display().to_string()));
    args.extend(cfg.link.lib_dirs.iter().map(|d| format!("-L{}", d)));
    args.extend(
        cfg.link
            .libs
            .iter()
            .map(|lib| format!("{}{}", cfg.link.lib_flag_prefix, lib)),
    );
    if is_unix_like() && !cfg.link.static_libs.is_empty() {
        args.push("-Wl,-Bstatic".to_string());
        args.extend(cfg.link.static_libs.iter().map(|lib| format!("-l{}", lib)));
        args.push("-Wl,-Bdynamic".to_string());
    }

    let mut recipe_lines = vec![args.join(" ")];

    // `-main`-suffixed executables are renamed once linked; the target path
    // was computed and cached on the job when its output slot was set.
    if let Some(renamed_relpath) = rename_to {
        let renamed_abs = planner.out_root.join(renamed_relpath);
        recipe_lines.push(format!("mv {} {}", output_abs.display(), renamed_abs.display()));
    }

    Ok(Rule {
        outputs: vec![output_abs],
        dependencies,
        recipe_lines,
        action: job_kind.action(),
    })
}

pub fn build_rule(planner: &mut Planner, cfg: &Cfg, job: &JobRef) -> Result<Rule> {
    let job_kind = job.borrow().job_kind;
    match job_kind {
        JobKind::Compile => build_compile_rule(planner, cfg, job),
        JobKind::LinkExe | JobKind::LinkSo => build_link_rule(planner, cfg, job),
    }
}

/// Render a whole wave into Make syntax: the all-rule, then each job's rule,
/// separated by blank lines, plus an optional progress preamble.
pub fn render_wave(planner: &mut Planner, cfg: &Cfg, jobs: &[JobRef], show_progress: bool) -> Result<String> {
    let mut rules = Vec::with_capacity(jobs.len());
    for job in jobs {
        rules.push(build_rule(planner, cfg, job)?);
    }

    let all_target = if cfg.make.all_pseudo_target.is_empty() {
        "all"
    } else {
        &cfg.make.all_pseudo_target
    };
    let all_deps: BTreeSet<PathBuf> = rules.iter().flat_map(|r| r.outputs.iter().cloned()).collect();
    // The all-rule's progress action mirrors the last job's, matching the
    // original's `all_rule.recipe_action = rule.recipe_action` overwrite
    // inside the per-rule loop — it ends up holding whichever action was
    // processed last.
    let all_action = rules.last().map(|r| r.action).unwrap_or("Building");
    let all_rule = Rule {
        outputs: vec![PathBuf::from(all_target)],
        dependencies: all_deps,
        recipe_lines: Vec::new(),
        action: all_action,
    };

    let mut script = String::new();
    if show_progress {
        script.push_str(&progress_preamble(all_target));
    }
    script.push_str(&all_rule.render(show_progress));
    script.push('\n');
    for rule in &rules {
        script.push_str(&rule.render(show_progress));
        script.push('\n');
    }
    Ok(script)
}

/// `SHOW_PROGRESS` as a self-counting make macro: `T` is the total step
/// count for *this* script, obtained by a dry-run recursive make invocation
/// that counts how many recipe lines would invoke the progress macro; `C`
/// accumulates by appending to `N` on every expansion and counting its
/// words. Ported from the original's own `ifndef SHOW_PROGRESS` preamble
/// rather than approximated with a shell counter, since a Rust-side step
/// count would only see the current wave, not what `make` actually runs.
fn progress_preamble(all_target: &str) -> String {
    format!(
        "ifndef SHOW_PROGRESS\n\
         T := $(shell $(MAKE) {target} --no-print-directory -nrRf $(firstword $(MAKEFILE_LIST)) SHOW_PROGRESS=\"PROGRESS_IND\" | grep -c \"PROGRESS_IND\")\n\
         N := x\n\
         C = $(words $N)$(eval N := x $N)\n\
         SHOW_PROGRESS = printf '[%3d%%] %s %s\\n' `expr $C '*' 100 / $T`\n\
         endif\n\n",
        target = all_target
    )
}
