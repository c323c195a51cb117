//! The planner (C5): converts target strings to specs, resolves plans (C3)
//! memoized by value, and generates successive waves of ready jobs under the
//! implication relation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::CcConfig;
use crate::error::{IbError, Result};
use crate::headers;
use crate::job::{producers_for, JobKind, JobState};
use crate::plan::{JobRef, Plan};
use crate::spec::{exts_for, Kind, Spec};

pub struct Planner {
    pub src_root: PathBuf,
    pub out_root: PathBuf,
    pub branch: String,
    pub cc: CcConfig,
    jobs: HashMap<(JobKind, Spec), JobRef>,
    plans: HashMap<Spec, Plan>,
    header_cache: HashMap<PathBuf, Vec<Spec>>,
    made: HashSet<Spec>,
}

impl Planner {
    pub fn new(src_root: PathBuf, out_root: PathBuf, branch: String, cc: CcConfig) -> Self {
        Planner {
            src_root,
            out_root,
            branch,
            cc,
            jobs: HashMap::new(),
            plans: HashMap::new(),
            header_cache: HashMap::new(),
            made: HashSet::new(),
        }
    }

    /// `/`-prefixed targets are rooted at src_root; relative targets are
    /// rooted at this planner's branch.
    pub fn convert_target(&self, target: &str) -> Result<Spec> {
        let relpath = if let Some(stripped) = target.strip_prefix('/') {
            PathBuf::from(stripped)
        } else if self.branch.is_empty() {
            PathBuf::from(target)
        } else {
            Path::new(&self.branch).join(target)
        };
        Spec::from_relpath(&relpath)
    }

    pub fn get_job(&mut self, job_kind: JobKind, input: Spec) -> JobRef {
        self.jobs
            .entry((job_kind, input.clone()))
            .or_insert_with(|| std::rc::Rc::new(std::cell::RefCell::new(JobState::new(job_kind, input))))
            .clone()
    }

    /// `get-plan` per §4.3: memoized, recursive over shrinking input specs.
    pub fn get_plan(&mut self, output: &Spec) -> Result<Plan> {
        if let Some(plan) = self.plans.get(output) {
            return Ok(plan.clone());
        }

        let mut candidates = Vec::new();
        if self.src_root.join(output.relpath()).exists() {
            candidates.push(Plan::Source(output.clone()));
        }

        let kind = output.kind()?;
        for producer in producers_for(kind) {
            for ext in exts_for(producer.job_kind.input_kind()) {
                let input_spec = Spec::new(output.branch.clone(), output.atom.clone(), ext);
                let job = self.get_job(producer.job_kind, input_spec.clone());
                let input_plan = self.get_plan(&input_spec)?;
                if input_plan.is_understood() {
                    job.borrow().set_output(producer.slot, output.clone())?;
                    candidates.push(Plan::Job {
                        slot: producer.slot,
                        job,
                    });
                }
            }
        }

        let plan = match candidates.len() {
            0 => Plan::None(output.clone()),
            1 => candidates.into_iter().next().unwrap(),
            _ => Plan::Ambiguous(candidates),
        };
        self.plans.insert(output.clone(), plan.clone());
        Ok(plan)
    }

    /// Headers transitively included from an absolute source path,
    /// cache-first (C4). Memoized per planner instance as well as on disk.
    pub fn headers(&mut self, source_abs: &Path) -> Result<Vec<Spec>> {
        if let Some(cached) = self.header_cache.get(source_abs) {
            return Ok(cached.clone());
        }
        let found = headers::headers(&self.src_root, &self.out_root, &self.cc, source_abs)?;
        self.header_cache.insert(source_abs.to_path_buf(), found.clone());
        Ok(found)
    }

    /// Implied specs: a C++ source implies the object file of every header
    /// it transitively includes, one level at a time (the object at the
    /// header's own branch/atom), so long as that object's plan is doable.
    /// This is what actually pulls a same-atom translation unit like
    /// `follow_headers.cc` into a link by way of `follow_headers.h` being
    /// included from the requested source — the source's own header list
    /// is what's scanned, not the header spec in isolation.
    fn implied_specs(&mut self, plan: &Plan) -> Result<Vec<Spec>> {
        let output = plan.output_spec();
        if output.kind()? != Kind::CppSource {
            return Ok(Vec::new());
        }
        let abspath = self.src_root.join(output.relpath());
        if !abspath.exists() {
            return Ok(Vec::new());
        }
        let mut implied = Vec::new();
        for hdr in self.headers(&abspath)? {
            let object_spec = hdr.with_kind(Kind::Object);
            let object_plan = self.get_plan(&object_spec)?;
            if object_plan.is_doable() {
                implied.push(object_spec);
            }
        }
        Ok(implied)
    }

    /// The transitive closure of doable-plan outputs reachable from `start`
    /// by walking each plan's implied specs and then its job input, filtered
    /// to object-kind outputs. This is what a link rule depends on: the
    /// primary object plus every same-atom object pulled in transitively by
    /// headers included along the way (S5).
    pub fn transitive_objects(&mut self, start: &Spec) -> Result<Vec<Spec>> {
        let mut visited = HashSet::new();
        let mut objects = Vec::new();
        self.extend_plans(start, &mut visited, &mut objects)?;
        Ok(objects)
    }

    fn extend_plans(&mut self, spec: &Spec, visited: &mut HashSet<Spec>, objects: &mut Vec<Spec>) -> Result<()> {
        if !visited.insert(spec.clone()) {
            return Ok(());
        }
        let plan = self.get_plan(spec)?;
        if spec.kind()? == Kind::Object {
            objects.push(spec.clone());
        }
        for implied in self.implied_specs(&plan)? {
            self.extend_plans(&implied, visited, objects)?;
        }
        if let Some(input) = plan.input_spec() {
            self.extend_plans(&input, visited, objects)?;
        }
        Ok(())
    }

    /// Compile jobs need their source's headers resolved before the job can
    /// be serialized into a script rule.
    pub fn transitive_headers(&mut self, source_abs: &Path) -> Result<Vec<Spec>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut frontier = vec![source_abs.to_path_buf()];
        while let Some(src) = frontier.pop() {
            for hdr in self.headers(&src)? {
                if seen.insert(hdr.clone()) {
                    let hdr_abs = self.src_root.join(hdr.relpath());
                    if hdr_abs.exists() {
                        frontier.push(hdr_abs);
                    }
                    out.push(hdr);
                }
            }
        }
        Ok(out)
    }

    pub fn yield_waves<'a>(&'a mut self, initial: &[Spec]) -> Result<WaveIter<'a>> {
        for spec in initial {
            let plan = self.get_plan(spec)?;
            if !plan.is_doable() {
                return Err(IbError::plan(spec.relpath().display().to_string(), plan.description()));
            }
        }
        Ok(WaveIter {
            planner: self,
            old: HashSet::new(),
            pending: initial.to_vec(),
            finished: false,
        })
    }
}

pub struct WaveIter<'a> {
    planner: &'a mut Planner,
    old: HashSet<Spec>,
    pending: Vec<Spec>,
    finished: bool,
}

enum RoundOutcome {
    Wave(Vec<JobRef>),
    EmptyWave,
    Done,
}

impl<'a> WaveIter<'a> {
    fn run_round(&mut self) -> Result<RoundOutcome> {
        let mut frontier: Vec<Spec> = std::mem::take(&mut self.pending);
        let mut ready: Vec<Spec> = Vec::new();
        let mut unready: Vec<Spec> = Vec::new();

        while !frontier.is_empty() {
            let mut next_frontier: HashSet<Spec> = HashSet::new();
            for s in frontier.drain(..) {
                let plan = self.planner.get_plan(&s)?;
                if let Some(input) = plan.input_spec() {
                    if !self.old.contains(&input) {
                        next_frontier.insert(input);
                    }
                }
                if plan.is_ready(&self.planner.made) {
                    if !ready.contains(&s) {
                        ready.push(s.clone());
                    }
                    for implied in self.planner.implied_specs(&plan)? {
                        if !self.old.contains(&implied) {
                            next_frontier.insert(implied);
                        }
                    }
                } else if !unready.contains(&s) {
                    unready.push(s.clone());
                }
                self.old.insert(s);
            }
            frontier = next_frontier.into_iter().collect();
        }

        if ready.is_empty() {
            if unready.is_empty() {
                return Ok(RoundOutcome::Done);
            }
            let relpaths = unready.iter().map(|s| s.relpath().display().to_string()).collect();
            return Err(IbError::NoProgress(relpaths));
        }

        let mut jobs = Vec::new();
        for s in &ready {
            if let Plan::Job { job, .. } = self.planner.get_plan(s)? {
                jobs.push(job);
            }
        }
        self.planner.made.extend(ready);
        self.pending = unready;

        if jobs.is_empty() {
            Ok(RoundOutcome::EmptyWave)
        } else {
            // Sort by output relpath for deterministic script emission (§4.5 tie-breaking).
            jobs.sort_by(|a, b| a.borrow().output().relpath().cmp(&b.borrow().output().relpath()));
            Ok(RoundOutcome::Wave(jobs))
        }
    }
}

impl<'a> Iterator for WaveIter<'a> {
    type Item = Result<Vec<JobRef>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.run_round() {
                Ok(RoundOutcome::Wave(jobs)) => return Some(Ok(jobs)),
                Ok(RoundOutcome::EmptyWave) => continue,
                Ok(RoundOutcome::Done) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("out");
        std::fs::create_dir_all(src.join("examples/hello_world")).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(src.join("examples/basic.c"), "int main() { return 0; }\n").unwrap();
        std::fs::write(src.join("examples/hello.cc"), "#include \"hello_world/hello.h\"\nint main() {}\n").unwrap();
        std::fs::write(src.join("examples/hello_world/hello.h"), "void hello();\n").unwrap();
        std::fs::write(src.join("examples/hello_world/hello.cc"), "void hello() {}\n").unwrap();
        std::fs::write(src.join("examples/hello_world/world.h"), "void world();\n").unwrap();
        std::fs::write(src.join("examples/hello_world/world.cc"), "void world() {}\n").unwrap();
        std::fs::write(src.join("examples/hello_world/follow_headers.h"), "void fh();\n").unwrap();
        std::fs::write(src.join("examples/hello_world/follow_headers.cc"), "void fh() {}\n").unwrap();
        (dir, src, out)
    }

    #[test]
    fn convert_target_absolute_and_relative_agree() {
        let (_dir, src, out) = make_fixture();
        let planner = Planner::new(src, out, String::new(), CcConfig::default());
        let by_relative = planner.convert_target("examples/hello").unwrap();
        let by_absolute = planner.convert_target("/examples/hello").unwrap();
        assert_eq!(by_relative, by_absolute);
        assert_eq!(by_relative.kind().unwrap(), Kind::Executable);
    }

    #[test]
    fn convert_target_so_suffix_is_shared_library() {
        let (_dir, src, out) = make_fixture();
        let planner = Planner::new(src, out, String::new(), CcConfig::default());
        let spec = planner.convert_target("/examples/hello.so").unwrap();
        assert_eq!(spec, Spec::new("examples", "hello", ".so"));
        assert_eq!(spec.kind().unwrap(), Kind::SharedLibrary);
    }

    #[test]
    fn source_spec_resolves_to_source_plan() {
        let (_dir, src, out) = make_fixture();
        let mut planner = Planner::new(src, out, String::new(), CcConfig::default());
        let spec = Spec::new("examples", "basic", ".c");
        let plan = planner.get_plan(&spec).unwrap();
        assert!(matches!(plan, Plan::Source(_)));
    }

    #[test]
    fn executable_with_no_object_resolves_to_none() {
        let (_dir, src, out) = make_fixture();
        let mut planner = Planner::new(src, out, String::new(), CcConfig::default());
        let spec = Spec::new("examples", "nonexistent", "");
        let plan = planner.get_plan(&spec).unwrap();
        assert!(matches!(plan, Plan::None(_)));
    }
}
