//! The plan lattice (C3): for each output spec, the unique answer to "how do
//! I obtain this file" — on disk already, via a job, ambiguous, or none.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::job::JobState;
use crate::spec::Spec;

pub type JobRef = Rc<RefCell<JobState>>;

#[derive(Debug, Clone)]
pub enum Plan {
    /// The output already exists under the source root; no job produces it.
    Source(Spec),
    /// Produced by `job`, read from `slot`.
    Job { slot: &'static str, job: JobRef },
    /// Two or more doable plans collide on the same output spec.
    Ambiguous(Vec<Plan>),
    /// No producer applies and no source file exists.
    None(Spec),
}

impl Plan {
    pub fn output_spec(&self) -> Spec {
        match self {
            Plan::Source(spec) | Plan::None(spec) => spec.clone(),
            Plan::Job { job, .. } => job.borrow().output(),
            Plan::Ambiguous(candidates) => candidates[0].output_spec(),
        }
    }

    pub fn input_spec(&self) -> Option<Spec> {
        match self {
            Plan::Job { job, .. } => Some(job.borrow().input.clone()),
            _ => None,
        }
    }

    pub fn is_doable(&self) -> bool {
        matches!(self, Plan::Source(_) | Plan::Job { .. })
    }

    pub fn is_understood(&self) -> bool {
        !matches!(self, Plan::None(_))
    }

    pub fn is_ready(&self, made: &HashSet<Spec>) -> bool {
        match self {
            Plan::Source(_) => true,
            Plan::Job { job, .. } => made.contains(&job.borrow().input),
            Plan::Ambiguous(_) | Plan::None(_) => false,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Plan::Source(spec) => format!("source file {}", spec.relpath().display()),
            Plan::Job { job, .. } => {
                let job = job.borrow();
                format!(
                    "{:?} job from {}",
                    job.job_kind,
                    job.input.relpath().display()
                )
            }
            Plan::Ambiguous(candidates) => format!(
                "ambiguous: {} candidate plans",
                candidates.len()
            ),
            Plan::None(spec) => format!("no producer for {} and no source file", spec.relpath().display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;

    #[test]
    fn source_plan_is_always_ready() {
        let plan = Plan::Source(Spec::new("examples", "hello", ".cc"));
        assert!(plan.is_ready(&HashSet::new()));
        assert!(plan.is_doable());
    }

    #[test]
    fn job_plan_ready_iff_input_made() {
        let input = Spec::new("examples", "hello", ".cc");
        let job = Rc::new(RefCell::new(JobState::new(JobKind::Compile, input.clone())));
        let plan = Plan::Job { slot: "obj", job };
        assert!(!plan.is_ready(&HashSet::new()));
        let mut made = HashSet::new();
        made.insert(input);
        assert!(plan.is_ready(&made));
    }

    #[test]
    fn none_plan_is_understood_false_and_not_doable() {
        let plan = Plan::None(Spec::new("examples", "missing", ".cc"));
        assert!(!plan.is_understood());
        assert!(!plan.is_doable());
    }

    #[test]
    fn ambiguous_plan_is_understood_but_not_doable() {
        let plan = Plan::Ambiguous(vec![
            Plan::Source(Spec::new("examples", "hello", ".cc")),
        ]);
        assert!(plan.is_understood());
        assert!(!plan.is_doable());
    }
}
