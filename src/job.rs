//! Job kinds and the producer registry (C2). A job is identified by
//! `(job_kind, input)`; producers are the only way the planner discovers
//! jobs from a desired output spec.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{IbError, Result};
use crate::spec::{Kind, Spec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Compile,
    LinkExe,
    LinkSo,
}

impl JobKind {
    pub fn input_kind(self) -> Kind {
        match self {
            JobKind::Compile => Kind::CppSource,
            JobKind::LinkExe | JobKind::LinkSo => Kind::Object,
        }
    }

    /// This job kind's single output slot: its name and the kind it produces.
    pub fn slot(self) -> (&'static str, Kind) {
        match self {
            JobKind::Compile => ("obj", Kind::Object),
            JobKind::LinkExe => ("exe", Kind::Executable),
            JobKind::LinkSo => ("so", Kind::SharedLibrary),
        }
    }

    pub fn action(self) -> &'static str {
        match self {
            JobKind::Compile => "Compiling",
            JobKind::LinkExe | JobKind::LinkSo => "Linking",
        }
    }
}

pub struct Producer {
    pub slot: &'static str,
    pub job_kind: JobKind,
}

/// Static table: output kind -> producers that can build it. Built once,
/// by hand, rather than discovered by reflection.
pub fn producers_for(kind: Kind) -> Vec<Producer> {
    [JobKind::Compile, JobKind::LinkExe, JobKind::LinkSo]
        .iter()
        .filter_map(|&jk| {
            let (slot, out_kind) = jk.slot();
            if out_kind == kind {
                Some(Producer { slot, job_kind: jk })
            } else {
                None
            }
        })
        .collect()
}

/// A job's mutable state: the default output is derived from the input's
/// (branch, atom) and the slot's default extension; an explicit override is
/// allowed once (I4) — re-setting a different spec is a hard error.
#[derive(Debug)]
pub struct JobState {
    pub job_kind: JobKind,
    pub input: Spec,
    explicit: RefCell<HashMap<&'static str, Spec>>,
    rename_to: RefCell<Option<Option<PathBuf>>>,
}

impl JobState {
    pub fn new(job_kind: JobKind, input: Spec) -> Self {
        JobState {
            job_kind,
            input,
            explicit: RefCell::new(HashMap::new()),
            rename_to: RefCell::new(None),
        }
    }

    /// The output spec for this job's slot, explicit override if present,
    /// else the default derived from the input's (branch, atom).
    pub fn output(&self) -> Spec {
        let (slot, kind) = self.job_kind.slot();
        if let Some(spec) = self.explicit.borrow().get(slot) {
            return spec.clone();
        }
        Spec::new(self.input.branch.clone(), self.input.atom.clone(), kind.default_ext())
    }

    /// Set an explicit output spec for `slot`. Idempotent when the spec is
    /// unchanged (P5); an error when it would overwrite a different spec.
    pub fn set_output(&self, slot: &'static str, spec: Spec) -> Result<()> {
        let mut explicit = self.explicit.borrow_mut();
        match explicit.get(slot) {
            Some(existing) if *existing == spec => Ok(()),
            Some(existing) => Err(IbError::Slot(format!(
                "slot {:?} already bound to {:?}, cannot rebind to {:?}",
                slot,
                existing.relpath(),
                spec.relpath()
            ))),
            None => {
                explicit.insert(slot, spec);
                Ok(())
            }
        }
    }

    /// The relative path a `-main`-suffixed executable output is renamed to
    /// once linked, or `None` for any other job. Computed from the output
    /// spec the first time it's asked for and cached from then on, rather
    /// than re-deriving the suffix at every script-emission call.
    pub fn rename_to(&self) -> Option<PathBuf> {
        if let Some(cached) = self.rename_to.borrow().clone() {
            return cached;
        }
        let computed = if matches!(self.job_kind, JobKind::LinkExe) {
            let relpath = self.output().relpath();
            relpath
                .to_str()
                .and_then(|s| s.strip_suffix("-main"))
                .map(PathBuf::from)
        } else {
            None
        };
        *self.rename_to.borrow_mut() = Some(computed.clone());
        computed
    }
}
