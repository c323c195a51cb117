//! Canonical identity of a file-like artifact: a `(branch, atom, ext)` triple
//! tagged with a [`Kind`]. Specs are value objects — equality and hashing use
//! all three fields, even though `ext` redundantly determines `kind`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{IbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    CppSource,
    Header,
    Object,
    Executable,
    SharedLibrary,
}

impl Kind {
    pub fn default_ext(self) -> &'static str {
        match self {
            Kind::CppSource => ".cc",
            Kind::Header => ".h",
            Kind::Object => ".o",
            Kind::Executable => "",
            Kind::SharedLibrary => ".so",
        }
    }
}

struct KindDescriptor {
    kind: Kind,
    default_ext: &'static str,
    other_exts: &'static [&'static str],
}

const KINDS: &[KindDescriptor] = &[
    KindDescriptor {
        kind: Kind::CppSource,
        default_ext: ".cc",
        other_exts: &[".c", ".cpp", ".cxx"],
    },
    KindDescriptor {
        kind: Kind::Header,
        default_ext: ".h",
        other_exts: &[".hpp", ".hh", ".hxx", ".inl"],
    },
    KindDescriptor {
        kind: Kind::Object,
        default_ext: ".o",
        other_exts: &[],
    },
    KindDescriptor {
        kind: Kind::Executable,
        default_ext: "",
        other_exts: &[".js", ".exe"],
    },
    KindDescriptor {
        kind: Kind::SharedLibrary,
        default_ext: ".so",
        other_exts: &[],
    },
];

fn ext_map() -> &'static HashMap<&'static str, Kind> {
    static MAP: OnceLock<HashMap<&'static str, Kind>> = OnceLock::new();
    MAP.get_or_init(|| {
        let mut map = HashMap::new();
        for desc in KINDS {
            for ext in std::iter::once(desc.default_ext).chain(desc.other_exts.iter().copied()) {
                if map.insert(ext, desc.kind).is_some() {
                    panic!("extension {:?} claimed by two kinds", ext);
                }
            }
        }
        map
    })
}

/// All extensions accepted for a given kind, default first.
pub fn exts_for(kind: Kind) -> impl Iterator<Item = &'static str> {
    let desc = KINDS.iter().find(|d| d.kind == kind).expect("kind in table");
    std::iter::once(desc.default_ext).chain(desc.other_exts.iter().copied())
}

pub fn kind_of(ext: &str) -> Result<Kind> {
    ext_map()
        .get(ext)
        .copied()
        .ok_or_else(|| IbError::Resolution(format!("unrecognized extension {:?}", ext)))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Spec {
    pub branch: String,
    pub atom: String,
    pub ext: String,
}

impl Spec {
    pub fn new(branch: impl Into<String>, atom: impl Into<String>, ext: impl Into<String>) -> Self {
        Spec {
            branch: branch.into(),
            atom: atom.into(),
            ext: ext.into(),
        }
    }

    pub fn kind(&self) -> Result<Kind> {
        kind_of(&self.ext)
    }

    /// Path relative to whichever root this spec lives under: `branch/atom<ext>`.
    pub fn relpath(&self) -> PathBuf {
        let file_name = format!("{}{}", self.atom, self.ext);
        if self.branch.is_empty() {
            PathBuf::from(file_name)
        } else {
            Path::new(&self.branch).join(file_name)
        }
    }

    /// Same branch/atom, swapped to `kind`'s default extension.
    pub fn with_kind(&self, kind: Kind) -> Self {
        Spec::new(self.branch.clone(), self.atom.clone(), kind.default_ext())
    }

    /// Parse a path relative to a root into a spec. Header kinds in this
    /// repo strip no prefix from the stem; the hook stays here for kinds
    /// that might need one.
    pub fn from_relpath(relpath: &Path) -> Result<Spec> {
        let file_name = relpath
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IbError::Resolution(format!("no file name in {}", relpath.display())))?;
        let branch = relpath
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (stem, ext) = split_ext(file_name);
        let kind = kind_of(&ext)?;
        let atom = strip_prefix(kind, &stem);
        Ok(Spec::new(branch, atom, ext))
    }
}

/// Split `"name.ext"` into `("name", ".ext")`. A file with no dot splits as
/// `(whole, "")`, which resolves to the executable kind's empty extension.
fn split_ext(file_name: &str) -> (String, String) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (file_name[..idx].to_string(), file_name[idx..].to_string()),
        _ => (file_name.to_string(), String::new()),
    }
}

fn strip_prefix(_kind: Kind, stem: &str) -> String {
    stem.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ext_round_trips_through_kind_of() {
        for desc in KINDS {
            assert_eq!(kind_of(desc.default_ext).unwrap(), desc.kind);
        }
    }

    #[test]
    fn unrecognized_extension_is_a_resolution_error() {
        assert!(kind_of(".zzz").is_err());
    }

    #[test]
    fn relpath_joins_branch_atom_ext() {
        let spec = Spec::new("examples", "hello", ".cc");
        assert_eq!(spec.relpath(), PathBuf::from("examples/hello.cc"));
    }

    #[test]
    fn with_kind_swaps_extension_keeping_branch_atom() {
        let spec = Spec::new("examples", "hello", ".cc");
        let obj = spec.with_kind(Kind::Object);
        assert_eq!(obj, Spec::new("examples", "hello", ".o"));
    }

    #[test]
    fn from_relpath_parses_branch_atom_ext() {
        let spec = Spec::from_relpath(Path::new("examples/hello_world/hello.h")).unwrap();
        assert_eq!(spec.branch, "examples/hello_world");
        assert_eq!(spec.atom, "hello");
        assert_eq!(spec.ext, ".h");
        assert_eq!(spec.kind().unwrap(), Kind::Header);
    }

    #[test]
    fn executable_has_empty_extension() {
        let spec = Spec::new("examples", "hello", "");
        assert_eq!(spec.kind().unwrap(), Kind::Executable);
    }
}
