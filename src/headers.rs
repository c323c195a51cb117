//! Header scanner and cache (C4): `headers(source)` returns the ordered list
//! of header specs a C/C++ source transitively includes, backed by a
//! side-car cache file so repeat runs skip invoking the compiler.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::CcConfig;
use crate::error::{IbError, Result};
use crate::spec::Spec;

fn cache_path(out_root: &Path, relpath: &Path) -> PathBuf {
    let mut name = relpath.as_os_str().to_os_string();
    name.push(".ib_hdrs");
    out_root.join(name)
}

/// Read the side-car cache for a source at `relpath`. Any failure — missing
/// file, I/O error, or a line that no longer maps to a valid spec —
/// invalidates the whole cache; the caller falls back to live discovery.
fn read_cache(out_root: &Path, relpath: &Path) -> Option<Vec<Spec>> {
    let path = cache_path(out_root, relpath);
    let content = std::fs::read_to_string(&path).ok()?;
    let mut specs = Vec::new();
    for line in content.lines() {
        if line.is_empty() {
            continue;
        }
        match Spec::from_relpath(Path::new(line)) {
            Ok(spec) => specs.push(spec),
            Err(_) => return None,
        }
    }
    Some(specs)
}

/// Persist the header list. Writes to a sibling temp file and renames into
/// place so a crash mid-write can never leave a cache that parses as valid
/// but wrong; it will simply fail to parse and fall back to live discovery.
/// Write failures are logged and otherwise ignored (they are not fatal).
fn write_cache(out_root: &Path, relpath: &Path, specs: &[Spec]) {
    let path = cache_path(out_root, relpath);
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut body = String::new();
        for spec in specs {
            body.push_str(&spec.relpath().to_string_lossy());
            body.push('\n');
        }
        let tmp = path.with_extension("ib_hdrs.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    })();
    if let Err(e) = result {
        tracing::warn!("failed to write header cache {}: {}", path.display(), e);
    }
}

/// Convert an absolute path reported by the compiler into a spec, relative
/// to whichever of `src_root`/`out_root` contains it. Paths outside both are
/// dropped.
fn path_to_spec(src_root: &Path, out_root: &Path, path: &Path) -> Option<Spec> {
    let relpath = path
        .strip_prefix(src_root)
        .or_else(|_| path.strip_prefix(out_root))
        .ok()?;
    Spec::from_relpath(relpath).ok()
}

/// Parse compiler dependency output (`target: dep1 dep2 \\\n dep3 ...`) into
/// the list of dependency tokens, with the source path itself removed.
/// Defensively matches the known source token rather than blindly dropping
/// the first one, since a reordered line would otherwise silently lose the
/// first real dependency.
fn parse_dep_tokens(output: &str, source_abs: &Path) -> Vec<String> {
    let body = match output.find(':') {
        Some(idx) => &output[idx + 1..],
        None => output,
    };
    let flattened = body.replace('\\', " ");
    let mut tokens: Vec<String> = flattened.split_whitespace().map(str::to_string).collect();

    let source_str = source_abs.to_string_lossy();
    if let Some(pos) = tokens.iter().position(|t| t == source_str.as_ref() || source_abs.ends_with(t.as_str())) {
        tokens.remove(pos);
    } else if !tokens.is_empty() {
        tracing::debug!(
            "compiler dependency output for {} did not lead with the source token, dropping first token blindly",
            source_abs.display()
        );
        tokens.remove(0);
    }
    tokens
}

fn discover_live(src_root: &Path, out_root: &Path, cc: &CcConfig, source_abs: &Path) -> Result<Vec<Spec>> {
    let mut cmd = Command::new(if cc.tool.is_empty() { "cc" } else { &cc.tool });
    cmd.arg(format!("-I{}", src_root.display()));
    cmd.arg(format!("-I{}", out_root.display()));
    for dir in &cc.incl_dirs {
        cmd.arg(format!("-I{}", dir));
    }
    let hdrs_flags: &[String] = if cc.hdrs_flags.is_empty() {
        &[]
    } else {
        &cc.hdrs_flags
    };
    if hdrs_flags.is_empty() {
        cmd.args(["-MM", "-MG"]);
    } else {
        cmd.args(hdrs_flags);
    }
    cmd.arg(source_abs);

    let output = cmd.output().map_err(|e| IbError::Tool {
        command: format!("{:?}", cmd),
        status: None,
        stdout: String::new(),
        stderr: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(IbError::Tool {
            command: format!("{:?}", cmd),
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let tokens = parse_dep_tokens(&stdout, source_abs);
    let specs = tokens
        .iter()
        .filter_map(|tok| path_to_spec(src_root, out_root, Path::new(tok)))
        .collect();
    Ok(specs)
}

/// `headers(source)` per C4: cache-first, falling back to invoking the
/// configured compiler in header-listing mode.
pub fn headers(src_root: &Path, out_root: &Path, cc: &CcConfig, source_abs: &Path) -> Result<Vec<Spec>> {
    let relpath = source_abs
        .strip_prefix(src_root)
        .map_err(|_| crate::error::outside_roots(&source_abs.to_path_buf()))?;

    if let Some(cached) = read_cache(out_root, relpath) {
        return Ok(cached);
    }

    let specs = discover_live(src_root, out_root, cc, source_abs)?;
    write_cache(out_root, relpath, &specs);
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dep_tokens_strips_target_and_source() {
        let tokens = parse_dep_tokens(
            "out/examples/hello.o: examples/hello.cc examples/hello_world/hello.h",
            Path::new("examples/hello.cc"),
        );
        assert_eq!(tokens, vec!["examples/hello_world/hello.h"]);
    }

    #[test]
    fn parse_dep_tokens_handles_line_continuations() {
        let tokens = parse_dep_tokens(
            "out/x.o: x.cc \\\n  a.h \\\n  b.h",
            Path::new("x.cc"),
        );
        assert_eq!(tokens, vec!["a.h", "b.h"]);
    }

    #[test]
    fn cache_round_trips() {
        let dir = std::env::temp_dir().join(format!("ib_hdrs_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let relpath = Path::new("examples/hello.cc");
        let specs = vec![Spec::new("examples/hello_world", "hello", ".h")];
        write_cache(&dir, relpath, &specs);
        let read_back = read_cache(&dir, relpath).unwrap();
        assert_eq!(read_back, specs);
        std::fs::remove_dir_all(&dir).ok();
    }
}
