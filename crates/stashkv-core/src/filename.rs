//! Record filename derivation and path containment
//!
//! Every two-part key maps to exactly one filename inside the base
//! directory:
//!
//! ```text
//! state-<part1>-<part2>-<hash>.json
//! ```
//!
//! The visible parts are sanitized for human readability and portability
//! across filesystems; the 16-hex-digit CRC-64 suffix is computed over the
//! original unsanitized parts, so keys that sanitize to the same text still
//! get distinct files. Derived names are additionally checked lexically
//! against the base directory before any I/O touches them.

use std::path::{Component, Path, PathBuf};

use crc::{Crc, CRC_64_ECMA_182};

use crate::error::{StashError, StashResult};

/// Prefix shared by record files and their staging temp files
pub(crate) const RECORD_PREFIX: &str = "state-";
/// Extension of finalized record files
pub(crate) const RECORD_EXT: &str = ".json";
/// Suffix marking an in-flight staging file
pub(crate) const TEMP_SUFFIX: &str = ".tmp";

/// Byte budget for each sanitized key part within the filename
const PART_BUDGET: usize = 50;

const KEY_CRC: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Reduce a key part to a lowercase, hyphen-separated filename fragment.
///
/// Uppercase folds to lowercase; underscores, whitespace, path separators
/// and characters reserved on common filesystems become hyphens; control
/// characters are dropped. Runs of hyphens collapse to one and the result
/// carries no leading or trailing hyphen. The fragment is capped at 50
/// bytes without ever splitting a multi-byte character.
pub fn sanitize_part(part: &str) -> String {
    // Controls are stripped before the ".." fold; a control byte sitting
    // between the dots would otherwise hide the pair from it.
    let cleaned: String = part
        .to_lowercase()
        .chars()
        .filter(|&ch| {
            let code = ch as u32;
            code > 0x1f && code != 0x7f
        })
        .collect();
    // With controls gone one pass suffices: a run of dots folds to hyphens
    // plus at most one lone dot, never a surviving "..".
    let folded = cleaned.replace("..", "-");

    let mut out = String::with_capacity(folded.len());
    for ch in folded.chars() {
        let normalized = match ch {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '-',
            '_' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        };
        if normalized == '-' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        } else {
            out.push(normalized);
        }
    }

    let truncated = truncate_on_char_boundary(&out, PART_BUDGET);
    truncated.trim_end_matches('-').to_string()
}

/// Hash the original key parts with explicit length prefixes.
///
/// The framing `{len1}:{part1}|{len2}:{part2}` keeps part boundaries
/// unambiguous, so ("ab", "c") and ("a", "bc") hash differently even
/// though their concatenations match.
pub fn key_hash(part1: &str, part2: &str) -> u64 {
    let framed = format!("{}:{}|{}:{}", part1.len(), part1, part2.len(), part2);
    KEY_CRC.checksum(framed.as_bytes())
}

/// Derive the record filename for a two-part key.
pub fn record_filename(part1: &str, part2: &str) -> String {
    format!(
        "{}{}-{}-{:016x}{}",
        RECORD_PREFIX,
        sanitize_part(part1),
        sanitize_part(part2),
        key_hash(part1, part2),
        RECORD_EXT,
    )
}

/// Staging name for an in-flight write of `record`.
pub(crate) fn temp_filename(record: &str, unique: &str) -> String {
    format!("{}.{}{}", record, unique, TEMP_SUFFIX)
}

/// True for staging files created by any stash instance in this directory.
pub(crate) fn is_temp_filename(name: &str) -> bool {
    name.starts_with(RECORD_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

/// Join `filename` onto `base` and prove the result stays inside `base`.
///
/// The check is lexical: `..` and `.` components are resolved without
/// touching the filesystem, because the target file may not exist yet.
/// `base` must already be absolute, which `Stash::open` guarantees.
pub(crate) fn resolve_under(base: &Path, filename: &str) -> StashResult<PathBuf> {
    let resolved = normalize_lexically(&base.join(filename));
    if resolved == base || !resolved.starts_with(base) {
        return Err(StashError::PathEscape {
            filename: filename.to_string(),
        });
    }
    Ok(resolved)
}

/// Resolve `.` and `..` components without consulting the filesystem.
///
/// A `..` at the root stays at the root, matching how the OS resolves
/// `/..`.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

fn truncate_on_char_boundary(s: &str, budget: usize) -> &str {
    if s.len() <= budget {
        return s;
    }
    let mut end = budget;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
