use std::{
    borrow::Cow,
    fs::Metadata,
    path::{Component, MAIN_SEPARATOR, Path, PathBuf},
};

use tokio::fs;
use tracing::debug;

use crate::{error::ShareError, policy::EntryKind};

/// Longest character reference name we try to decode, `&` and `;` excluded.
const MAX_ENTITY_LEN: usize = 10;

/// A request path that has been joined onto the share root and verified to lie
/// inside it. The only way to build one is [`ResolvedPath::new`], which runs the
/// containment check, so holding a value means the invariant holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: String,
}

impl ResolvedPath {
    pub fn new(root: &Path, absolute: PathBuf) -> Result<Self, ShareError> {
        if !is_contained(root, &absolute) {
            return Err(ShareError::Unauthorized("path escapes root"));
        }

        let rest = absolute
            .strip_prefix(root)
            .map_err(|_| ShareError::Unauthorized("path escapes root"))?;
        let relative = rest
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        Ok(Self { absolute, relative })
    }

    /// Filesystem location. Never sent to clients.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Root-stripped, `/`-separated form. Empty for the root itself.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Number of segments below the root: 0 for the root, 1 for its direct children.
    pub fn depth(&self) -> usize {
        if self.relative.is_empty() {
            0
        } else {
            self.relative.split('/').count()
        }
    }
}

/// An existing entry found behind a [`ResolvedPath`], after following links.
#[derive(Debug)]
pub struct Located {
    pub path: ResolvedPath,
    pub kind: EntryKind,
    pub metadata: Metadata,
}

/// Turns the raw request path into a [`ResolvedPath`] under `root`.
pub fn resolve_request_path(root: &Path, raw: &str) -> Result<ResolvedPath, ShareError> {
    let decoded = decode_request_path(raw)?;
    let candidate = join_under_root(root, &decoded)?;
    ResolvedPath::new(root, candidate)
}

/// Strips one leading `/`, unescapes HTML character references and percent-decodes
/// what is left. Malformed escapes, non UTF-8 results and NUL bytes are rejected.
pub fn decode_request_path(raw: &str) -> Result<String, ShareError> {
    let raw = raw.strip_prefix('/').unwrap_or(raw);
    let unescaped = unescape_html_entities(raw);
    validate_percent_escapes(&unescaped)?;

    let decoded = urlencoding::decode(&unescaped)
        .map_err(|_| ShareError::InvalidPath("decoded path is not valid utf-8"))?;
    if decoded.contains('\0') {
        return Err(ShareError::InvalidPath("path contains a nul byte"));
    }

    Ok(decoded.into_owned())
}

/// Lexically joins `relative` onto `root`. `..` may climb above the root here;
/// the containment check in [`ResolvedPath::new`] is what rejects it.
pub fn join_under_root(root: &Path, relative: &str) -> Result<PathBuf, ShareError> {
    let mut joined = root.to_path_buf();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                joined.pop();
            }
            Component::Prefix(_) => {
                return Err(ShareError::InvalidPath("path prefixes are not allowed"));
            }
        }
    }

    Ok(joined)
}

/// True when `candidate` is `root` or lies below it on a separator boundary.
/// `/data` contains `/data/x` but not `/data-secret` or `/data2/x`.
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    let (Some(root), Some(candidate)) = (root.to_str(), candidate.to_str()) else {
        return false;
    };
    if candidate == root {
        return true;
    }

    if root.ends_with(MAIN_SEPARATOR) {
        candidate.starts_with(root)
    } else {
        candidate
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with(MAIN_SEPARATOR))
    }
}

/// Follows links behind `requested` and re-checks the final target against `root`.
/// A missing entry is `NotFound`; a target outside the root or anything that is
/// neither a regular file nor a directory is `Unauthorized`.
pub async fn locate(root: &Path, requested: &ResolvedPath) -> Result<Located, ShareError> {
    let canonical = fs::canonicalize(requested.absolute())
        .await
        .map_err(|err| ShareError::NotFound(format!("{}: {err}", requested.relative())))?;

    let path = ResolvedPath::new(root, canonical)
        .map_err(|_| ShareError::Unauthorized("link target escapes root"))?;
    if path.relative() != requested.relative() {
        debug!(
            "followed /{} to /{}",
            requested.relative(),
            path.relative()
        );
    }

    let metadata = fs::metadata(path.absolute())
        .await
        .map_err(|err| ShareError::NotFound(format!("{}: {err}", path.relative())))?;
    let kind = EntryKind::from_metadata(&metadata)
        .ok_or(ShareError::Unauthorized("not a regular file or directory"))?;

    Ok(Located {
        path,
        kind,
        metadata,
    })
}

fn validate_percent_escapes(value: &str) -> Result<(), ShareError> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = bytes
                .get(i + 1..i + 3)
                .is_some_and(|digits| digits.iter().all(u8::is_ascii_hexdigit));
            if !well_formed {
                return Err(ShareError::InvalidPath("malformed percent escape"));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

fn unescape_html_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let entity = tail
            .find(';')
            .filter(|end| *end <= MAX_ENTITY_LEN)
            .and_then(|end| decode_entity(&tail[..end]).map(|c| (c, end)));
        match entity {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let hex = digits
                .strip_prefix('x')
                .or_else(|| digits.strip_prefix('X'));
            let code = match hex {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code).filter(|c| *c != '\0')
        }
    }
}
