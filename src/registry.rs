//! Locally registered projects and matching them against a push
//!
//! The project list is a plain file with one project directory per line.
//! A directory is deployable when it carries two marker files written by the
//! toolkit at registration time: `.origin` (the clone URL) and `.branch`
//! (the tracked branch). The list and the markers are read fresh for every
//! request.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Split};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::HookError;
use crate::payload::NormalizedPush;

pub const ORIGIN_MARKER: &str = ".origin";
pub const BRANCH_MARKER: &str = ".branch";

/// Directory under the XDG config home where the toolkit keeps its list.
const TOOLKIT_CONFIG_DIR: &str = "projectr";
const PROJECTS_FILE_NAME: &str = "projects";
const HOME_PROJECTS_FILE: &str = ".projects";

/// Find the project list when the configuration does not pin one.
pub fn resolve_projects_file(configured: Option<&Path>) -> Result<PathBuf, HookError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }

    let home = dirs::home_dir().ok_or_else(|| {
        HookError::RegistryUnavailable("home directory could not be determined".to_string())
    })?;
    let config_home = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    Ok(projects_file_location(config_home, &home))
}

/// `<config home>/projectr/projects` if that file exists, else `~/.projects`.
/// The config home defaults to `~/.config`.
pub fn projects_file_location(config_home: Option<PathBuf>, home: &Path) -> PathBuf {
    let xdg_file = config_home
        .unwrap_or_else(|| home.join(".config"))
        .join(TOOLKIT_CONFIG_DIR)
        .join(PROJECTS_FILE_NAME);

    if xdg_file.is_file() {
        xdg_file
    } else {
        home.join(HOME_PROJECTS_FILE)
    }
}

/// Lazily yields the trimmed, non-empty lines of a project list.
///
/// Lines are paths and are taken as raw bytes, so names that are not UTF-8
/// still resolve on unix.
pub struct ProjectList {
    lines: Split<BufReader<File>>,
}

impl ProjectList {
    pub fn open(path: &Path) -> Result<Self, HookError> {
        let file = File::open(path).map_err(|e| {
            warn!("Could not open project list {}: {}", path.display(), e);
            HookError::RegistryUnavailable(path.display().to_string())
        })?;
        Ok(Self {
            lines: BufReader::new(file).split(b'\n'),
        })
    }
}

impl Iterator for ProjectList {
    type Item = io::Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    let trimmed = line.trim_ascii();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Some(path) = path_from_bytes(trimmed) {
                        return Some(Ok(path));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStrExt;
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    match std::str::from_utf8(bytes) {
        Ok(line) => Some(PathBuf::from(line)),
        Err(_) => {
            warn!(
                "Skipping project list entry that is not valid UTF-8: {}",
                String::from_utf8_lossy(bytes)
            );
            None
        }
    }
}

/// A registered project directory with both marker files present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEntry {
    pub path: PathBuf,
    pub origin: String,
    pub tracked_branch: String,
}

impl ProjectEntry {
    /// Reads the marker files. Directories without both are not deployable
    /// and give `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let origin_file = path.join(ORIGIN_MARKER);
        let branch_file = path.join(BRANCH_MARKER);
        if !origin_file.is_file() || !branch_file.is_file() {
            debug!("Skipping {}: no marker files", path.display());
            return None;
        }

        let read_marker = |file: &Path| match fs::read_to_string(file) {
            Ok(contents) => Some(contents.trim().to_string()),
            Err(e) => {
                warn!("Could not read {}: {}", file.display(), e);
                None
            }
        };

        Some(Self {
            path: path.to_path_buf(),
            origin: read_marker(&origin_file)?,
            tracked_branch: read_marker(&branch_file)?,
        })
    }

    /// Exact string comparison on both keys, no URL normalization.
    pub fn matches(&self, push: &NormalizedPush) -> bool {
        self.origin == push.clone_url && self.tracked_branch == push.branch
    }
}

/// Every deployable entry whose origin and branch match the push, in list order.
pub fn find_matching_projects<I>(
    candidates: I,
    push: &NormalizedPush,
) -> Result<Vec<ProjectEntry>, HookError>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut matches = Vec::new();
    for candidate in candidates {
        let path = candidate.map_err(|e| {
            warn!("Failed to read project list: {}", e);
            HookError::RegistryUnavailable("project list could not be read".to_string())
        })?;
        if let Some(entry) = ProjectEntry::load(&path) {
            if entry.matches(push) {
                matches.push(entry);
            }
        }
    }
    Ok(matches)
}

/// Open the list at `projects_file` and match every line against `push`.
pub fn scan_registry(
    projects_file: &Path,
    push: &NormalizedPush,
) -> Result<Vec<ProjectEntry>, HookError> {
    let projects = ProjectList::open(projects_file)?;
    find_matching_projects(projects, push)
}
