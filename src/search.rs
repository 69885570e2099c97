use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use nix::unistd::{self, AccessFlags};
use tracing::trace;

const PATH_KEY: &str = "PATH";

fn is_executable(path: &Path) -> bool {
	unistd::access(path, AccessFlags::X_OK).is_ok() && !path.is_dir()
}

/// Resolves `name` against the current `PATH`.
pub fn resolve(name: &str) -> Option<PathBuf> {
	resolve_in(name, env::var_os(PATH_KEY).as_deref())
}

/// Resolves `name` against `path_value`, a colon-separated directory list.
///
/// A name containing `/` is checked as given and never searched for. Otherwise
/// the directories are scanned left to right and the first executable
/// `<dir>/<name>` wins. An empty entry stands for the current directory.
pub fn resolve_in(name: &str, path_value: Option<&OsStr>) -> Option<PathBuf> {
	if name.is_empty() {
		return None;
	}
	if name.contains('/') {
		let path = PathBuf::from(name);
		return if is_executable(&path) { Some(path) } else { None };
	}
	for dir in env::split_paths(path_value?) {
		let candidate = dir.join(name);
		trace!(candidate = %candidate.display(), "checking");
		if is_executable(&candidate) {
			return Some(candidate);
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::ffi::OsString;
	use std::fs;
	use std::os::unix::fs::PermissionsExt;

	fn touch(dir: &Path, name: &str, mode: u32) -> PathBuf {
		let path = dir.join(name);
		fs::write(&path, b"#!/bin/sh\n").unwrap();
		fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
		path
	}

	fn join(dirs: &[&Path]) -> OsString {
		env::join_paths(dirs).unwrap()
	}

	#[test]
	fn later_directory_found_when_earlier_lacks_it() {
		let usr_bin = tempfile::tempdir().unwrap();
		let bin = tempfile::tempdir().unwrap();
		let expected = touch(bin.path(), "only-in-bin", 0o755);
		let path = join(&[usr_bin.path(), bin.path()]);
		assert_eq!(resolve_in("only-in-bin", Some(path.as_os_str())), Some(expected));
	}

	#[test]
	fn first_match_wins() {
		let first = tempfile::tempdir().unwrap();
		let second = tempfile::tempdir().unwrap();
		let expected = touch(first.path(), "tool", 0o755);
		touch(second.path(), "tool", 0o755);
		let path = join(&[first.path(), second.path()]);
		assert_eq!(resolve_in("tool", Some(path.as_os_str())), Some(expected));
	}

	#[test]
	fn non_executable_is_skipped() {
		let first = tempfile::tempdir().unwrap();
		let second = tempfile::tempdir().unwrap();
		touch(first.path(), "tool", 0o644);
		let expected = touch(second.path(), "tool", 0o755);
		let path = join(&[first.path(), second.path()]);
		assert_eq!(resolve_in("tool", Some(path.as_os_str())), Some(expected));
	}

	#[test]
	fn directories_are_not_executables() {
		let dir = tempfile::tempdir().unwrap();
		fs::create_dir(dir.path().join("sub")).unwrap();
		let path = join(&[dir.path()]);
		assert_eq!(resolve_in("sub", Some(path.as_os_str())), None);
	}

	#[test]
	fn missing_path_or_command() {
		let dir = tempfile::tempdir().unwrap();
		let path = join(&[dir.path()]);
		assert_eq!(resolve_in("nope", Some(path.as_os_str())), None);
		assert_eq!(resolve_in("nope", None), None);
		assert_eq!(resolve_in("", Some(path.as_os_str())), None);
	}

	#[test]
	fn explicit_path_skips_search() {
		let dir = tempfile::tempdir().unwrap();
		let exe = touch(dir.path(), "run", 0o755);
		let name = exe.to_str().unwrap();
		assert_eq!(resolve_in(name, None), Some(exe.clone()));

		let other = tempfile::tempdir().unwrap();
		touch(other.path(), "run", 0o755);
		let missing = dir.path().join("sub/run");
		let path = join(&[other.path()]);
		assert_eq!(resolve_in(missing.to_str().unwrap(), Some(path.as_os_str())), None);
	}

	#[test]
	fn resolution_is_repeatable() {
		let dir = tempfile::tempdir().unwrap();
		touch(dir.path(), "again", 0o755);
		let path = join(&[dir.path()]);
		let a = resolve_in("again", Some(path.as_os_str()));
		let b = resolve_in("again", Some(path.as_os_str()));
		assert!(a.is_some());
		assert_eq!(a, b);
	}
}
