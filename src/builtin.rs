use std::env;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use crate::global;

pub type Builtin = fn(&mut global::State, &[String], &mut dyn Write) -> u8;

const SUCCESS: u8 = 0;
const FAILURE: u8 = 1;

pub fn builtin_cd(_: &mut global::State, args: &[String], _: &mut dyn Write) -> u8 {
	let target: PathBuf = match args.first().map(String::as_str) {
		None | Some("~") => match env::var_os("HOME") {
			Some(home) => home.into(),
			None => {
				eprintln!("cd: HOME not set");
				return FAILURE;
			},
		},
		Some(dir) => dir.into(),
	};
	if let Err(e) = env::set_current_dir(&target) {
		eprintln!("cd: {}: {}", target.display(), e);
		return FAILURE;
	}
	SUCCESS
}

pub fn builtin_pwd(_: &mut global::State, _: &[String], out: &mut dyn Write) -> u8 {
	match env::current_dir() {
		Ok(cwd) => {
			let _ = out.write_all(cwd.as_os_str().as_bytes());
			let _ = out.write_all(b"\n");
			SUCCESS
		},
		Err(e) => {
			eprintln!("pwd: {}", e);
			FAILURE
		},
	}
}

/// Digits are collected from the first argument and everything else is
/// skipped, so `exit 4x2` exits with 42.
pub fn parse_exit_code(arg: &str) -> i32 {
	arg.bytes()
		.filter(u8::is_ascii_digit)
		.fold(0i32, |code, d| code.wrapping_mul(10).wrapping_add(i32::from(d - b'0')))
}

pub fn builtin_exit(state: &mut global::State, args: &[String], _: &mut dyn Write) -> u8 {
	let code = args.first().map_or(0, |arg| parse_exit_code(arg));
	state.exit_request = Some(code);
	code as u8
}

pub fn builtin_echo(_: &mut global::State, args: &[String], out: &mut dyn Write) -> u8 {
	match writeln!(out, "{}", args.join(" ")) {
		Ok(()) => SUCCESS,
		Err(e) => {
			eprintln!("echo: {}", e);
			FAILURE
		},
	}
}

pub fn builtin_env(_: &mut global::State, _: &[String], out: &mut dyn Write) -> u8 {
	for (key, value) in env::vars_os() {
		let line = [key.as_bytes(), b"=", value.as_bytes(), b"\n"].concat();
		if let Err(e) = out.write_all(&line) {
			eprintln!("env: {}", e);
			return FAILURE;
		}
	}
	SUCCESS
}

fn parse_assignment(arg: &str) -> Option<(&str, &str)> {
	let (key, value) = arg.split_once('=')?;
	if key.is_empty() || key.contains('\0') || value.contains('\0') {
		return None;
	}
	Some((key, value))
}

pub fn builtin_export(_: &mut global::State, args: &[String], _: &mut dyn Write) -> u8 {
	if args.is_empty() {
		eprintln!("export: missing argument");
		return FAILURE;
	}
	let mut assignments = Vec::with_capacity(args.len());
	for arg in args {
		match parse_assignment(arg) {
			Some(pair) => assignments.push(pair),
			None => {
				eprintln!("export: {}: invalid format (use NAME=value)", arg);
				return FAILURE;
			},
		}
	}
	for (key, value) in assignments {
		env::set_var(key, value);
	}
	SUCCESS
}

pub fn builtin_jobs(state: &mut global::State, _: &[String], out: &mut dyn Write) -> u8 {
	for (id, pid, name) in state.job_table.list() {
		if writeln!(out, "[{}]+ {} Running {}", id, pid, name).is_err() {
			return FAILURE;
		}
	}
	SUCCESS
}

pub fn match_builtin(name: &str) -> Option<Builtin> {
	match name {
		"cd" => Some(builtin_cd),
		"pwd" => Some(builtin_pwd),
		"exit" => Some(builtin_exit),
		"echo" => Some(builtin_echo),
		"env" => Some(builtin_env),
		"export" => Some(builtin_export),
		"jobs" => Some(builtin_jobs),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use nix::unistd::Pid;

	fn run(name: &str, args: &[&str], state: &mut global::State) -> (u8, String) {
		let f = match_builtin(name).unwrap();
		let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
		let mut out = vec![];
		let status = f(state, &args, &mut out);
		(status, String::from_utf8(out).unwrap())
	}

	#[test]
	fn known_names() {
		for name in &["cd", "pwd", "exit", "echo", "env", "export", "jobs"] {
			assert!(match_builtin(name).is_some(), "{}", name);
		}
		assert!(match_builtin("ls").is_none());
		assert!(match_builtin("rehash").is_none());
	}

	#[test]
	fn echo_joins_arguments() {
		let mut state = global::State::new();
		assert_eq!(run("echo", &["hello", "world"], &mut state), (0, "hello world\n".to_string()));
		assert_eq!(run("echo", &[], &mut state), (0, "\n".to_string()));
	}

	#[test]
	fn export_then_env() {
		let mut state = global::State::new();
		let (status, _) = run("export", &["LSH_TEST_EXPORT_FOO=bar=baz"], &mut state);
		assert_eq!(status, 0);
		assert_eq!(env::var("LSH_TEST_EXPORT_FOO").unwrap(), "bar=baz");
		let (status, out) = run("env", &[], &mut state);
		assert_eq!(status, 0);
		assert!(out.lines().any(|l| l == "LSH_TEST_EXPORT_FOO=bar=baz"));
	}

	#[test]
	fn export_without_equals_changes_nothing() {
		let mut state = global::State::new();
		let (status, _) = run("export", &["LSH_TEST_EXPORT_OK=1", "LSH_TEST_EXPORT_BAD"], &mut state);
		assert_eq!(status, 1);
		assert!(env::var_os("LSH_TEST_EXPORT_OK").is_none());
		assert!(env::var_os("LSH_TEST_EXPORT_BAD").is_none());
		assert_eq!(run("export", &[], &mut state).0, 1);
		assert_eq!(run("export", &["=x"], &mut state).0, 1);
	}

	#[test]
	fn exit_code_parsing() {
		assert_eq!(parse_exit_code("3"), 3);
		assert_eq!(parse_exit_code("4x2"), 42);
		assert_eq!(parse_exit_code("-7"), 7);
		assert_eq!(parse_exit_code("abc"), 0);
	}

	#[test]
	fn exit_records_request() {
		let mut state = global::State::new();
		assert_eq!(run("exit", &["5"], &mut state).0, 5);
		assert_eq!(state.exit_request, Some(5));

		let mut state = global::State::new();
		run("exit", &[], &mut state);
		assert_eq!(state.exit_request, Some(0));
	}

	#[test]
	fn jobs_lists_in_table_order() {
		let mut state = global::State::new();
		state.job_table.insert(Pid::from_raw(4242), "sleep 10").unwrap();
		state.job_table.insert(Pid::from_raw(4243), "sleep 20").unwrap();
		let (status, out) = run("jobs", &[], &mut state);
		assert_eq!(status, 0);
		assert_eq!(out, "[1]+ 4242 Running sleep 10\n[2]+ 4243 Running sleep 20\n");
	}

	#[test]
	fn pwd_prints_current_dir() {
		let mut state = global::State::new();
		let (status, out) = run("pwd", &[], &mut state);
		assert_eq!(status, 0);
		assert_eq!(out.trim_end(), env::current_dir().unwrap().to_str().unwrap());
	}
}
