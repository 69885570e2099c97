use std::env;
use std::ffi::{self, CString};
use std::fs::{self, File};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::OpenOptionsExt;

use nix::errno::Errno;
use nix::sys::wait;
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;
use tracing::debug;

use crate::builtin;
use crate::global;
use crate::job::WaitStatusExt;
use crate::parser;
use crate::search;
use crate::types::{Command, Redirect, RedirectType};

pub const SUCCESS: u8 = 0;
pub const FAILURE: u8 = 1;
pub const NOT_FOUND: u8 = 127;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error(transparent)]
	Parse(#[from] parser::ParseError),
	#[error("command not found: {0}")]
	NotFound(String),
	#[error("{path}: {source}")]
	Open {
		path: String,
		#[source]
		source: io::Error,
	},
	#[error("pipe: {0}")]
	Pipe(#[source] nix::Error),
	#[error("fork: {0}")]
	Fork(#[source] nix::Error),
	#[error("wait: {0}")]
	Wait(#[source] nix::Error),
	#[error("dup: {0}")]
	Dup(#[source] nix::Error),
	#[error("background pipelines are not supported")]
	BackgroundPipeline,
	#[error("nul byte in argument: {0}")]
	Nul(#[from] ffi::NulError),
}

impl ExecError {
	pub fn status(&self) -> u8 {
		match *self {
			ExecError::NotFound(_) => NOT_FOUND,
			_ => FAILURE,
		}
	}
}

fn open_redirect(redirect: &Redirect) -> Result<File, ExecError> {
	let mut oopt = fs::OpenOptions::new();
	let _ = match redirect.typ {
		RedirectType::Input => oopt.read(true),
		RedirectType::Output => oopt.write(true).create(true).truncate(true),
		RedirectType::Append => oopt.append(true).create(true),
	};
	oopt.mode(0o644);
	oopt.open(&redirect.target).map_err(|source| ExecError::Open { path: redirect.target.clone(), source: source })
}

/// Files a command's standard streams get replaced with.
#[derive(Debug, Default)]
struct Redirections {
	stdin: Option<File>,
	stdout: Option<File>,
}

impl Redirections {
	/// Opens every target in order; the last one per stream is kept. Files
	/// opened before a failure are closed on return.
	fn open(redirects: &[Redirect]) -> Result<Redirections, ExecError> {
		let mut r = Redirections::default();
		for redirect in redirects {
			let file = open_redirect(redirect)?;
			if redirect.typ.is_input() {
				r.stdin = Some(file);
			} else {
				r.stdout = Some(file);
			}
		}
		Ok(r)
	}

	/// Child side: dup the files over stdin/stdout and close the originals.
	fn install(self) -> nix::Result<()> {
		if let Some(file) = self.stdin {
			unistd::dup2(file.as_raw_fd(), libc::STDIN_FILENO)?;
		}
		if let Some(file) = self.stdout {
			unistd::dup2(file.as_raw_fd(), libc::STDOUT_FILENO)?;
		}
		Ok(())
	}
}

/// The interpreter's own stdin and stdout, put back in place on drop.
struct SavedStreams {
	stdin: OwnedFd,
	stdout: OwnedFd,
}

impl SavedStreams {
	fn save() -> Result<SavedStreams, ExecError> {
		let _ = io::stdout().flush();
		let stdin = unistd::dup(libc::STDIN_FILENO).map_err(ExecError::Dup)?;
		let stdin = unsafe { OwnedFd::from_raw_fd(stdin) };
		let stdout = unistd::dup(libc::STDOUT_FILENO).map_err(ExecError::Dup)?;
		let stdout = unsafe { OwnedFd::from_raw_fd(stdout) };
		Ok(SavedStreams { stdin: stdin, stdout: stdout })
	}
}

impl Drop for SavedStreams {
	fn drop(&mut self) {
		let _ = io::stdout().flush();
		if let Err(e) = unistd::dup2(self.stdin.as_raw_fd(), libc::STDIN_FILENO) {
			eprintln!("lsh: restoring stdin: {}", e);
		}
		if let Err(e) = unistd::dup2(self.stdout.as_raw_fd(), libc::STDOUT_FILENO) {
			eprintln!("lsh: restoring stdout: {}", e);
		}
	}
}

fn environment() -> Result<Vec<CString>, ffi::NulError> {
	env::vars_os()
		.map(|(mut k, v)| {
			k.push("=");
			k.push(v);
			CString::new(k.into_vec())
		})
		.collect()
}

/// What a child runs, worked out before forking so the child only has to
/// wire descriptors and hand over control.
enum Program {
	Builtin(builtin::Builtin, Vec<String>),
	External { path: CString, argv: Vec<CString>, envp: Vec<CString> },
	Missing(String),
}

impl Program {
	fn prepare(command: &Command) -> Result<Program, ExecError> {
		let name = command.name().ok_or(parser::ParseError::EmptyCommand)?;
		if let Some(f) = builtin::match_builtin(name) {
			return Ok(Program::Builtin(f, command.args().to_vec()));
		}
		match search::resolve(name) {
			Some(path) => Ok(Program::External {
				path: CString::new(path.into_os_string().into_vec())?,
				argv: command.to_cstrings()?,
				envp: environment()?,
			}),
			None => Ok(Program::Missing(name.to_owned())),
		}
	}

	/// Runs in the child. Only returns on failure, with the exit status.
	fn exec(self, state: &mut global::State) -> i32 {
		match self {
			Program::Builtin(f, args) => {
				let stdout = io::stdout();
				let mut out = stdout.lock();
				let s = f(state, &args, &mut out);
				let _ = out.flush();
				i32::from(s)
			},
			Program::External { path, argv, envp } => match unistd::execve(&path, &argv, &envp) {
				Ok(never) => match never {},
				Err(e) => {
					let _ = writeln!(io::stderr(), "lsh: {}: {}", path.to_string_lossy(), e);
					i32::from(NOT_FOUND)
				},
			},
			Program::Missing(name) => {
				let _ = writeln!(io::stderr(), "lsh: {}", ExecError::NotFound(name));
				i32::from(NOT_FOUND)
			},
		}
	}
}

fn flush_std() {
	let _ = io::stdout().flush();
	let _ = io::stderr().flush();
}

/// Forks and runs `body` in the child, which then exits with the status it
/// returns. The parent gets the child's pid back; `body` is dropped in the
/// parent without running.
fn fork_child<F>(body: F) -> Result<Pid, ExecError> where F: FnOnce() -> i32 {
	flush_std();
	match unsafe { unistd::fork() }.map_err(ExecError::Fork)? {
		ForkResult::Parent { child } => Ok(child),
		ForkResult::Child => {
			let code = body();
			flush_std();
			unsafe { libc::_exit(code) }
		},
	}
}

fn wait_for(pid: Pid) -> Result<u8, ExecError> {
	loop {
		match wait::waitpid(pid, None) {
			Ok(status) if status.is_terminated() => {
				debug!(%pid, ?status, "child finished");
				return Ok(status.code());
			},
			Ok(_) | Err(Errno::EINTR) => continue,
			Err(e) => return Err(ExecError::Wait(e)),
		}
	}
}

/// Runs a single command in a child process, honouring its redirections and
/// background flag. Returns the child's exit status, or success right away
/// for a background launch.
pub fn run_command(state: &mut global::State, command: &Command) -> Result<u8, ExecError> {
	let program = Program::prepare(command)?;
	if let Program::Missing(ref name) = program {
		return Err(ExecError::NotFound(name.clone()));
	}
	let redirections = Redirections::open(&command.redirects)?;

	let child_state = &mut *state;
	let pid = fork_child(move || {
		if let Err(e) = redirections.install() {
			let _ = writeln!(io::stderr(), "lsh: dup2: {}", e);
			return i32::from(FAILURE);
		}
		program.exec(child_state)
	})?;
	debug!(%pid, background = command.is_background, "spawned {}", command.display());

	if command.is_background {
		match state.job_table.insert(pid, &command.display()) {
			Ok(id) => println!("[{}] {}", id, pid),
			Err(e) => eprintln!("lsh: {}", e),
		}
		return Ok(SUCCESS);
	}
	wait_for(pid)
}

/// The anonymous pipes joining adjacent pipeline stages.
#[derive(Debug)]
pub struct PipeSet {
	pairs: Vec<(OwnedFd, OwnedFd)>,
}

impl PipeSet {
	/// Creates `stages - 1` pipes. On failure the ones already made are closed.
	pub fn new(stages: usize) -> Result<PipeSet, ExecError> {
		let mut pairs = Vec::with_capacity(stages.saturating_sub(1));
		for _ in 1..stages {
			pairs.push(unistd::pipe().map_err(ExecError::Pipe)?);
		}
		Ok(PipeSet { pairs: pairs })
	}

	pub fn len(&self) -> usize {
		self.pairs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pairs.is_empty()
	}

	fn connect(&self, stage: usize, stages: usize) -> nix::Result<()> {
		if stage > 0 {
			unistd::dup2(self.pairs[stage - 1].0.as_raw_fd(), libc::STDIN_FILENO)?;
		}
		if stage + 1 < stages {
			unistd::dup2(self.pairs[stage].1.as_raw_fd(), libc::STDOUT_FILENO)?;
		}
		Ok(())
	}

	/// Closes both ends of every pipe and returns how many descriptors that was.
	pub fn close_all(&mut self) -> usize {
		let closed = self.pairs.len() * 2;
		self.pairs.clear();
		closed
	}
}

/// What the parent observed while running a pipeline.
#[derive(Debug)]
pub struct PipelineRun {
	pub pids: Vec<Pid>,
	pub pipes: usize,
	/// Pipe descriptors the parent closed before it started waiting.
	pub closed: usize,
	pub statuses: Vec<u8>,
}

fn run_stage(pipes: &mut PipeSet, stage: usize, stages: usize, command: &Command,
             program: Program, state: &mut global::State) -> i32 {
	if let Err(e) = pipes.connect(stage, stages) {
		let _ = writeln!(io::stderr(), "lsh: dup2: {}", e);
		return i32::from(FAILURE);
	}
	pipes.close_all();
	let redirections = match Redirections::open(&command.redirects) {
		Ok(r) => r,
		Err(e) => {
			let _ = writeln!(io::stderr(), "lsh: {}", e);
			return i32::from(FAILURE);
		},
	};
	if let Err(e) = redirections.install() {
		let _ = writeln!(io::stderr(), "lsh: dup2: {}", e);
		return i32::from(FAILURE);
	}
	program.exec(state)
}

fn wait_all(pids: &[Pid]) -> Vec<u8> {
	pids.iter()
		.map(|&pid| wait_for(pid).unwrap_or_else(|e| {
			debug!(%pid, "{}", e);
			FAILURE
		}))
		.collect()
}

/// Splits `line` on `|`, joins the stages with pipes, launches all of them and
/// waits for every one to finish.
pub fn run_pipeline(state: &mut global::State, line: &str) -> Result<PipelineRun, ExecError> {
	let commands = parser::split_pipeline(line)
		.into_iter()
		.map(parser::parse_command)
		.collect::<Result<Vec<Command>, _>>()?;
	if commands.is_empty() {
		return Err(parser::ParseError::EmptyCommand.into());
	}
	if commands.iter().any(|c| c.is_background) {
		return Err(ExecError::BackgroundPipeline);
	}
	let programs = commands.iter().map(Program::prepare).collect::<Result<Vec<Program>, _>>()?;

	let stages = commands.len();
	let mut pipes = PipeSet::new(stages)?;
	let pipe_count = pipes.len();
	let mut pids = Vec::with_capacity(stages);
	for (i, (command, program)) in commands.iter().zip(programs).enumerate() {
		let child_state = &mut *state;
		let child_pipes = &mut pipes;
		match fork_child(move || run_stage(child_pipes, i, stages, command, program, child_state)) {
			Ok(pid) => {
				debug!(%pid, stage = i, "spawned {}", command.display());
				pids.push(pid);
			},
			Err(e) => {
				pipes.close_all();
				wait_all(&pids);
				return Err(e);
			},
		}
	}

	let closed = pipes.close_all();
	let statuses = wait_all(&pids);
	Ok(PipelineRun { pids: pids, pipes: pipe_count, closed: closed, statuses: statuses })
}

/// Runs a built-in inside the interpreter. Redirections are installed over
/// the interpreter's own streams for the duration of the call.
fn run_builtin(state: &mut global::State, f: builtin::Builtin, command: &Command) -> Result<u8, ExecError> {
	let redirections = Redirections::open(&command.redirects)?;
	let _saved = if command.redirects.is_empty() { None } else { Some(SavedStreams::save()?) };
	redirections.install().map_err(ExecError::Dup)?;
	let stdout = io::stdout();
	let mut out = stdout.lock();
	let s = f(state, command.args(), &mut out);
	let _ = out.flush();
	Ok(s)
}

fn eval_command(state: &mut global::State, command: &Command) -> Result<u8, ExecError> {
	let name = command.name().ok_or(parser::ParseError::EmptyCommand)?;
	match builtin::match_builtin(name) {
		Some(f) => {
			if command.is_background {
				eprintln!("lsh: {}: built-ins run in the foreground, `&` ignored", name);
			}
			run_builtin(state, f, command)
		},
		None => run_command(state, command),
	}
}

/// Runs one input line and returns its status. Errors are reported on stderr
/// and turned into a status; none of them end the interpreter.
pub fn eval_line(state: &mut global::State, line: &str) -> u8 {
	let line = line.trim();
	if line.is_empty() {
		return state.last_status;
	}
	let result = if parser::is_pipeline(line) {
		run_pipeline(state, line).map(|_| SUCCESS)
	} else {
		parser::parse_command(line)
			.map_err(ExecError::from)
			.and_then(|command| eval_command(state, &command))
	};
	let status = result.unwrap_or_else(|e| {
		eprintln!("lsh: {}", e);
		e.status()
	});
	state.last_status = status;
	status
}
