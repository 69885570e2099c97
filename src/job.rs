use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::debug;

pub const MAX_JOBS: usize = 32;
pub const MAX_DISPLAY_LEN: usize = 1023;

const FAILURE: u8 = 1;

pub trait WaitStatusExt {
	fn get_pid(self) -> Option<Pid>;
	fn is_terminated(self) -> bool;
	fn code(self) -> u8;
}

impl WaitStatusExt for WaitStatus {
	fn get_pid(self) -> Option<Pid> {
		self.pid()
	}

	fn is_terminated(self) -> bool {
		matches!(self, WaitStatus::Exited(..) | WaitStatus::Signaled(..))
	}

	fn code(self) -> u8 {
		match self {
			WaitStatus::Exited(_, code) => code as u8,
			_ => FAILURE,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State { Running, Done }

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Job {
	pub id: usize,
	pub pid: Pid,
	pub name: String,
	pub state: State,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
	#[error("job table full ({0} jobs), pid {1} is not tracked")]
	Full(usize, Pid),
	#[error("pid {0} is already tracked")]
	Duplicate(Pid),
}

fn truncate_display(name: &str) -> String {
	if name.len() <= MAX_DISPLAY_LEN {
		return name.to_owned();
	}
	let mut end = MAX_DISPLAY_LEN;
	while !name.is_char_boundary(end) {
		end -= 1;
	}
	name[..end].to_owned()
}

/// Background processes launched by the interpreter, in launch order.
#[derive(Debug)]
pub struct JobTable {
	jobs: Vec<Job>,
	capacity: usize,
	next_id: usize,
}

impl Default for JobTable {
	fn default() -> JobTable {
		JobTable::new()
	}
}

impl JobTable {
	pub fn new() -> JobTable {
		JobTable::with_capacity(MAX_JOBS)
	}

	pub fn with_capacity(capacity: usize) -> JobTable {
		JobTable { jobs: Vec::with_capacity(capacity), capacity: capacity, next_id: 1 }
	}

	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn get(&self, pid: Pid) -> Option<&Job> {
		self.jobs.iter().find(|job| job.pid == pid)
	}

	/// Registers a running job and returns its id. The table is left
	/// untouched when it is full or already tracks `pid`.
	pub fn insert(&mut self, pid: Pid, name: &str) -> Result<usize, JobError> {
		if self.get(pid).is_some() {
			return Err(JobError::Duplicate(pid));
		}
		if self.jobs.len() >= self.capacity {
			return Err(JobError::Full(self.capacity, pid));
		}
		let id = self.next_id;
		self.next_id += 1;
		self.jobs.push(Job { id: id, pid: pid, name: truncate_display(name), state: State::Running });
		Ok(id)
	}

	pub fn remove(&mut self, pid: Pid) -> Option<Job> {
		let i = self.jobs.iter().position(|job| job.pid == pid)?;
		Some(self.jobs.remove(i))
	}

	pub fn list(&self) -> impl Iterator<Item = (usize, Pid, &str)> + '_ {
		self.jobs.iter().map(|job| (job.id, job.pid, job.name.as_str()))
	}

	/// Collects every child that has already terminated without blocking and
	/// drops the matching entries. Returns the jobs that were removed.
	pub fn reap_nonblocking(&mut self) -> Vec<Job> {
		self.reap_with(|| wait::waitpid(None, Some(WaitPidFlag::WNOHANG)))
	}

	pub fn reap_with<F>(&mut self, mut poll: F) -> Vec<Job> where F: FnMut() -> nix::Result<WaitStatus> {
		let mut reaped = vec![];
		loop {
			let status = match poll() {
				Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
				Err(Errno::EINTR) => continue,
				Err(e) => {
					debug!("reap stopped: {}", e);
					break;
				},
				Ok(status) => status,
			};
			if !status.is_terminated() {
				continue;
			}
			if let Some(pid) = status.get_pid() {
				debug!(%pid, ?status, "reaped");
				if let Some(mut job) = self.remove(pid) {
					job.state = State::Done;
					reaped.push(job);
				}
			}
		}
		reaped
	}
}
