use crate::job;

pub struct State {
	pub job_table: job::JobTable,
	/// Set by `exit`; the read loop terminates with this status.
	pub exit_request: Option<i32>,
	pub last_status: u8,
}

impl Default for State {
	fn default() -> State {
		State::new()
	}
}

impl State {
	pub fn new() -> State {
		State { job_table: job::JobTable::new(), exit_request: None, last_status: 0 }
	}
}
