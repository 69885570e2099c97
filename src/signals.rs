//! Signal notifications for the read loop.
//!
//! Handlers only raise flags; the loop turns a raised SIGCHLD flag into a
//! call to `JobTable::reap_nonblocking`.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGCHLD, SIGINT};
use signal_hook::flag;

pub struct Signals {
	child_exited: Arc<AtomicBool>,
}

impl Signals {
	/// Registers the flag handlers. SIGINT only raises a flag nobody reads, so
	/// it no longer kills the interpreter; foreground children still receive
	/// it from the terminal.
	pub fn install() -> io::Result<Signals> {
		let child_exited = Arc::new(AtomicBool::new(false));
		flag::register(SIGCHLD, Arc::clone(&child_exited))?;
		flag::register(SIGINT, Arc::new(AtomicBool::new(false)))?;
		Ok(Signals { child_exited: child_exited })
	}

	/// True if a child terminated since the last call.
	pub fn take_child_exited(&self) -> bool {
		self.child_exited.swap(false, Ordering::SeqCst)
	}
}
