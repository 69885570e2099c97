use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process;

use anyhow::{Context, Result};
use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use lsh::{eval, global, job, signals};

const LOG_ENV: &str = "LSH_LOG";

#[derive(FromArgs)]
/// A small line-oriented command interpreter.
struct Args {
	/// run one line and exit with its status
	#[argh(option, short = 'c')]
	command: Option<String>,

	/// never print a prompt
	#[argh(switch, short = 'q')]
	quiet: bool,
}

fn init_tracing() {
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.init();
}

fn prompt() -> String {
	let cwd = env::current_dir().map(|p| p.display().to_string()).unwrap_or_else(|_| "?".to_string());
	format!("lsh:{}$ ", cwd)
}

fn report_done(reaped: Vec<job::Job>) {
	for job in reaped {
		println!("[{}]+ Done {}", job.id, job.name);
	}
}

fn main() -> Result<()> {
	init_tracing();
	let args: Args = argh::from_env();
	let signals = signals::Signals::install().context("installing signal handlers")?;
	let mut state = global::State::new();

	if let Some(line) = args.command {
		let status = eval::eval_line(&mut state, &line);
		process::exit(state.exit_request.unwrap_or_else(|| i32::from(status)));
	}

	let interactive = !args.quiet && io::stdin().is_terminal();
	let mut stdout = io::stdout();
	let stdin = io::stdin();
	let mut stdin_locked = stdin.lock();
	loop {
		if signals.take_child_exited() {
			report_done(state.job_table.reap_nonblocking());
		}
		if interactive {
			let _ = stdout.write_all(prompt().as_bytes());
			let _ = stdout.flush();
		}
		let mut line: Vec<u8> = vec![];
		let n = stdin_locked.read_until(b'\n', &mut line).context("reading input")?;
		if n == 0 {
			if interactive {
				println!();
			}
			break;
		}
		let line = String::from_utf8_lossy(&line);
		eval::eval_line(&mut state, &line);
		if let Some(code) = state.exit_request {
			process::exit(code);
		}
		report_done(state.job_table.reap_nonblocking());
	}
	Ok(())
}
