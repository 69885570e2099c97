use std::ffi::{CString, NulError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectType { Input, Output, Append }

impl RedirectType {
	pub fn from_operator(op: &str) -> Option<RedirectType> {
		match op {
			"<" => Some(RedirectType::Input),
			">" => Some(RedirectType::Output),
			">>" => Some(RedirectType::Append),
			_ => None,
		}
	}

	pub fn is_input(self) -> bool {
		self == RedirectType::Input
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
	pub target: String,
	pub typ: RedirectType,
}

/// One argument vector plus whatever was stripped from it while parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
	pub argv: Vec<String>,
	pub redirects: Vec<Redirect>,
	pub is_background: bool,
}

impl Command {
	pub fn argc(&self) -> usize {
		self.argv.len()
	}

	pub fn is_empty(&self) -> bool {
		self.argv.is_empty()
	}

	pub fn name(&self) -> Option<&str> {
		self.argv.first().map(String::as_str)
	}

	pub fn args(&self) -> &[String] {
		self.argv.get(1..).unwrap_or(&[])
	}

	/// The text shown in the job table.
	pub fn display(&self) -> String {
		self.argv.join(" ")
	}

	pub fn to_cstrings(&self) -> Result<Vec<CString>, NulError> {
		self.argv.iter().map(|s| CString::new(s.as_bytes())).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn args_skip_name() {
		let c = Command { argv: vec!["ls".into(), "-l".into(), "/tmp".into()], ..Command::default() };
		assert_eq!(c.name(), Some("ls"));
		assert_eq!(c.args(), &["-l".to_string(), "/tmp".to_string()]);
		assert_eq!(c.display(), "ls -l /tmp");
	}

	#[test]
	fn empty_command_has_no_name() {
		let c = Command::default();
		assert!(c.is_empty());
		assert_eq!(c.name(), None);
		assert!(c.args().is_empty());
	}

	#[test]
	fn nul_byte_rejected() {
		let c = Command { argv: vec!["a\0b".into()], ..Command::default() };
		assert!(c.to_cstrings().is_err());
	}
}
