use thiserror::Error;

use crate::types::*;

pub const WHITESPACE: &str = " \t";
pub const PIPE: &str = "|";
pub const BACKGROUND: &str = "&";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("syntax error: missing filename after `{0}`")]
	MissingFilename(String),
	#[error("syntax error: empty command")]
	EmptyCommand,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Splits `input` on any character of `delims`, trimming every piece and
/// dropping the empty ones. Quotes mean nothing here.
pub fn tokenize<'a>(input: &'a str, delims: &str) -> Vec<&'a str> {
	input
		.split(|c: char| delims.contains(c))
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.collect()
}

pub fn build_command(line: &str) -> Command {
	let argv = tokenize(line.trim(), WHITESPACE).into_iter().map(str::to_owned).collect();
	Command { argv: argv, redirects: vec![], is_background: false }
}

fn strip_background(command: &mut Command) {
	if command.argv.last().map(String::as_str) == Some(BACKGROUND) {
		command.argv.pop();
		command.is_background = true;
	}
}

fn parse_redirects(command: &mut Command) -> ParseResult<()> {
	let mut argv = Vec::with_capacity(command.argv.len());
	let mut words = command.argv.drain(..);
	while let Some(word) = words.next() {
		match RedirectType::from_operator(&word) {
			Some(typ) => {
				let target = words.next().ok_or_else(|| ParseError::MissingFilename(word.clone()))?;
				if RedirectType::from_operator(&target).is_some() || target == BACKGROUND {
					return Err(ParseError::MissingFilename(word));
				}
				command.redirects.push(Redirect { target: target, typ: typ });
			},
			None => argv.push(word),
		}
	}
	drop(words);
	command.argv = argv;
	Ok(())
}

/// Builds the command for one line (or one pipeline stage), stripping a
/// trailing `&` and every redirection operator with its filename.
pub fn parse_command(line: &str) -> ParseResult<Command> {
	let mut command = build_command(line);
	strip_background(&mut command);
	parse_redirects(&mut command)?;
	if command.is_empty() {
		return Err(ParseError::EmptyCommand);
	}
	Ok(command)
}

pub fn is_pipeline(line: &str) -> bool {
	line.contains('|')
}

pub fn split_pipeline(line: &str) -> Vec<&str> {
	tokenize(line, PIPE)
}
