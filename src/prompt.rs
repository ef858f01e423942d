// Interactive input: reprompt until the answer is valid.
use std::io::{self, BufRead, Write};

use crate::teams::TeamRegistry;

fn read_answer<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
    }
    Ok(line.trim().to_string())
}

/// Ask for a team abbreviation; returns it upper-cased once the registry knows it.
pub fn prompt_team<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    registry: &TeamRegistry,
    question: &str,
) -> io::Result<String> {
    loop {
        let code = read_answer(input, output, question)?.to_uppercase();
        if registry.lookup_abbreviation(&code).is_some() {
            return Ok(code);
        }
        writeln!(output, "Invalid team abbreviation '{}'. Please try again.", code)?;
    }
}

pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

pub fn prompt_home<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    loop {
        let answer = read_answer(input, output, question)?;
        match parse_yes_no(&answer) {
            Some(home) => return Ok(home),
            None => writeln!(output, "Please answer 'yes' or 'no'.")?,
        }
    }
}
