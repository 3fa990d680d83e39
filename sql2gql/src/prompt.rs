//! Console relation prompt
//!
//! Asks an operator to pick the bridge table of an ambiguous relation path.
//! Workers may hit ambiguities at the same time, so the whole
//! question-and-answer exchange runs under one lock.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use crate::assemble::{RelationRequest, RelationResolver};
use crate::error::Unsupported;

/// Relation resolver reading decisions from a line-oriented console
pub struct ConsolePrompt<R, W> {
    io: Mutex<(R, W)>,
}

impl ConsolePrompt<io::BufReader<io::Stdin>, io::Stderr> {
    /// Prompt on stderr, answers from stdin
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R: BufRead + Send, W: Write + Send> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        ConsolePrompt {
            io: Mutex::new((input, output)),
        }
    }

    /// Consumes the prompt, returning its input and output
    pub fn into_inner(self) -> (R, W) {
        match self.io.into_inner() {
            Ok(io) => io,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ask(&self, request: &RelationRequest<'_>) -> io::Result<Option<usize>> {
        let mut guard = match self.io.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (input, output) = &mut *guard;

        writeln!(
            output,
            "Relation from '{}' to '{}' is ambiguous. Bridge through:",
            request.parent, request.child
        )?;
        for (i, candidate) in request.candidates.iter().enumerate() {
            writeln!(output, "  [{}] {}", i, candidate)?;
        }
        write!(output, "Choice (empty to skip): ")?;
        output.flush()?;

        let mut line = String::new();
        input.read_line(&mut line)?;
        Ok(line
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|choice| *choice < request.candidates.len()))
    }
}

impl<R: BufRead + Send, W: Write + Send> RelationResolver for ConsolePrompt<R, W> {
    fn choose(&self, request: &RelationRequest<'_>) -> Result<usize, Unsupported> {
        if request.candidates.is_empty() {
            return Err(request.unresolvable());
        }
        match self.ask(request) {
            Ok(Some(choice)) => Ok(choice),
            Ok(None) => Err(request.unresolvable()),
            Err(e) => {
                log::error!("relation prompt failed: {}", e);
                Err(request.unresolvable())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn request(candidates: &[String]) -> RelationRequest<'_> {
        RelationRequest {
            parent: "movie",
            child: "director",
            candidates,
        }
    }

    #[test]
    fn test_valid_choice() {
        let candidates = vec!["directed_by".to_string(), "produced_by".to_string()];
        let prompt = ConsolePrompt::new(Cursor::new("1\n"), Vec::new());
        assert_eq!(prompt.choose(&request(&candidates)), Ok(1));

        let (_, output) = prompt.into_inner();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("[0] directed_by"));
        assert!(output.contains("[1] produced_by"));
    }

    #[test]
    fn test_declined_or_invalid_choice() {
        let candidates = vec!["directed_by".to_string()];
        for answer in ["\n", "7\n", "abc\n", ""] {
            let prompt = ConsolePrompt::new(Cursor::new(answer), Vec::new());
            assert!(matches!(
                prompt.choose(&request(&candidates)),
                Err(Unsupported::RelationPathUnresolvable { .. })
            ));
        }
    }

    #[test]
    fn test_no_candidates_skips_prompt() {
        let prompt = ConsolePrompt::new(Cursor::new("0\n"), Vec::new());
        assert!(prompt.choose(&request(&[])).is_err());
        let (_, output) = prompt.into_inner();
        assert!(output.is_empty());
    }
}
