use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::AlignmentError;
use crate::pipeline::traits::{Normalizer, Romanizer};

/// Lowercases, folds compatibility forms and turns punctuation into spaces.
/// Letters, marks, digits and apostrophes survive.
pub struct BasicNormalizer;

impl Normalizer for BasicNormalizer {
    fn normalize(&self, raw: &str, _language: Option<&str>) -> Result<String, AlignmentError> {
        let folded: String = raw
            .nfkc()
            .flat_map(char::to_lowercase)
            .map(|c| match c {
                '\u{2019}' | '\u{2018}' | '`' => '\'',
                c if c.is_alphanumeric() || is_combining_mark(c) || c == '\'' => c,
                _ => ' ',
            })
            .collect();
        Ok(collapse_whitespace(&folded))
    }
}

/// Romanizes by stripping diacritics and keeping only `[a-z' ]`.
///
/// Adequate for Latin-script text; other scripts need [`CommandRomanizer`].
pub struct AsciiFoldRomanizer;

impl Romanizer for AsciiFoldRomanizer {
    fn romanize(
        &self,
        normalized: &[String],
        _language: Option<&str>,
    ) -> Result<Vec<String>, AlignmentError> {
        Ok(normalized
            .iter()
            .map(|line| {
                let stripped: String = line.nfd().filter(|c| !is_combining_mark(*c)).collect();
                clean_romanized(&stripped)
            })
            .collect())
    }
}

/// Pipes lines through an external romanizer (e.g. `uroman.pl`), one line
/// per segment on stdin and stdout.
pub struct CommandRomanizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRomanizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Romanizer for CommandRomanizer {
    fn romanize(
        &self,
        normalized: &[String],
        language: Option<&str>,
    ) -> Result<Vec<String>, AlignmentError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(lang) = language {
            command.arg("-l").arg(lang);
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AlignmentError::normalization(format!(
                    "failed to start romanizer '{}': {e}",
                    self.program.display()
                ))
            })?;

        let mut input = normalized.join("\n");
        input.push('\n');
        let stdin = child.stdin.take();
        // stdin is fed from its own thread so a child that streams its
        // output cannot fill the stdout pipe while we are still writing
        let (written, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(input.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, output)
        });
        let output = output.map_err(|e| {
            AlignmentError::normalization(format!("romanizer did not finish: {e}"))
        })?;
        if !output.status.success() {
            return Err(AlignmentError::normalization(format!(
                "romanizer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if let Err(e) = written {
            return Err(AlignmentError::normalization(format!(
                "failed to write to romanizer: {e}"
            )));
        }

        let lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(clean_romanized)
            .collect();
        if lines.len() != normalized.len() {
            return Err(AlignmentError::normalization(format!(
                "romanizer returned {} lines for {} inputs",
                lines.len(),
                normalized.len()
            )));
        }
        Ok(lines)
    }
}

/// Lowercase, straight apostrophes, `[a-z' ]` only, single spaces.
pub(crate) fn clean_romanized(text: &str) -> String {
    let kept: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            '\u{2019}' | '\u{2018}' | '`' => '\'',
            c if c.is_ascii_lowercase() || c == '\'' => c,
            _ => ' ',
        })
        .collect();
    collapse_whitespace(&kept)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_normalizer_strips_punctuation() {
        let out = BasicNormalizer
            .normalize("  In the beginning, God created—the heavens!  ", None)
            .unwrap();
        assert_eq!(out, "in the beginning god created the heavens");
    }

    #[test]
    fn basic_normalizer_keeps_apostrophes_and_digits() {
        let out = BasicNormalizer.normalize("Don’t fear, 3 times", None).unwrap();
        assert_eq!(out, "don't fear 3 times");
    }

    #[test]
    fn basic_normalizer_folds_compatibility_forms_and_keeps_composed_letters() {
        let out = BasicNormalizer.normalize("ﬁat Lux, JOSÉ", None).unwrap();
        assert_eq!(out, "fiat lux jos\u{e9}");
    }

    #[test]
    fn ascii_fold_removes_diacritics_and_digits() {
        let out = AsciiFoldRomanizer
            .romanize(&["señor josé 12".to_string(), "ça va".to_string()], None)
            .unwrap();
        assert_eq!(out, vec!["senor jose".to_string(), "ca va".to_string()]);
    }

    #[test]
    fn ascii_fold_preserves_line_count() {
        let input = vec!["αβγ".to_string(), "abc".to_string()];
        let out = AsciiFoldRomanizer.romanize(&input, Some("ell")).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], "");
    }

    #[test]
    fn clean_romanized_collapses() {
        assert_eq!(clean_romanized("Ma  Ri-Ya’s"), "ma ri ya's");
    }

    #[cfg(unix)]
    #[test]
    fn command_romanizer_streams_input_larger_than_a_pipe() {
        let lines: Vec<String> = (0..4_000)
            .map(|i| format!("and it was evening and it was morning day {i} amen"))
            .collect();
        assert!(lines.iter().map(String::len).sum::<usize>() > 64 * 1024);
        let out = CommandRomanizer::new("cat").romanize(&lines, None).unwrap();
        assert_eq!(out.len(), lines.len());
        assert_eq!(out[3_999], "and it was evening and it was morning day amen");
    }

    #[cfg(unix)]
    #[test]
    fn command_romanizer_failing_program_is_normalization_error() {
        let err = CommandRomanizer::new("false")
            .romanize(&["abc".to_string()], None)
            .unwrap_err();
        assert!(matches!(err, AlignmentError::Normalization { .. }));
    }

    #[test]
    fn command_romanizer_missing_program_is_normalization_error() {
        let romanizer = CommandRomanizer::new("/nonexistent/uroman.pl");
        let err = romanizer.romanize(&["abc".to_string()], None).unwrap_err();
        assert!(matches!(err, AlignmentError::Normalization { .. }));
    }
}
