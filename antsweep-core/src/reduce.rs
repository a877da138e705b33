//! Reduction of raw engine output files into csv tables.
//!
//! Model variants saving per-ant data print each record in the engine's
//! native list format, one record per line. Every line carries one leading
//! and four trailing framing characters around the whitespace-delimited
//! data tokens:
//!
//! ```text
//! [12 "scent-3" 41.5 -3.2 17 ]]]
//! ```
//!
//! Reduction strips the framing, validates the tokens and writes a csv table
//! with the header `tick,scent_id,energy,x,y,`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::Result;

/// Number of framing characters preceding the data on each line.
pub const LEADING_FRAME: usize = 1;
/// Number of framing characters following the data on each line.
pub const TRAILING_FRAME: usize = 4;

/// Header of the reduced table. The trailing empty field is kept for
/// compatibility with existing downstream tooling.
pub const HEADER: &[&str] = &["tick", "scent_id", "energy", "x", "y", ""];

/// Number of data tokens expected on every line.
pub const FIELD_COUNT: usize = 5;

/// Parses a single raw line into its data tokens.
///
/// `line_no` is one-based and only used for error reporting.
pub fn parse_line(line: &str, line_no: usize) -> Result<Vec<String>> {
    let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
    let len = line.chars().count();
    if len < LEADING_FRAME + TRAILING_FRAME {
        return Err(Error::MalformedLine {
            line: line_no,
            reason: format!(
                "line has {} characters, framing alone takes {}",
                len,
                LEADING_FRAME + TRAILING_FRAME
            ),
        });
    }
    let inner: String = line
        .chars()
        .skip(LEADING_FRAME)
        .take(len - LEADING_FRAME - TRAILING_FRAME)
        .collect();
    let tokens = tokenize(&inner).map_err(|reason| Error::MalformedLine {
        line: line_no,
        reason,
    })?;
    if tokens.len() != FIELD_COUNT {
        return Err(Error::MalformedLine {
            line: line_no,
            reason: format!("expected {} fields, found {}", FIELD_COUNT, tokens.len()),
        });
    }
    Ok(tokens)
}

/// Splits on whitespace. Double-quoted tokens may contain whitespace and
/// lose their quotes, a doubled quote inside them stands for a literal one.
fn tokenize(s: &str) -> std::result::Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();
    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        let first = match chars.next() {
            Some(c) => c,
            None => break,
        };
        let mut token = String::new();
        if first == '"' {
            let mut closed = false;
            while let Some(c) = chars.next() {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        token.push('"');
                    } else {
                        closed = true;
                        break;
                    }
                } else {
                    token.push(c);
                }
            }
            if !closed {
                return Err("unterminated quoted field".to_string());
            }
        } else {
            token.push(first);
            while let Some(c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(*c);
                chars.next();
            }
        }
        tokens.push(token);
    }
    Ok(tokens)
}

/// Quotes a csv field if it contains a delimiter, quote or line break.
pub fn quote_field(field: &str) -> String {
    if field.contains(|c: char| c == ',' || c == '"' || c == '\n' || c == '\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Writes a single comma-delimited record, terminated with a newline.
pub fn write_record<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> Result<()> {
    let line = fields
        .iter()
        .map(|f| quote_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Reduces raw output read from `input`, writing the csv table to `output`.
///
/// Returns the number of data rows written. Stops at the first malformed
/// line.
pub fn reduce<R: BufRead, W: Write>(input: R, mut output: W) -> Result<usize> {
    write_record(&mut output, HEADER)?;
    let mut rows = 0;
    for (idx, line) in input.lines().enumerate() {
        let tokens = parse_line(&line?, idx + 1)?;
        write_record(&mut output, &tokens)?;
        rows += 1;
    }
    output.flush()?;
    Ok(rows)
}

/// Reduces raw output held in memory.
pub fn reduce_str(input: &str) -> Result<String> {
    let mut out = Vec::new();
    reduce(input.as_bytes(), &mut out)?;
    String::from_utf8(out).map_err(|e| Error::Other(e.to_string()))
}

/// Reduces the raw output file at `input` into a csv file at `output`.
///
/// On failure no output file is left behind.
pub fn reduce_file(input: &Path, output: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(input)?);
    let writer = BufWriter::new(File::create(output)?);
    match reduce(reader, writer) {
        Ok(rows) => {
            debug!(
                "reduced {} ({} rows) into {}",
                input.to_string_lossy(),
                rows,
                output.to_string_lossy()
            );
            Ok(rows)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(output) {
                warn!("failed removing partial output {}: {}", output.to_string_lossy(), rm);
            }
            Err(e)
        }
    }
}

/// Reduces every raw output file found in `dir`, writing the tables into
/// `out_dir` under the same file stem.
///
/// A failing file doesn't prevent reduction of the others; results are
/// reported per input file.
pub fn reduce_dir(dir: &Path, out_dir: &Path) -> Result<Vec<(PathBuf, Result<PathBuf>)>> {
    fs::create_dir_all(out_dir)?;
    let mut inputs = crate::util::find_files_with_extension(dir, crate::RAW_OUTPUT_EXTENSION);
    inputs.sort();
    let mut results = Vec::new();
    for input in inputs {
        let output = out_dir.join(csv_name_for(&input));
        let result = reduce_file(&input, &output).map(|_| output);
        if let Err(e) = &result {
            error!("failed reducing {}: {}", input.to_string_lossy(), e);
        }
        results.push((input, result));
    }
    Ok(results)
}

/// Name of the csv file produced from the given raw output file.
pub fn csv_name_for(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    format!("{}.csv", stem)
}
