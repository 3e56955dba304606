//! Plain-text edge stream files
//!
//! ```text
//! <num_nodes> <num_updates>
//! <type> <u> <v>        repeated num_updates times, type 0 = insert, 1 = delete
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use sketchcc_common::{GraphUpdate, UpdateKind};

/// Reader over the updates of one stream file.
pub struct EdgeStream<R> {
    reader: R,
    num_nodes: u64,
    num_updates: u64,
    read: u64,
    line_no: usize,
    line: String,
}

impl EdgeStream<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("cannot open stream {}", path.display()))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> EdgeStream<R> {
    /// Read the header line.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut line = String::new();
        let mut line_no = 0;
        let header = loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                bail!("stream is empty, expected a `num_nodes num_updates` header");
            }
            line_no += 1;
            if !line.trim().is_empty() {
                break line.trim().to_string();
            }
        };
        let fields = parse_fields::<2>(&header, line_no)?;
        Ok(Self {
            reader,
            num_nodes: fields[0],
            num_updates: fields[1],
            read: 0,
            line_no,
            line,
        })
    }

    pub fn num_nodes(&self) -> u64 {
        self.num_nodes
    }

    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    fn next_update(&mut self) -> Result<Option<GraphUpdate>> {
        if self.read == self.num_updates {
            return Ok(None);
        }
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                bail!(
                    "stream ended after {} of {} updates",
                    self.read,
                    self.num_updates
                );
            }
            self.line_no += 1;
            if !self.line.trim().is_empty() {
                break;
            }
        }
        let [code, u, v] = parse_fields::<3>(self.line.trim(), self.line_no)?;
        let kind = u8::try_from(code)
            .ok()
            .and_then(UpdateKind::from_code)
            .with_context(|| format!("line {}: unknown update type {code}", self.line_no))?;
        for node in [u, v] {
            if node >= self.num_nodes {
                bail!(
                    "line {}: vertex {node} out of range for {} nodes",
                    self.line_no,
                    self.num_nodes
                );
            }
        }
        if u == v {
            bail!("line {}: self loop on vertex {u}", self.line_no);
        }
        self.read += 1;
        Ok(Some(match kind {
            UpdateKind::Insert => GraphUpdate::insert(u, v),
            UpdateKind::Delete => GraphUpdate::delete(u, v),
        }))
    }
}

impl<R: BufRead> Iterator for EdgeStream<R> {
    type Item = Result<GraphUpdate>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_update().transpose()
    }
}

fn parse_fields<const N: usize>(line: &str, line_no: usize) -> Result<[u64; N]> {
    let mut out = [0u64; N];
    let mut fields = line.split_whitespace();
    for slot in out.iter_mut() {
        let field = fields
            .next()
            .with_context(|| format!("line {line_no}: expected {N} fields in {line:?}"))?;
        *slot = field
            .parse()
            .with_context(|| format!("line {line_no}: {field:?} is not a number"))?;
    }
    if fields.next().is_some() {
        bail!("line {line_no}: expected {N} fields in {line:?}");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(text: &str) -> Result<EdgeStream<&[u8]>> {
        EdgeStream::new(text.as_bytes())
    }

    #[test]
    fn reads_header_and_updates() {
        let s = stream("4 3\n0 0 1\n0 2 3\n1 1 0\n").unwrap();
        assert_eq!((s.num_nodes(), s.num_updates()), (4, 3));
        let updates: Vec<_> = s.collect::<Result<_>>().unwrap();
        assert_eq!(
            updates,
            vec![
                GraphUpdate::insert(0, 1),
                GraphUpdate::insert(2, 3),
                GraphUpdate::delete(0, 1),
            ]
        );
    }

    #[test]
    fn skips_blank_lines_and_stops_at_count() {
        let s = stream("\n3 1\n\n0 0 2\n0 1 2\n").unwrap();
        assert_eq!(s.count(), 1);
    }

    #[test]
    fn rejects_malformed_lines() {
        let errors = [
            "",
            "3\n",
            "3 1\n2 0 1\n",
            "3 1\n0 0 3\n",
            "3 1\n0 1 1\n",
            "3 1\n0 x 1\n",
            "3 1\n0 0 1 9\n",
            "3 2\n0 0 1\n",
        ];
        for text in errors {
            let result = stream(text).and_then(|s| s.collect::<Result<Vec<_>>>());
            assert!(result.is_err(), "accepted {text:?}");
        }
    }

    #[test]
    fn errors_name_the_line() {
        let err = stream("3 2\n0 0 1\n0 0 7\n")
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");
    }
}
