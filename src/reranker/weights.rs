//! Sparse weight-file I/O: one line per nonzero feature, `<id>` when its
//! weight is 1, `<id>=<weight>` otherwise.

use std::io::{BufRead, Write};
use std::path::Path;

use crate::error::InputError;

pub fn save(path: &Path, weights: &[f64]) -> Result<(), InputError> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    for (id, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        if w == 1.0 {
            writeln!(out, "{id}")?;
        } else {
            writeln!(out, "{id}={w}")?;
        }
    }
    Ok(())
}

pub fn load(path: &Path, nfeatures: usize) -> Result<Vec<f64>, InputError> {
    let reader = std::io::BufReader::new(std::fs::File::open(path)?);
    let mut weights = vec![0.0; nfeatures];
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (id_str, w) = match line.split_once('=') {
            Some((id_str, w_str)) => {
                let w: f64 = w_str.trim().parse().map_err(|_| InputError::MalformedSentence(
                    format!("weight file line {lineno}: bad weight {w_str:?}"),
                ))?;
                (id_str, w)
            }
            None => (line, 1.0),
        };
        let id: usize = id_str.trim().parse().map_err(|_| InputError::MalformedSentence(
            format!("weight file line {lineno}: bad feature id {id_str:?}"),
        ))?;
        if id >= weights.len() {
            weights.resize(id + 1, 0.0);
        }
        weights[id] = w;
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_sparse_weights() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weights.out");
        let weights = vec![0.0, 1.0, -2.5, 0.0, 1.0];
        save(&path, &weights).unwrap();
        let loaded = load(&path, weights.len()).unwrap();
        assert_eq!(loaded, weights);
    }

    #[test]
    fn omits_zero_and_default_one_weights_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weights.out");
        save(&path, &[0.0, 1.0, 3.0]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1\n2=3\n");
    }

    #[test]
    fn rejects_malformed_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weights.out");
        std::fs::write(&path, "not-a-number\n").unwrap();
        assert!(load(&path, 1).is_err());
    }
}
