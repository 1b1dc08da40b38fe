//! Per-class interpolation weights, binned by training count. Each entry
//! lies in `[0, 1]` and weighs the specific-context estimate against the
//! back-off estimate from the level above, at a given trie depth. Loaded
//! from `<calc-name>.lambdas`.

use super::calc::CalcClass;
use std::collections::HashMap;

/// Count buckets, loosely Fibonacci-spaced the way the source's
/// `bucketLims` table widens at higher counts (sparse high-count contexts
/// need coarser binning to get enough lambda-estimation data).
const BUCKET_LIMITS: [f64; 13] = [
    0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0, 55.0, 89.0, 144.0, 233.0,
];

pub fn bucket(count: f64) -> usize {
    BUCKET_LIMITS
        .iter()
        .rposition(|&limit| count >= limit)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default)]
pub struct LambdaTable {
    /// `weights[depth][bucket]`
    weights: HashMap<usize, Vec<f64>>,
}

impl LambdaTable {
    pub fn get(&self, depth: usize, count: f64) -> f64 {
        let b = bucket(count);
        self.weights
            .get(&depth)
            .and_then(|row| row.get(b))
            .copied()
            .unwrap_or(0.5)
    }

    /// Parses `depth bucket lambda` lines.
    pub fn parse(text: &str) -> Result<LambdaTable, String> {
        let mut weights: HashMap<usize, Vec<f64>> = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let depth: usize = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| format!("line {lineno}: missing depth"))?;
            let bucket_idx: usize = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| format!("line {lineno}: missing bucket"))?;
            let lambda: f64 = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| format!("line {lineno}: missing lambda"))?;
            if !(0.0..=1.0).contains(&lambda) {
                return Err(format!("line {lineno}: lambda {lambda} out of [0,1]"));
            }
            let row = weights.entry(depth).or_insert_with(|| vec![0.5; BUCKET_LIMITS.len()]);
            if bucket_idx >= row.len() {
                row.resize(bucket_idx + 1, 0.5);
            }
            row[bucket_idx] = lambda;
        }
        Ok(LambdaTable { weights })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LambdaTables {
    by_class: HashMap<CalcClass, LambdaTable>,
}

impl LambdaTables {
    pub fn insert(&mut self, class: CalcClass, table: LambdaTable) {
        self.by_class.insert(class, table);
    }

    pub fn get(&self, class: CalcClass, depth: usize, count: f64) -> f64 {
        self.by_class
            .get(&class)
            .map(|t| t.get(depth, count))
            .unwrap_or(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_is_monotone_nondecreasing() {
        assert_eq!(bucket(0.0), 0);
        assert_eq!(bucket(1.0), 1);
        assert_eq!(bucket(300.0), 12);
        assert!(bucket(10.0) >= bucket(4.0));
    }

    #[test]
    fn parses_lambda_file() {
        let text = "0 0 0.2\n0 1 0.6\n1 0 0.9\n";
        let table = LambdaTable::parse(text).unwrap();
        assert_eq!(table.get(0, 0.0), 0.2);
        assert_eq!(table.get(0, 1.0), 0.6);
        assert_eq!(table.get(1, 0.0), 0.9);
    }

    #[test]
    fn rejects_out_of_range_lambda() {
        assert!(LambdaTable::parse("0 0 1.5\n").is_err());
    }
}
