//! Seeded row generator

use crate::datagen::schema::{ColumnKind, ColumnSchema, SchemaInfo};
use crate::storage::{DimValue, Row, TimeRange};

/// Default generator seed
pub const DEFAULT_SEED: u64 = 9999;

/// Per-column sampling state
#[derive(Debug, Clone)]
struct Sampler {
    counter: u64,
    /// Cumulative Zipf distribution, built once
    cdf: Vec<f64>,
}

impl Sampler {
    fn new(column: &ColumnSchema) -> Self {
        let cdf = match &column.kind {
            ColumnKind::Zipf {
                start,
                end,
                exponent,
            } => {
                let n = (end - start).max(1) as usize;
                let weights: Vec<f64> = (1..=n).map(|rank| 1.0 / (rank as f64).powf(*exponent)).collect();
                let total: f64 = weights.iter().sum();
                let mut acc = 0.0;
                weights
                    .iter()
                    .map(|w| {
                        acc += w / total;
                        acc
                    })
                    .collect()
            }
            _ => Vec::new(),
        };
        Self { counter: 0, cdf }
    }

    fn next_sequence(&mut self, start: i64, end: i64) -> i64 {
        let span = (end - start).max(1) as u64;
        let value = start + (self.counter % span) as i64;
        self.counter += 1;
        value
    }
}

/// Deterministic, restartable source of synthetic rows
///
/// Rows come in groups of `rollup_opportunity` that share a timestamp and
/// dimension tuple, so a rollup index folds each group into one fact.
/// Metrics are drawn per row.
#[derive(Debug, Clone)]
pub struct RowGenerator {
    schema: SchemaInfo,
    seed: u64,
    rng: fastrand::Rng,
    samplers: Vec<Sampler>,
    interval: TimeRange,
    time_step: i64,
    rollup_opportunity: usize,
    group_index: u64,
    group_pos: usize,
    template: Option<(i64, Vec<(usize, DimValue)>)>,
    rows_generated: u64,
}

impl RowGenerator {
    /// Generator over the schema's data interval, one millisecond per group
    pub fn new(schema: SchemaInfo, seed: u64) -> Self {
        let interval = schema.data_interval;
        Self::with_interval(schema, seed, interval, 1)
    }

    /// Spread `rows` rows evenly across `interval`
    pub fn spread(schema: SchemaInfo, seed: u64, interval: TimeRange, rows: usize) -> Self {
        let step = (interval.duration_millis() / rows.max(1) as i64).max(1);
        Self::with_interval(schema, seed, interval, step)
    }

    fn with_interval(schema: SchemaInfo, seed: u64, interval: TimeRange, time_step: i64) -> Self {
        let samplers = schema.columns.iter().map(Sampler::new).collect();
        Self {
            schema,
            seed,
            rng: fastrand::Rng::with_seed(seed),
            samplers,
            interval,
            time_step,
            rollup_opportunity: 1,
            group_index: 0,
            group_pos: 0,
            template: None,
            rows_generated: 0,
        }
    }

    /// Rows per shared (timestamp, dimensions) group; 0 behaves as 1
    pub fn with_rollup_opportunity(mut self, k: usize) -> Self {
        self.rollup_opportunity = k.max(1);
        self
    }

    pub fn schema(&self) -> &SchemaInfo {
        &self.schema
    }

    pub fn rows_generated(&self) -> u64 {
        self.rows_generated
    }

    /// Restart the sequence from the beginning
    pub fn reset(&mut self) {
        self.rng = fastrand::Rng::with_seed(self.seed);
        self.samplers = self.schema.columns.iter().map(Sampler::new).collect();
        self.group_index = 0;
        self.group_pos = 0;
        self.template = None;
        self.rows_generated = 0;
    }

    /// Produce the next row
    pub fn next_row(&mut self) -> Row {
        if self.group_pos == 0 || self.template.is_none() {
            let template = self.next_template();
            self.template = Some(template);
        }

        let mut row = match &self.template {
            Some((timestamp, dims)) => {
                let mut row = Row::new(*timestamp);
                for (idx, value) in dims {
                    row = row.dim(self.schema.columns[*idx].name.clone(), value.clone());
                }
                row
            }
            None => Row::new(self.interval.start),
        };

        for idx in 0..self.schema.columns.len() {
            if self.schema.columns[idx].kind.is_metric() {
                let value = self.draw_metric(idx);
                row = row.metric(self.schema.columns[idx].name.clone(), value);
            }
        }

        self.group_pos = (self.group_pos + 1) % self.rollup_opportunity;
        self.rows_generated += 1;
        row
    }

    fn next_template(&mut self) -> (i64, Vec<(usize, DimValue)>) {
        let duration = self.interval.duration_millis().max(1);
        let offset = (self.group_index as i64).saturating_mul(self.time_step) % duration;
        let timestamp = self.interval.start.saturating_add(offset);
        self.group_index += 1;

        let mut dims = Vec::new();
        for idx in 0..self.schema.columns.len() {
            if !self.schema.columns[idx].kind.is_metric() {
                let value = self.draw_dimension(idx);
                dims.push((idx, value));
            }
        }
        (timestamp, dims)
    }

    fn draw_dimension(&mut self, idx: usize) -> DimValue {
        let column = &self.schema.columns[idx];
        let sampler = &mut self.samplers[idx];
        let rng = &mut self.rng;

        let value = match &column.kind {
            ColumnKind::Sequential { start, end } => {
                DimValue::from(sampler.next_sequence(*start, *end).to_string())
            }
            ColumnKind::Uniform { start, end } => {
                DimValue::from(rng.i64(*start..(*end).max(start + 1)).to_string())
            }
            ColumnKind::Zipf { start, .. } => {
                let u = rng.f64();
                let rank = sampler
                    .cdf
                    .partition_point(|c| *c < u)
                    .min(sampler.cdf.len().saturating_sub(1));
                DimValue::from((start + rank as i64).to_string())
            }
            ColumnKind::Enumerated { values, weights } => {
                let total: f64 = weights.iter().sum();
                let mut target = rng.f64() * total;
                let mut chosen = values.len().saturating_sub(1);
                for (i, w) in weights.iter().enumerate() {
                    if target < *w {
                        chosen = i;
                        break;
                    }
                    target -= w;
                }
                values.get(chosen).cloned().into()
            }
            ColumnKind::MultiValue { values, max_values } => {
                let max = (*max_values).clamp(1, values.len().max(1));
                let count = rng.usize(1..=max);
                let mut picks: Vec<usize> = (0..values.len()).collect();
                rng.shuffle(&mut picks);
                picks.truncate(count);
                picks.sort_unstable();
                DimValue::from(
                    picks
                        .into_iter()
                        .filter_map(|i| values.get(i).cloned())
                        .collect::<Vec<_>>(),
                )
            }
            _ => DimValue::Null,
        };

        if column.null_probability > 0.0 && rng.f64() < column.null_probability {
            DimValue::Null
        } else {
            value
        }
    }

    fn draw_metric(&mut self, idx: usize) -> f64 {
        let column = &self.schema.columns[idx];
        let sampler = &mut self.samplers[idx];
        let rng = &mut self.rng;

        match &column.kind {
            ColumnKind::LongSequential { start, end } => sampler.next_sequence(*start, *end) as f64,
            ColumnKind::LongUniform { start, end } => rng.i64(*start..(*end).max(start + 1)) as f64,
            ColumnKind::DoubleNormal { mean, stddev } => {
                // Box-Muller
                let u1 = 1.0 - rng.f64();
                let u2 = rng.f64();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                mean + stddev * z
            }
            ColumnKind::DoubleUniform { min, max } => min + rng.f64() * (max - min),
            _ => 0.0,
        }
    }
}

impl Iterator for RowGenerator {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        Some(self.next_row())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_rows() {
        let a: Vec<Row> = RowGenerator::new(SchemaInfo::basic(), 42).take(200).collect();
        let b: Vec<Row> = RowGenerator::new(SchemaInfo::basic(), 42).take(200).collect();
        let c: Vec<Row> = RowGenerator::new(SchemaInfo::basic(), 43).take(200).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut gen = RowGenerator::new(SchemaInfo::basic(), DEFAULT_SEED).with_rollup_opportunity(3);
        let first: Vec<Row> = (0..50).map(|_| gen.next_row()).collect();
        assert_eq!(gen.rows_generated(), 50);

        gen.reset();
        assert_eq!(gen.rows_generated(), 0);
        let again: Vec<Row> = (0..50).map(|_| gen.next_row()).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_rollup_groups_share_key() {
        let rows: Vec<Row> = RowGenerator::new(SchemaInfo::basic(), 1)
            .with_rollup_opportunity(4)
            .take(40)
            .collect();

        for group in rows.chunks(4) {
            for row in &group[1..] {
                assert_eq!(row.timestamp, group[0].timestamp);
                assert_eq!(row.dimensions, group[0].dimensions);
            }
        }
        assert_ne!(rows[0].dimensions, rows[4].dimensions);
    }

    #[test]
    fn test_zero_rollup_opportunity_is_one() {
        let rows: Vec<Row> = RowGenerator::new(SchemaInfo::simple(), 1)
            .with_rollup_opportunity(0)
            .take(3)
            .collect();
        assert_ne!(rows[0].dimensions, rows[1].dimensions);
    }

    #[test]
    fn test_value_ranges_and_nulls() {
        let rows: Vec<Row> = RowGenerator::new(SchemaInfo::basic(), 7).take(2000).collect();

        let nulls = rows
            .iter()
            .filter(|r| r.dimensions.get("dimSequentialHalfNull") == Some(&DimValue::Null))
            .count();
        assert!(nulls > 800 && nulls < 1200, "nulls {}", nulls);

        for row in &rows {
            let zipf: i64 = row.dimensions["dimZipf"].values()[0].parse().unwrap();
            assert!((1..101).contains(&zipf));
            let multi = row.dimensions["dimMultivalEnumerated"].values().len();
            assert!((1..=3).contains(&multi));
            let uniform = row.metrics["metLongUniform"];
            assert!((0.0..500.0).contains(&uniform));
        }

        // Zipf favours low ranks
        let ones = rows
            .iter()
            .filter(|r| r.dimensions["dimZipf"] == DimValue::from("1"))
            .count();
        assert!(ones > 200, "rank 1 drawn {} times", ones);
    }

    #[test]
    fn test_spread_covers_interval() {
        let schema = SchemaInfo::simple();
        let interval = schema.data_interval;
        let rows: Vec<Row> = RowGenerator::spread(schema, 1, interval, 100).take(100).collect();

        assert!(rows.iter().all(|r| interval.contains(r.timestamp)));
        assert_eq!(rows[0].timestamp, interval.start);
        assert_eq!(rows[1].timestamp - rows[0].timestamp, interval.duration_millis() / 100);
    }
}
