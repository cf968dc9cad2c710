//! Series identities and the two metric shapes every tree is built from.
//!
//! A [`Metric`] produces one value per record. An [`AggregateMetric`]
//! produces a fixed-width vector per record and is what the exporters
//! consume. Combinators in [`super::combinators`] and [`super::histogram`]
//! assemble aggregate trees once, up front; computing a record afterwards
//! is a sequence of slice writes with no allocation.

use crate::core::{MetricsError, Result};
use smallvec::SmallVec;
use std::fmt;

/// Key/value pair distinguishing series that share a metric name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Label list of one series. Almost every series has zero or one label.
pub type Labels = SmallVec<[Label; 1]>;

/// Name plus ordered label set. Same name with different labels is a
/// different series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricIdentity {
    pub name: String,
    pub labels: Labels,
}

impl MetricIdentity {
    /// Unlabeled series
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
        }
    }

    /// Series tagged with a single label
    pub fn with_label(
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let mut labels = Labels::new();
        labels.push(Label::new(key, value));
        Self {
            name: name.into(),
            labels,
        }
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.labels.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", label.key, label.value)?;
        }
        f.write_str("]")
    }
}

type ValueFn<E> = Box<dyn Fn(&E) -> Result<f64> + Send + Sync>;

/// Boxed compute function of an [`AggregateMetric`].
///
/// Receives the record and a destination slice exactly as wide as the
/// tree's series list.
pub type ComputeFn<E> = Box<dyn Fn(&E, &mut [f64]) -> Result<()> + Send + Sync>;

/// A single named series extracted from a record.
///
/// Only useful as input to [`super::aggregate`].
pub struct Metric<E> {
    identity: MetricIdentity,
    func: ValueFn<E>,
}

impl<E> Metric<E> {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&E) -> Result<f64> + Send + Sync + 'static,
    {
        Self::with_identity(MetricIdentity::new(name), func)
    }

    pub fn with_identity<F>(identity: MetricIdentity, func: F) -> Self
    where
        F: Fn(&E) -> Result<f64> + Send + Sync + 'static,
    {
        Self {
            identity,
            func: Box::new(func),
        }
    }

    pub fn identity(&self) -> &MetricIdentity {
        &self.identity
    }

    /// Extract this metric's value from a record
    #[inline]
    pub fn value(&self, record: &E) -> Result<f64> {
        (self.func)(record)
    }

    pub(crate) fn into_parts(self) -> (MetricIdentity, ValueFn<E>) {
        (self.identity, self.func)
    }
}

impl<E> fmt::Debug for Metric<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Ordered list of series plus the function that fills them for a record.
///
/// The series list is fixed at construction. `compute` always writes
/// exactly [`width`](Self::width) values on success; on error the
/// destination content is unspecified.
pub struct AggregateMetric<E> {
    series: Vec<MetricIdentity>,
    func: ComputeFn<E>,
}

impl<E> AggregateMetric<E> {
    /// Build an aggregate from raw parts.
    ///
    /// `func` must fill every slot of the destination it is given, which is
    /// always `series.len()` wide.
    pub fn new<F>(series: Vec<MetricIdentity>, func: F) -> Self
    where
        F: Fn(&E, &mut [f64]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            series,
            func: Box::new(func),
        }
    }

    /// Number of series, and the required destination length
    pub fn width(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Series identities in positional order
    pub fn series(&self) -> &[MetricIdentity] {
        &self.series
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.series.iter().map(|s| s.name.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &[Label]> + '_ {
        self.series.iter().map(|s| s.labels.as_slice())
    }

    /// Compute all series of `record` into `dest`.
    ///
    /// Callers zero `dest` first: accumulating metrics (histograms,
    /// parametrized splits) add onto what is there.
    #[inline]
    pub fn compute(&self, record: &E, dest: &mut [f64]) -> Result<()> {
        if dest.len() != self.series.len() {
            return Err(MetricsError::WidthMismatch {
                expected: self.series.len(),
                actual: dest.len(),
            });
        }
        (self.func)(record, dest)
    }

    pub(crate) fn into_parts(self) -> (Vec<MetricIdentity>, ComputeFn<E>) {
        (self.series, self.func)
    }
}

impl<E> fmt::Display for AggregateMetric<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "aggregate ({}):", self.series.len())?;
        for series in &self.series {
            writeln!(f, "  {series}")?;
        }
        Ok(())
    }
}

impl<E> fmt::Debug for AggregateMetric<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateMetric")
            .field("series", &self.series)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        assert_eq!(MetricIdentity::new("block_size").to_string(), "block_size");

        let mut id = MetricIdentity::with_label("calldata_txs", "inbox", "mainnet op");
        assert_eq!(id.to_string(), "calldata_txs[inbox=mainnet op]");

        id.labels.push(Label::new("chain", "1"));
        assert_eq!(id.to_string(), "calldata_txs[inbox=mainnet op,chain=1]");
    }

    #[test]
    fn test_aggregate_display() {
        let agg = AggregateMetric::<u64>::new(
            vec![
                MetricIdentity::new("a"),
                MetricIdentity::with_label("b", "k", "v"),
            ],
            |_, dest| {
                dest.fill(1.0);
                Ok(())
            },
        );
        assert_eq!(agg.to_string(), "aggregate (2):\n  a\n  b[k=v]\n");
    }

    #[test]
    fn test_compute_rejects_wrong_width() {
        let agg = AggregateMetric::<u64>::new(vec![MetricIdentity::new("a")], |rec, dest| {
            dest[0] = *rec as f64;
            Ok(())
        });

        let mut short: [f64; 0] = [];
        let err = agg.compute(&3, &mut short).unwrap_err();
        assert!(matches!(
            err,
            MetricsError::WidthMismatch {
                expected: 1,
                actual: 0
            }
        ));

        let mut dest = [0.0];
        agg.compute(&3, &mut dest).unwrap();
        assert_eq!(dest, [3.0]);
    }
}
