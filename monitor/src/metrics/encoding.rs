//! Exposition formats served on `/metrics`.
//!
//! The classic Prometheus text format comes straight from
//! [`prometheus::TextEncoder`]. OpenMetrics 1.0 text is written by
//! `prometheus-client`: the gathered families are replayed into a
//! throwaway `prometheus_client` registry through `GatheredFamilies`.

use std::fmt;

use prometheus::proto::{Histogram, Metric, MetricFamily, MetricType as FamilyType};
use prometheus_client::collector::Collector;
use prometheus_client::encoding::{DescriptorEncoder, EncodeMetric, MetricEncoder};
use prometheus_client::metrics::MetricType;
use prometheus_client::metrics::counter::ConstCounter;
use prometheus_client::metrics::gauge::ConstGauge;
use prometheus_client::registry::Registry;

pub const CLASSIC_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

const OPENMETRICS_MEDIA_TYPE: &str = "application/openmetrics-text";
const OPENMETRICS_VERSION: &str = "1.0.0";

/// Wire format of a scrape response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpositionFormat {
    /// Prometheus text format 0.0.4.
    #[default]
    Classic,
    /// OpenMetrics 1.0.0 text format.
    OpenMetrics,
}

impl ExpositionFormat {
    /// Picks the format from the scraper's `Accept` header.
    ///
    /// OpenMetrics is only served when it is explicitly asked for, not
    /// refused with `q=0`, and either carries no `version` parameter or
    /// asks for `1.0.0`. Anything else gets the classic format.
    pub fn negotiate(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return ExpositionFormat::Classic;
        };

        let wants_openmetrics = accept.split(',').any(|range| {
            let mut parts = range.split(';').map(str::trim);
            let media = parts.next().unwrap_or_default();
            if !media.eq_ignore_ascii_case(OPENMETRICS_MEDIA_TYPE) {
                return false;
            }
            parts.all(|param| match param.split_once('=') {
                Some((key, value)) if key.trim().eq_ignore_ascii_case("q") => value
                    .trim()
                    .parse::<f32>()
                    .map_or(true, |q| q > 0.0),
                Some((key, value)) if key.trim().eq_ignore_ascii_case("version") => {
                    value.trim() == OPENMETRICS_VERSION
                }
                _ => true,
            })
        });

        if wants_openmetrics {
            ExpositionFormat::OpenMetrics
        } else {
            ExpositionFormat::Classic
        }
    }

    /// `Content-Type` header value for a response in this format.
    pub fn content_type(self) -> &'static str {
        match self {
            ExpositionFormat::Classic => CLASSIC_CONTENT_TYPE,
            ExpositionFormat::OpenMetrics => OPENMETRICS_CONTENT_TYPE,
        }
    }
}

/// Renders metric families as OpenMetrics text, terminated by `# EOF`.
///
/// Summaries have no OpenMetrics rendering here and fail the whole
/// encoding with [`prometheus::Error::Msg`].
pub fn encode_openmetrics(families: &[MetricFamily]) -> Result<String, prometheus::Error> {
    if let Some(mf) = families
        .iter()
        .find(|mf| mf.get_field_type() == FamilyType::SUMMARY)
    {
        return Err(prometheus::Error::Msg(format!(
            "metric family {} is a summary, which has no OpenMetrics encoding",
            mf.get_name()
        )));
    }

    let mut registry = Registry::default();
    registry.register_collector(Box::new(GatheredFamilies(families.to_vec())));

    let mut out = String::with_capacity(1024);
    prometheus_client::encoding::text::encode(&mut out, &registry)
        .map_err(|e| prometheus::Error::Msg(format!("failed to write OpenMetrics text: {e}")))?;
    Ok(out)
}

/// Snapshot of `prometheus` metric families, exposed as a
/// `prometheus_client` collector.
#[derive(Debug)]
struct GatheredFamilies(Vec<MetricFamily>);

impl Collector for GatheredFamilies {
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), fmt::Error> {
        for mf in &self.0 {
            let name = mf.get_name();
            let kind = mf.get_field_type();
            let (family, metric_type) = match kind {
                FamilyType::GAUGE => (name, MetricType::Gauge),
                // OpenMetrics names the family without `_total` and puts it
                // back on the sample.
                FamilyType::COUNTER => (
                    name.strip_suffix("_total").unwrap_or(name),
                    MetricType::Counter,
                ),
                FamilyType::HISTOGRAM => (name, MetricType::Histogram),
                FamilyType::UNTYPED => (name, MetricType::Unknown),
                FamilyType::SUMMARY => return Err(fmt::Error),
            };

            let mut metric_encoder =
                encoder.encode_descriptor(family, mf.get_help(), None, metric_type)?;

            match mf.get_metric() {
                [m] if m.get_label().is_empty() => encode_sample(kind, m, metric_encoder)?,
                metrics => {
                    for m in metrics {
                        let labels: Vec<(String, String)> = m
                            .get_label()
                            .iter()
                            .map(|l| (l.get_name().to_string(), l.get_value().to_string()))
                            .collect();
                        encode_sample(kind, m, metric_encoder.encode_family(&labels)?)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn encode_sample(
    kind: FamilyType,
    m: &Metric,
    mut encoder: MetricEncoder<'_>,
) -> Result<(), fmt::Error> {
    match kind {
        FamilyType::GAUGE => ConstGauge::new(m.get_gauge().get_value()).encode(encoder),
        FamilyType::COUNTER => ConstCounter::new(m.get_counter().get_value()).encode(encoder),
        FamilyType::UNTYPED => ConstGauge::new(m.get_untyped().get_value()).encode(encoder),
        FamilyType::HISTOGRAM => {
            let h = m.get_histogram();
            encoder.encode_histogram::<prometheus_client::encoding::NoLabelSet>(
                h.get_sample_sum(),
                h.get_sample_count(),
                &bucket_counts(h),
                None,
            )
        }
        FamilyType::SUMMARY => Err(fmt::Error),
    }
}

/// Converts cumulative bucket counts into per-bucket counts, closing with
/// the `+Inf` bucket (`f64::MAX` upper bound).
fn bucket_counts(h: &Histogram) -> Vec<(f64, u64)> {
    let mut buckets = Vec::with_capacity(h.get_bucket().len() + 1);
    let mut seen = 0u64;
    for b in h.get_bucket() {
        if b.get_upper_bound().is_infinite() {
            continue;
        }
        let cumulative = b.get_cumulative_count();
        buckets.push((b.get_upper_bound(), cumulative.saturating_sub(seen)));
        seen = cumulative;
    }
    buckets.push((f64::MAX, h.get_sample_count().saturating_sub(seen)));
    buckets
}

#[cfg(test)]
mod tests {
    use prometheus::{Counter, Gauge, HistogramOpts, Opts, Registry};

    use super::*;

    #[test]
    fn negotiate_defaults_to_classic() {
        assert_eq!(ExpositionFormat::negotiate(None), ExpositionFormat::Classic);
        assert_eq!(ExpositionFormat::negotiate(Some("*/*")), ExpositionFormat::Classic);
        assert_eq!(
            ExpositionFormat::negotiate(Some("text/plain;version=0.0.4;q=0.3,*/*;q=0.1")),
            ExpositionFormat::Classic
        );
    }

    #[test]
    fn negotiate_picks_openmetrics_when_asked() {
        // Accept header sent by Prometheus 2.x scrapers.
        let prometheus = "application/openmetrics-text;version=1.0.0,application/openmetrics-text;version=0.0.1;q=0.75,text/plain;version=0.0.4;q=0.5,*/*;q=0.1";
        assert_eq!(
            ExpositionFormat::negotiate(Some(prometheus)),
            ExpositionFormat::OpenMetrics
        );
        assert_eq!(
            ExpositionFormat::negotiate(Some("application/openmetrics-text")),
            ExpositionFormat::OpenMetrics
        );
        assert_eq!(
            ExpositionFormat::negotiate(Some("application/openmetrics-text; q=0")),
            ExpositionFormat::Classic
        );
    }

    #[test]
    fn negotiate_only_serves_openmetrics_1_0_0() {
        assert_eq!(
            ExpositionFormat::negotiate(Some(
                "application/openmetrics-text;version=0.0.1,text/plain;version=0.0.4;q=0.5"
            )),
            ExpositionFormat::Classic
        );
        assert_eq!(
            ExpositionFormat::negotiate(Some("application/openmetrics-text; version=1.0.0; q=0.9")),
            ExpositionFormat::OpenMetrics
        );
    }

    #[test]
    fn openmetrics_renders_gauges_and_counters() {
        let registry = Registry::new();
        let gauge = Gauge::with_opts(
            Opts::new("balance_gwei", "The balance of a given validator.")
                .namespace("eth2")
                .subsystem("validator")
                .const_label("validator_index", "1"),
        )
        .unwrap();
        let counter = Counter::with_opts(Opts::new("polls_total", "Polls done.")).unwrap();
        registry.register(Box::new(gauge.clone())).unwrap();
        registry.register(Box::new(counter.clone())).unwrap();

        gauge.set(32_000_000_000.0);
        counter.inc_by(3.0);

        let text = encode_openmetrics(&registry.gather()).unwrap();

        assert!(text.contains("# HELP eth2_validator_balance_gwei The balance of a given validator.\n"));
        assert!(text.contains("# TYPE eth2_validator_balance_gwei gauge\n"));
        assert!(text.contains("eth2_validator_balance_gwei{validator_index=\"1\"} 32000000000"));
        assert!(text.contains("# TYPE polls counter\n"));
        assert!(text.contains("polls_total 3"));
        assert!(text.ends_with("# EOF\n"), "unexpected exposition:\n{text}");
    }

    #[test]
    fn openmetrics_renders_histograms() {
        let registry = Registry::new();
        let histogram = prometheus::Histogram::with_opts(
            HistogramOpts::new("poll_seconds", "Poll latency.").buckets(vec![0.1, 1.0]),
        )
        .unwrap();
        registry.register(Box::new(histogram.clone())).unwrap();
        histogram.observe(0.05);
        histogram.observe(0.5);
        histogram.observe(5.0);

        let families = registry.gather();
        let buckets = bucket_counts(families[0].get_metric()[0].get_histogram());
        assert_eq!(buckets, vec![(0.1, 1), (1.0, 1), (f64::MAX, 1)]);

        let text = encode_openmetrics(&families).unwrap();
        assert!(text.contains("# TYPE poll_seconds histogram\n"));
        assert!(text.contains("poll_seconds_count 3"));
        assert!(text.contains(r#"poll_seconds_bucket{le="+Inf"} 3"#), "unexpected exposition:\n{text}");
    }

    #[test]
    fn summaries_fail_the_encoding() {
        let mut family = MetricFamily::default();
        family.set_name("latency".to_string());
        family.set_help("Latency.".to_string());
        family.set_field_type(FamilyType::SUMMARY);
        family.mut_metric().push(Metric::default());

        let err = encode_openmetrics(&[family]).unwrap_err();
        assert!(err.to_string().contains("latency"), "got {err}");
    }

    #[test]
    fn empty_registry_is_just_eof() {
        assert_eq!(encode_openmetrics(&[]).unwrap(), "# EOF\n");
    }
}
