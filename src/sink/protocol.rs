//! External plugin text protocol.
//!
//! ```text
//! CHART type.id '' 'title' 'units' 'family' 'context' charttype priority update_every
//! DIMENSION id 'name' algorithm multiplier divisor
//! BEGIN type.id [microseconds]
//! SET id = value
//! END
//! ```

use std::io::{self, Write};

use crate::collector::MetricSample;
use crate::schema::ChartDefinition;

/// Strip characters that would break the single-quoted protocol fields.
fn quote(field: &str) -> String {
    let cleaned: String = field
        .chars()
        .filter(|c| *c != '\'' && *c != '\n' && *c != '\r')
        .collect();
    format!("'{cleaned}'")
}

/// Write a CHART line followed by one DIMENSION line per dimension.
pub fn write_chart<W: Write>(w: &mut W, chart: &ChartDefinition) -> io::Result<()> {
    let meta = &chart.metadata;
    writeln!(
        w,
        "CHART {} '' {} {} {} {} {} {} {}",
        chart.id,
        quote(&meta.title),
        quote(&meta.units),
        quote(&meta.family),
        quote(&meta.context),
        meta.chart_type,
        chart.priority,
        chart.update_every,
    )?;
    for dim in &chart.dimensions {
        writeln!(
            w,
            "DIMENSION {} {} {} {} {}",
            dim.id,
            quote(&dim.name),
            dim.algorithm,
            dim.multiplier,
            dim.divisor,
        )?;
    }
    Ok(())
}

/// Write a BEGIN/SET/END block. Values that cannot be rendered as integers
/// are skipped.
pub fn write_values<W: Write>(
    w: &mut W,
    chart_id: &str,
    sample: &MetricSample,
    since_last_us: Option<u64>,
) -> io::Result<()> {
    match since_last_us {
        Some(us) => writeln!(w, "BEGIN {chart_id} {us}")?,
        None => writeln!(w, "BEGIN {chart_id}")?,
    }
    for (name, value) in sample.iter() {
        match value.as_i64() {
            Some(v) => writeln!(w, "SET {name} = {v}")?,
            None => tracing::debug!(chart = %chart_id, dimension = %name, "Skipping non-finite value"),
        }
    }
    writeln!(w, "END")
}

/// Tell the agent this plugin has nothing left to collect.
pub fn write_disable<W: Write>(w: &mut W) -> io::Result<()> {
    writeln!(w, "DISABLE")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Algorithm, ChartMetadata, ChartType, DimensionDefinition};

    fn render<F: FnOnce(&mut Vec<u8>) -> io::Result<()>>(f: F) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_write_chart() {
        let chart = ChartDefinition {
            id: "redis_local.memory".into(),
            metadata: ChartMetadata::new("Memory utilization", "kilobytes")
                .with_family("memory")
                .with_context("redis.memory")
                .with_chart_type(ChartType::Area),
            priority: 60002,
            update_every: 2,
            dimensions: vec![
                DimensionDefinition::new("used_memory")
                    .with_name("total")
                    .with_scale(1, 1024),
                DimensionDefinition::new("ops").with_algorithm(Algorithm::Incremental),
            ],
        };

        let out = render(|w| write_chart(w, &chart));
        assert_eq!(
            out,
            "CHART redis_local.memory '' 'Memory utilization' 'kilobytes' 'memory' 'redis.memory' area 60002 2\n\
             DIMENSION used_memory 'total' absolute 1 1024\n\
             DIMENSION ops 'ops' incremental 1 1\n"
        );
    }

    #[test]
    fn test_quotes_are_stripped() {
        let chart = ChartDefinition {
            id: "j.c".into(),
            metadata: ChartMetadata::new("it's\nbroken", "u"),
            priority: 1,
            update_every: 1,
            dimensions: vec![],
        };
        let out = render(|w| write_chart(w, &chart));
        assert!(out.starts_with("CHART j.c '' 'itsbroken' 'u'"));
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn test_write_values() {
        let sample = MetricSample::new()
            .with("b", 2.6)
            .with("a", 1_i64)
            .with("nan", f64::NAN);

        let out = render(|w| write_values(w, "job.chart", &sample, Some(1_000_000)));
        assert_eq!(
            out,
            "BEGIN job.chart 1000000\nSET a = 1\nSET b = 3\nEND\n"
        );

        let out = render(|w| write_values(w, "job.chart", &MetricSample::new(), None));
        assert_eq!(out, "BEGIN job.chart\nEND\n");
    }

    #[test]
    fn test_write_disable() {
        assert_eq!(render(|w| write_disable(w)), "DISABLE\n");
    }
}
