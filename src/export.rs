//! Row-per-event export of a scenario set and its inverse.
//!
//! A year with events becomes one row per event; a year without events
//! becomes a single row with empty event fields. Rows carry the year totals
//! so reconstruction never recomputes them.

use std::io;

use serde::{Deserialize, Serialize};

use crate::error::{PricingError, Result};
use crate::scenario::{Event, YearRecord};
use crate::types::{EventIndex, YearIndex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRow {
    pub year: u32,
    pub event_count: u32,
    pub annual_loss: f64,
    pub event_id: Option<u32>,
    pub severity: Option<f64>,
    pub payout: Option<f64>,
    pub triggered: Option<bool>,
    pub tail_scenario: Option<String>,
}

pub fn flatten(years: &[YearRecord]) -> Vec<ScenarioRow> {
    let mut rows = Vec::with_capacity(years.len());
    for record in years {
        if record.events.is_empty() {
            rows.push(ScenarioRow {
                year: record.year.0,
                event_count: record.event_count,
                annual_loss: record.annual_loss,
                event_id: None,
                severity: None,
                payout: None,
                triggered: None,
                tail_scenario: None,
            });
            continue;
        }
        for event in &record.events {
            rows.push(ScenarioRow {
                year: record.year.0,
                event_count: record.event_count,
                annual_loss: record.annual_loss,
                event_id: Some(event.index.0),
                severity: Some(event.severity),
                payout: Some(event.payout),
                triggered: Some(event.triggered),
                tail_scenario: event.tail_scenario.clone(),
            });
        }
    }
    rows
}

/// Rebuild year records from rows produced by [`flatten`]. Rows of one year
/// must be contiguous.
pub fn unflatten(rows: &[ScenarioRow]) -> Result<Vec<YearRecord>> {
    let mut years: Vec<YearRecord> = Vec::new();
    for (line, row) in rows.iter().enumerate() {
        let starts_new = years.last().is_none_or(|y| y.year.0 != row.year);
        if starts_new {
            if let Some(prev) = years.last() {
                check_complete(prev)?;
            }
            years.push(YearRecord {
                year: YearIndex(row.year),
                event_count: row.event_count,
                events: Vec::new(),
                annual_loss: row.annual_loss,
            });
        }
        let Some(record) = years.last_mut() else {
            continue;
        };
        if record.event_count != row.event_count || record.annual_loss.to_bits() != row.annual_loss.to_bits() {
            return Err(PricingError::Export(format!(
                "row {line}: year {} totals disagree with earlier rows",
                row.year
            )));
        }
        match (row.event_id, row.severity, row.payout, row.triggered) {
            (Some(id), Some(severity), Some(payout), Some(triggered)) => record.events.push(Event {
                index: EventIndex(id),
                severity,
                triggered,
                payout,
                tail_scenario: row.tail_scenario.clone(),
            }),
            (None, None, None, None) if row.event_count == 0 => {}
            _ => {
                return Err(PricingError::Export(format!(
                    "row {line}: incomplete event fields for year {}",
                    row.year
                )));
            }
        }
    }
    if let Some(last) = years.last() {
        check_complete(last)?;
    }
    Ok(years)
}

fn check_complete(record: &YearRecord) -> Result<()> {
    if record.events.len() != record.event_count as usize {
        return Err(PricingError::Export(format!(
            "year {} declares {} events but has {} rows",
            record.year.0,
            record.event_count,
            record.events.len()
        )));
    }
    Ok(())
}

pub fn write_csv<W: io::Write>(writer: W, years: &[YearRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in flatten(years) {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(|e| PricingError::Export(e.to_string()))?;
    Ok(())
}

pub fn read_csv<R: io::Read>(reader: R) -> Result<Vec<YearRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let rows = rdr.deserialize().collect::<std::result::Result<Vec<ScenarioRow>, _>>()?;
    unflatten(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::tests::{typhoon_definition, typhoon_priors};
    use crate::scenario::{BuiltinTailCatalog, ScenarioGenerator};

    fn dataset() -> Vec<YearRecord> {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        ScenarioGenerator::new(&def, &f, &s, 42)
            .generate(1000, Some(&BuiltinTailCatalog))
            .unwrap()
            .years
    }

    #[test]
    fn empty_year_is_one_row() {
        let years = vec![YearRecord { year: YearIndex(3), event_count: 0, events: vec![], annual_loss: 0.0 }];
        let rows = flatten(&years);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_id, None);
        assert_eq!(unflatten(&rows).unwrap(), years);
    }

    #[test]
    fn rows_reconstruct_year_totals() {
        let years = dataset();
        let back = unflatten(&flatten(&years)).unwrap();
        assert_eq!(back.len(), years.len());
        for (a, b) in years.iter().zip(&back) {
            assert_eq!(a.event_count, b.event_count);
            assert_eq!(a.annual_loss.to_bits(), b.annual_loss.to_bits());
        }
        assert_eq!(back, years);
    }

    #[test]
    fn csv_is_lossless() {
        let years = dataset();
        let mut buf = Vec::new();
        write_csv(&mut buf, &years).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("year,event_count,annual_loss,event_id,severity,payout,triggered,tail_scenario"));
        let back = read_csv(buf.as_slice()).unwrap();
        assert_eq!(back, years);
    }

    #[test]
    fn blank_tail_names_survive_csv() {
        let def = typhoon_definition();
        let (f, s) = typhoon_priors();
        let oracle = vec![crate::scenario::TailScenario::new("", 2.0, 2.0, 0.2)];
        let years = ScenarioGenerator::new(&def, &f, &s, 42).generate(300, Some(&oracle)).unwrap().years;
        assert!(years.iter().flat_map(|y| &y.events).any(|e| e.tail_scenario.is_some()));
        assert!(years.iter().flat_map(|y| &y.events).all(|e| e.tail_scenario.as_deref() != Some("")));

        let mut buf = Vec::new();
        write_csv(&mut buf, &years).unwrap();
        assert_eq!(read_csv(buf.as_slice()).unwrap(), years);
    }

    #[test]
    fn missing_event_rows_are_rejected() {
        let years = dataset();
        let mut rows = flatten(&years);
        let idx = rows.iter().position(|r| r.event_count >= 2).unwrap();
        rows.remove(idx);
        assert!(matches!(unflatten(&rows), Err(PricingError::Export(_))));
    }

    #[test]
    fn disagreeing_totals_are_rejected() {
        let years = dataset();
        let mut rows = flatten(&years);
        let idx = rows.iter().position(|r| r.event_count >= 2).unwrap();
        rows[idx + 1].annual_loss += 1.0;
        assert!(matches!(unflatten(&rows), Err(PricingError::Export(_))));
    }
}
