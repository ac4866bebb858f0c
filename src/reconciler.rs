//! Merge of the geography feed into the detail feed
//!
//! The detail feed (Aviation Edge) knows flight numbers, airports and airlines
//! but refreshes slowly. The geography feed (OpenSky) refreshes often but only
//! knows where an aircraft is and how it moves. The merged batch is the detail
//! batch with its kinematics overwritten by the geography feed wherever both
//! saw the same ICAO24 address.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::states::State;

/// How many detail records had each field replaced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub matched: usize,
    pub unmatched: usize,
    pub position: usize,
    pub baro_altitude: usize,
    pub geo_altitude: usize,
    pub heading: usize,
    pub speed_horizontal: usize,
    pub speed_vertical: usize,
    pub is_on_ground: usize,
}

impl ReconcileStats {
    /// Per-field counts labelled for logs and metrics
    pub fn field_updates(&self) -> [(&'static str, usize); 7] {
        [
            ("position", self.position),
            ("baro_altitude", self.baro_altitude),
            ("geo_altitude", self.geo_altitude),
            ("heading", self.heading),
            ("speed_horizontal", self.speed_horizontal),
            ("speed_vertical", self.speed_vertical),
            ("is_on_ground", self.is_on_ground),
        ]
    }

    pub fn record_metrics(&self) {
        for (field, count) in self.field_updates() {
            metrics::counter!("reconcile.field_updates_total", "field" => field)
                .increment(count as u64);
        }
        metrics::counter!("reconcile.matched_total").increment(self.matched as u64);
    }
}

/// Overwrite kinematics of `detail` records with readings from `geography`
///
/// Records are joined on ICAO24, ignoring case. The position is taken only when
/// the geography record has one (not the (0, 0) placeholder); each optional
/// kinematic field is taken only when the geography record has a value; the
/// on-ground flag is always taken. Detail records without a match pass through
/// untouched and geography-only records are dropped. The output keeps the
/// detail batch's order.
pub fn reconcile_states(geography: &[State], detail: Vec<State>) -> (Vec<State>, ReconcileStats) {
    let index: HashMap<String, &State> = geography
        .iter()
        .filter_map(|state| {
            state
                .aircraft
                .icao24
                .as_deref()
                .map(|icao24| (icao24.to_ascii_uppercase(), state))
        })
        .collect();

    let mut stats = ReconcileStats::default();

    let merged = detail
        .into_iter()
        .map(|mut state| {
            let source = state
                .aircraft
                .icao24
                .as_deref()
                .and_then(|icao24| index.get(&icao24.to_ascii_uppercase()).copied());

            match source {
                Some(source) => {
                    stats.matched += 1;
                    merge_geography(&mut state, source, &mut stats);
                }
                None => stats.unmatched += 1,
            }
            state
        })
        .collect::<Vec<_>>();

    debug!(
        "Reconciled {} detail states against {} geography states",
        merged.len(),
        geography.len()
    );
    info!(
        "Reconciled states: {} matched, {} unmatched, updates {:?}",
        stats.matched,
        stats.unmatched,
        stats.field_updates()
    );

    (merged, stats)
}

fn merge_geography(target: &mut State, source: &State, stats: &mut ReconcileStats) {
    let from = &source.geography;
    let into = &mut target.geography;

    if !from.position.is_no_data() {
        into.position = from.position;
        stats.position += 1;
    }

    fn take(into: &mut Option<f64>, from: Option<f64>, count: &mut usize) {
        if from.is_some() {
            *into = from;
            *count += 1;
        }
    }
    take(&mut into.baro_altitude, from.baro_altitude, &mut stats.baro_altitude);
    take(&mut into.geo_altitude, from.geo_altitude, &mut stats.geo_altitude);
    take(&mut into.heading, from.heading, &mut stats.heading);
    take(
        &mut into.speed_horizontal,
        from.speed_horizontal,
        &mut stats.speed_horizontal,
    );
    take(
        &mut into.speed_vertical,
        from.speed_vertical,
        &mut stats.speed_vertical,
    );

    into.is_on_ground = from.is_on_ground;
    stats.is_on_ground += 1;
}
