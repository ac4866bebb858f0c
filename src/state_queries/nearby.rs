use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{
    QueryError, TableQuery, latest_batch_predicate, limit_clause, truncate, validate_limit,
};
use crate::geo::great_circle_distance_km;
use crate::states::State;
use crate::store::StoreGateway;

/// States of the latest batch within `radius_km` of a point
#[derive(Debug, Clone)]
pub struct NearbyQuery {
    latitude: f64,
    longitude: f64,
    radius_km: f64,
    limit: usize,
}

impl NearbyQuery {
    pub fn new(latitude: f64, longitude: f64, radius_km: f64, limit: i64) -> Result<Self, QueryError> {
        let limit = validate_limit(limit)?;
        // Written as negations so NaN fails every check
        if !(radius_km > 0.0 && radius_km.is_finite()) {
            return Err(QueryError::validation(format!(
                "Radius must be a number larger than 0 (got {})",
                radius_km
            )));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(QueryError::validation(format!(
                "Latitude must be between -90 and 90 (got {})",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(QueryError::validation(format!(
                "Longitude must be between -180 and 180 (got {})",
                longitude
            )));
        }

        Ok(Self {
            latitude,
            longitude,
            radius_km,
            limit,
        })
    }

    fn distance_km(&self, state: &State) -> f64 {
        let position = state.geography.position;
        great_circle_distance_km(
            position.latitude,
            position.longitude,
            self.latitude,
            self.longitude,
        )
    }

    pub(crate) fn build_sql(&self, table: &str) -> String {
        // greatCircleDistance takes (lon, lat) pairs and returns metres
        format!(
            "SELECT * FROM {} WHERE {} AND greatCircleDistance(geography__position.2, geography__position.1, {}, {}) <= {}{}",
            table,
            latest_batch_predicate(table),
            self.longitude,
            self.latitude,
            self.radius_km * 1000.0,
            limit_clause(self.limit)
        )
    }
}

#[async_trait]
impl TableQuery<State> for NearbyQuery {
    fn name(&self) -> &'static str {
        "nearby"
    }

    fn allows_cache(&self) -> bool {
        true
    }

    fn from_cache(&self, snapshot: Vec<State>) -> Result<Vec<State>, QueryError> {
        debug!("Retrieved {} states from cache", snapshot.len());

        let states: Vec<State> = snapshot
            .into_iter()
            .filter(|state| self.distance_km(state) <= self.radius_km)
            .collect();
        debug!(
            "Filtered to {} states by radius ({} km)",
            states.len(),
            self.radius_km
        );

        let states = truncate(states, self.limit);
        info!("Retrieved {} matching states from cache", states.len());
        Ok(states)
    }

    async fn from_server(
        &self,
        table: &str,
        store: &dyn StoreGateway,
    ) -> Result<Vec<State>, QueryError> {
        let sql = self.build_sql(table);
        debug!("Querying store with \"{}\"", sql);

        let rows = store.query(&sql).await?;
        let states = rows
            .iter()
            .map(|row| self.decode_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Retrieved {} matching states from store", states.len());
        Ok(states)
    }

    fn decode_row(&self, row: &[Value]) -> Result<State, QueryError> {
        State::from_row(row).map_err(QueryError::Upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::{DataSource, Position};
    use chrono::Utc;

    fn state_at(callsign: &str, lat: f64, lon: f64) -> State {
        let mut state = State::new(Utc::now(), DataSource::OpenskyNetwork);
        state.flight.icao = callsign.to_string();
        state.geography.position = Position::new(lat, lon);
        state
    }

    #[test]
    fn test_rejects_out_of_range_latitude() {
        assert!(matches!(
            NearbyQuery::new(100.0, 0.0, 10.0, 0),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(NearbyQuery::new(0.0, 181.0, 10.0, 0).is_err());
        assert!(NearbyQuery::new(0.0, 0.0, 0.0, 0).is_err());
        assert!(NearbyQuery::new(0.0, 0.0, -3.0, 0).is_err());
        assert!(NearbyQuery::new(0.0, 0.0, f64::NAN, 0).is_err());
        assert!(NearbyQuery::new(f64::NAN, 0.0, 10.0, 0).is_err());
        assert!(NearbyQuery::new(0.0, 0.0, 10.0, -1).is_err());
    }

    #[test]
    fn test_radius_containment() {
        // Grid around Schiphol, every 0.25 degrees
        let mut snapshot = Vec::new();
        for i in -8..=8 {
            for j in -8..=8 {
                let lat = 52.3 + i as f64 * 0.25;
                let lon = 4.76 + j as f64 * 0.25;
                snapshot.push(state_at(&format!("G{}_{}", i, j), lat, lon));
            }
        }

        let radius = 75.0;
        let query = NearbyQuery::new(52.3, 4.76, radius, 0).unwrap();
        let result = query.from_cache(snapshot.clone()).unwrap();

        for state in &result {
            assert!(query.distance_km(state) <= radius);
        }
        let expected = snapshot
            .iter()
            .filter(|s| query.distance_km(s) <= radius)
            .count();
        assert_eq!(result.len(), expected);
        assert!(expected > 1 && expected < snapshot.len());
    }

    #[test]
    fn test_cache_limit_keeps_stored_order() {
        let snapshot = vec![
            state_at("A", 0.0, 0.1),
            state_at("B", 0.0, 0.2),
            state_at("C", 0.0, 0.3),
        ];
        let query = NearbyQuery::new(0.0, 0.0, 100.0, 2).unwrap();
        let result = query.from_cache(snapshot).unwrap();
        let callsigns: Vec<&str> = result.iter().map(|s| s.flight.icao.as_str()).collect();
        assert_eq!(callsigns, vec!["A", "B"]);
    }

    #[test]
    fn test_sql() {
        let query = NearbyQuery::new(52.5, 4.75, 25.0, 5).unwrap();
        assert_eq!(
            query.build_sql("state"),
            "SELECT * FROM state WHERE time = (SELECT MAX(time) FROM state) \
             AND greatCircleDistance(geography__position.2, geography__position.1, 4.75, 52.5) <= 25000 LIMIT 5"
        );
    }
}
