use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{
    QueryError, TableQuery, latest_batch_predicate, limit_clause, truncate, validate_limit,
};
use crate::geo::{longitude_in_boxes, normalize_longitude_bbox, shift_longitude_into_range};
use crate::states::State;
use crate::store::StoreGateway;

/// Latitude range plus the caller's longitude range, possibly wrapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Longitude range results are re-expressed in
    ///
    /// A box given in extended numbering (160 to 200) gets results in that
    /// numbering. A box wrapping in native numbering (170 to -170) keeps
    /// longitudes in [-180, 180], which is already the caller's numbering.
    fn output_range(&self) -> (f64, f64) {
        if self.lon_max > self.lon_min {
            (self.lon_min, self.lon_max)
        } else {
            (-180.0, 180.0)
        }
    }
}

/// The most recent batch, optionally restricted to a bounding box
#[derive(Debug, Clone)]
pub struct LatestBatchQuery {
    limit: usize,
    bbox: Option<BoundingBox>,
}

impl LatestBatchQuery {
    /// Build the query; bounds are all-or-nothing and must be finite
    pub fn new(
        limit: i64,
        lat_min: Option<f64>,
        lat_max: Option<f64>,
        lon_min: Option<f64>,
        lon_max: Option<f64>,
    ) -> Result<Self, QueryError> {
        let limit = validate_limit(limit)?;

        let bbox = match (lat_min, lat_max, lon_min, lon_max) {
            (None, None, None, None) => None,
            (Some(lat_min), Some(lat_max), Some(lon_min), Some(lon_max)) => {
                if ![lat_min, lat_max, lon_min, lon_max]
                    .iter()
                    .all(|v| v.is_finite())
                {
                    return Err(QueryError::validation(
                        "Bounding box values must be finite numbers",
                    ));
                }
                Some(BoundingBox {
                    lat_min,
                    lat_max,
                    lon_min,
                    lon_max,
                })
            }
            _ => {
                return Err(QueryError::validation(
                    "Not all bounding box values are specified",
                ));
            }
        };

        Ok(Self { limit, bbox })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    fn inside(bbox: &BoundingBox, boxes: &[(f64, f64)], state: &State) -> bool {
        let position = state.geography.position;
        bbox.lat_min <= position.latitude
            && position.latitude <= bbox.lat_max
            && longitude_in_boxes(position.longitude, boxes)
    }

    /// Re-express every longitude in the caller's numbering
    fn shift_longitudes(&self, states: &mut [State]) -> Result<(), QueryError> {
        let Some(bbox) = self.bbox else {
            return Ok(());
        };
        let (range_min, range_max) = bbox.output_range();
        for state in states.iter_mut() {
            let position = &mut state.geography.position;
            position.longitude = shift_longitude_into_range(position.longitude, range_min, range_max)
                .map_err(|e| QueryError::validation(e.to_string()))?;
        }
        Ok(())
    }

    pub(crate) fn build_sql(&self, table: &str) -> String {
        let mut sql = format!(
            "SELECT * FROM {} WHERE {}",
            table,
            latest_batch_predicate(table)
        );

        if let Some(bbox) = self.bbox {
            let conditions: Vec<String> = normalize_longitude_bbox(bbox.lon_min, bbox.lon_max)
                .into_iter()
                .map(|(box_min, box_max)| {
                    format!(
                        "(geography__position.1 BETWEEN {} AND {} AND geography__position.2 BETWEEN {} AND {})",
                        bbox.lat_min, bbox.lat_max, box_min, box_max
                    )
                })
                .collect();
            sql.push_str(&format!(" AND ({})", conditions.join(" OR ")));
        }

        sql.push_str(&limit_clause(self.limit));
        sql
    }
}

#[async_trait]
impl TableQuery<State> for LatestBatchQuery {
    fn name(&self) -> &'static str {
        "latest_batch"
    }

    fn allows_cache(&self) -> bool {
        true
    }

    fn from_cache(&self, snapshot: Vec<State>) -> Result<Vec<State>, QueryError> {
        debug!("Retrieved {} states from cache", snapshot.len());

        let mut states = match self.bbox {
            Some(bbox) => {
                let boxes = normalize_longitude_bbox(bbox.lon_min, bbox.lon_max);
                let filtered: Vec<State> = snapshot
                    .into_iter()
                    .filter(|state| Self::inside(&bbox, &boxes, state))
                    .collect();
                debug!("Filtered to {} states by bbox {:?}", filtered.len(), bbox);
                filtered
            }
            None => snapshot,
        };

        states = truncate(states, self.limit);
        self.shift_longitudes(&mut states)?;

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
        let mut states = rows
            .iter()
            .map(|row| self.decode_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        self.shift_longitudes(&mut states)?;

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
    use crate::store::testing::RecordingStore;
    use chrono::Utc;

    fn state_at(callsign: &str, lat: f64, lon: f64) -> State {
        let mut state = State::new(Utc::now(), DataSource::OpenskyNetwork);
        state.flight.icao = callsign.to_string();
        state.geography.position = Position::new(lat, lon);
        state
    }

    fn snapshot() -> Vec<State> {
        vec![
            state_at("AAA", 10.0, 10.0),
            state_at("BBB", 50.0, 170.0),
            state_at("CCC", 50.0, -170.0),
            state_at("DDD", 70.0, 175.0),
        ]
    }

    fn callsigns(states: &[State]) -> Vec<&str> {
        states.iter().map(|s| s.flight.icao.as_str()).collect()
    }

    #[test]
    fn test_rejects_negative_limit() {
        assert!(matches!(
            LatestBatchQuery::new(-5, None, None, None, None),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_partial_bbox() {
        assert!(matches!(
            LatestBatchQuery::new(0, Some(0.0), Some(10.0), Some(0.0), None),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_non_finite_bbox() {
        assert!(matches!(
            LatestBatchQuery::new(0, Some(0.0), Some(f64::NAN), Some(0.0), Some(10.0)),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn test_cache_without_bbox_returns_all_in_order() {
        let query = LatestBatchQuery::new(0, None, None, None, None).unwrap();
        let result = query.from_cache(snapshot()).unwrap();
        assert_eq!(callsigns(&result), vec!["AAA", "BBB", "CCC", "DDD"]);
    }

    #[test]
    fn test_cache_limit() {
        let query = LatestBatchQuery::new(2, None, None, None, None).unwrap();
        let result = query.from_cache(snapshot()).unwrap();
        assert_eq!(callsigns(&result), vec!["AAA", "BBB"]);
    }

    #[test]
    fn test_cache_bbox_across_seam_native_numbering() {
        let query =
            LatestBatchQuery::new(0, Some(0.0), Some(60.0), Some(160.0), Some(-160.0)).unwrap();
        let result = query.from_cache(snapshot()).unwrap();
        assert_eq!(callsigns(&result), vec!["BBB", "CCC"]);
        assert_eq!(result[0].geography.position.longitude, 170.0);
        assert_eq!(result[1].geography.position.longitude, -170.0);
    }

    #[test]
    fn test_cache_bbox_across_seam_extended_numbering() {
        let query =
            LatestBatchQuery::new(0, Some(0.0), Some(60.0), Some(160.0), Some(200.0)).unwrap();
        let result = query.from_cache(snapshot()).unwrap();
        assert_eq!(callsigns(&result), vec!["BBB", "CCC"]);
        assert_eq!(result[0].geography.position.longitude, 170.0);
        assert_eq!(result[1].geography.position.longitude, 190.0);
    }

    #[test]
    fn test_cache_bbox_latitude_bound() {
        let query =
            LatestBatchQuery::new(0, Some(60.0), Some(80.0), Some(160.0), Some(-160.0)).unwrap();
        let result = query.from_cache(snapshot()).unwrap();
        assert_eq!(callsigns(&result), vec!["DDD"]);
    }

    #[test]
    fn test_sql_without_bbox() {
        let query = LatestBatchQuery::new(0, None, None, None, None).unwrap();
        assert_eq!(
            query.build_sql("state"),
            "SELECT * FROM state WHERE time = (SELECT MAX(time) FROM state)"
        );
    }

    #[test]
    fn test_sql_splits_bbox_at_seam() {
        let query =
            LatestBatchQuery::new(10, Some(0.0), Some(60.0), Some(160.0), Some(-160.0)).unwrap();
        assert_eq!(
            query.build_sql("state"),
            "SELECT * FROM state WHERE time = (SELECT MAX(time) FROM state) AND (\
             (geography__position.1 BETWEEN 0 AND 60 AND geography__position.2 BETWEEN 160 AND 180) OR \
             (geography__position.1 BETWEEN 0 AND 60 AND geography__position.2 BETWEEN -180 AND -160)\
             ) LIMIT 10"
        );
    }

    #[tokio::test]
    async fn test_server_path_decodes_and_shifts() {
        let store = RecordingStore::new();
        store.push_response(vec![state_at("CCC", 50.0, -170.0).to_row()]);

        let query =
            LatestBatchQuery::new(0, Some(0.0), Some(60.0), Some(160.0), Some(200.0)).unwrap();
        let result = query.from_server("state", &store).await.unwrap();

        assert_eq!(store.query_count(), 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].geography.position.longitude, 190.0);
    }

    #[tokio::test]
    async fn test_server_error_is_upstream() {
        let store = RecordingStore::new();
        store.push_error("connection refused");

        let query = LatestBatchQuery::new(0, None, None, None, None).unwrap();
        let err = query.from_server("state", &store).await.unwrap_err();
        assert!(matches!(err, QueryError::Upstream(_)));
    }
}
