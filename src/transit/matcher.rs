use std::sync::Arc;
use tracing::debug;

use super::dedup::{dedup_lines, dedup_nearest};
use super::MatcherConfig;
use crate::gateway::{self, GatewayError, QueryPlan, SpatialGateway, StopHit, StopRequest};
use crate::models::{GeoPoint, NearestStop, TransitMode};

/// Nearest transit stops per point, ranked by mode tier then distance
#[derive(Clone)]
pub struct TransitMatcher {
    gateway: Arc<dyn SpatialGateway>,
    config: MatcherConfig,
}

impl TransitMatcher {
    pub fn new(gateway: Arc<dyn SpatialGateway>, config: MatcherConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub async fn nearest_one(
        &self,
        point: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> gateway::Result<Vec<NearestStop>> {
        let mut results = self.nearest_batch(&[point], radius_m, limit).await?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Match every point in two gateway round-trips: one for stops (every
    /// tier of every point), one for the lines of every selected stop.
    pub async fn nearest_batch(
        &self,
        points: &[GeoPoint],
        radius_m: f64,
        limit: usize,
    ) -> gateway::Result<Vec<Vec<NearestStop>>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let radius_m = self.config.effective_radius(radius_m);
        let limit = self.config.effective_limit(limit);
        let tiers = self.config.tiers();

        let requests: Vec<StopRequest> = points
            .iter()
            .flat_map(|point| {
                tiers.iter().map(move |tier| StopRequest {
                    point: *point,
                    radius_m,
                    // Entrances of one station collapse only after dedup, so
                    // every stop in the radius is classified
                    limit: None,
                    modes: TransitMode::in_tier(*tier).to_vec(),
                })
            })
            .collect();

        let hits = self.gateway.nearest_stops_batch(&requests).await?;
        ensure_aligned("stop", hits.len(), requests.len())?;

        let mut hits = hits.into_iter();
        let selected: Vec<Vec<(StopHit, u8)>> = points
            .iter()
            .map(|_| {
                let per_tier = tiers
                    .iter()
                    .map(|tier| (*tier, dedup_nearest(hits.next().unwrap_or_default())))
                    .collect();
                fill_by_tier(per_tier, limit)
            })
            .collect();

        let line_plans: Vec<QueryPlan> = selected
            .iter()
            .flatten()
            .map(|(hit, tier)| {
                QueryPlan::lines_near(
                    hit.stop.location,
                    self.config.line_proximity_m,
                    TransitMode::in_tier(*tier),
                )
            })
            .collect();

        let lines = if line_plans.is_empty() {
            Vec::new()
        } else {
            self.gateway.query_lines(&line_plans).await?
        };
        ensure_aligned("line", lines.len(), line_plans.len())?;

        debug!(
            points = points.len(),
            radius_m,
            limit,
            selected = line_plans.len(),
            "transit batch matched"
        );

        let mut lines = lines.into_iter();
        Ok(selected
            .into_iter()
            .map(|stops| {
                stops
                    .into_iter()
                    .map(|(hit, tier)| NearestStop {
                        stop: hit.stop.as_ref().clone(),
                        distance_m: hit.distance_m,
                        priority: tier,
                        lines: dedup_lines(lines.next().unwrap_or_default()),
                        walking_distance_m: None,
                        walking_duration_s: None,
                    })
                    .collect()
            })
            .collect())
    }
}

/// Take tiers in order, each already sorted by distance, until `limit` is reached.
pub(crate) fn fill_by_tier(per_tier: Vec<(u8, Vec<StopHit>)>, limit: usize) -> Vec<(StopHit, u8)> {
    let mut selected = Vec::with_capacity(limit);

    for (tier, hits) in per_tier {
        for hit in hits {
            if selected.len() >= limit {
                return selected;
            }
            selected.push((hit, tier));
        }
    }

    selected
}

fn ensure_aligned(what: &str, got: usize, expected: usize) -> gateway::Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(GatewayError::Internal(format!(
            "{what} batch returned {got} slots for {expected} plans"
        )))
    }
}
