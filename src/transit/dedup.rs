//! Collapse access points of the same physical station.
//!
//! OSM maps a station as several nodes (platforms, entrances, stop positions)
//! sharing a name. Within one tier of one search point those collapse to the
//! nearest instance.

use hashbrown::HashMap;
use std::sync::Arc;

use crate::gateway::StopHit;
use crate::models::TransitLine;

/// Keep the nearest stop per normalized-name key, sorted by ascending distance.
///
/// Equal distances are ordered by stop id so repeated calls give the same output.
pub fn dedup_nearest(hits: impl IntoIterator<Item = StopHit>) -> Vec<StopHit> {
    let mut best: HashMap<String, StopHit> = HashMap::new();

    for hit in hits {
        match best.get_mut(hit.stop.dedup_key()) {
            Some(existing) => {
                if hit.distance_m < existing.distance_m
                    || (hit.distance_m == existing.distance_m && hit.stop.id < existing.stop.id)
                {
                    *existing = hit;
                }
            }
            None => {
                best.insert(hit.stop.dedup_key().to_string(), hit);
            }
        }
    }

    let mut kept: Vec<StopHit> = best.into_values().collect();
    kept.sort_by(|a, b| {
        a.distance_m
            .total_cmp(&b.distance_m)
            .then_with(|| a.stop.id.cmp(&b.stop.id))
    });
    kept
}

/// Drop direction variants of the same route, keeping the first seen.
/// Output is ordered by (mode tier, reference or name).
pub fn dedup_lines(lines: impl IntoIterator<Item = Arc<TransitLine>>) -> Vec<TransitLine> {
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut kept = Vec::new();

    for line in lines {
        if seen.insert(line.dedup_key(), ()).is_none() {
            kept.push(line.as_ref().clone());
        }
    }

    kept.sort_by(|a, b| {
        let label_a = a.reference.as_deref().unwrap_or(&a.name);
        let label_b = b.reference.as_deref().unwrap_or(&b.name);
        a.mode
            .tier()
            .cmp(&b.mode.tier())
            .then_with(|| label_a.cmp(label_b))
            .then_with(|| a.id.cmp(&b.id))
    });
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, TransitMode, TransitStop};
    use std::collections::HashMap as StdHashMap;

    fn hit(id: &str, name: &str, distance_m: f64) -> StopHit {
        StopHit {
            stop: Arc::new(TransitStop::new(
                id,
                StdHashMap::from([("default".to_string(), name.to_string())]),
                TransitMode::Metro,
                GeoPoint::new(41.38, 2.17),
            )),
            distance_m,
        }
    }

    fn line(id: &str, reference: Option<&str>, name: &str, mode: TransitMode) -> Arc<TransitLine> {
        Arc::new(TransitLine {
            id: id.to_string(),
            reference: reference.map(str::to_string),
            name: name.to_string(),
            color: None,
            mode,
        })
    }

    #[test]
    fn test_same_key_keeps_nearest() {
        let kept = dedup_nearest(vec![
            hit("node/1", "Passeig de Gràcia", 220.0),
            hit("node/2", "Universitat", 300.0),
            hit("node/3", "passeig de gràcia", 90.0),
            hit("node/4", "Passeig-de-Gràcia", 150.0),
        ]);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].stop.id, "node/3");
        assert_eq!(kept[1].stop.id, "node/2");
    }

    #[test]
    fn test_equal_distance_is_deterministic() {
        for _ in 0..5 {
            let kept = dedup_nearest(vec![
                hit("node/9", "Diagonal", 100.0),
                hit("node/5", "Diagonal", 100.0),
            ]);
            assert_eq!(kept.len(), 1);
            assert_eq!(kept[0].stop.id, "node/5");
        }
    }

    #[test]
    fn test_unnamed_stops_do_not_collapse() {
        let kept = dedup_nearest(vec![hit("node/1", "", 10.0), hit("node/2", "", 20.0)]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_lines_collapse_directions_and_sort() {
        let kept = dedup_lines(vec![
            line("relation/3", Some("V15"), "V15: Barceloneta => Ronda", TransitMode::Bus),
            line("relation/1", Some("L3"), "L3: Zona Universitària => Trinitat Nova", TransitMode::Metro),
            line("relation/2", Some("L3"), "L3: Trinitat Nova => Zona Universitària", TransitMode::Metro),
            line("relation/4", None, "Tramvia Blau", TransitMode::Tram),
        ]);

        let ids: Vec<&str> = kept.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["relation/1", "relation/4", "relation/3"]);
    }
}
