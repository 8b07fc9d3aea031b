//! Distance routing over cached neighbor lists
//!
//! A greedy walk toward a target identifier: starting from a vantage line,
//! consult its neighbor cache, and hand the query to the visible neighbor
//! closest to the target for as long as that strictly improves the
//! distance. At the fixed point the ranked candidates are the answer.
//!
//! When the fixed point is the target's own line, the answer also rewires
//! the topology: the target's cache is replaced by the best candidates and
//! each of them learns about the target. That mutation lives in
//! [`DistanceRouter::link`] so the walk itself stays read-only.

use std::collections::HashSet;
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::error::SwitchResult;
use crate::identifier::Identifier;
use crate::line::NEIGHBOR_CAP;
use crate::table::LineTable;

/// Default bound on hops for a single walk.
pub const DEFAULT_MAX_HOPS: usize = 16;

/// Result of a read-only walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk {
    /// End identifier of the last vantage consulted, if any was known.
    pub vantage_end: Option<Identifier>,
    /// Visible candidates of the last vantage, closest to the target first.
    pub candidates: Vec<Identifier>,
    /// Whether the walk reached a local optimum, as opposed to running out
    /// of hops or revisiting a vantage.
    pub settled: bool,
    /// Vantages delegated to after the first.
    pub hops: usize,
}

impl Walk {
    fn empty(vantage_end: Option<Identifier>, hops: usize) -> Self {
        Self {
            vantage_end,
            candidates: Vec::new(),
            settled: true,
            hops,
        }
    }
}

enum Step {
    UnknownVantage,
    NoCandidates(Identifier),
    Settled(Identifier, Vec<Identifier>),
    Forward(Identifier, Vec<Identifier>, SocketAddr),
}

/// Nearest-neighbor search over a [`LineTable`].
#[derive(Debug, Clone, Copy)]
pub struct DistanceRouter<'a> {
    table: &'a LineTable,
    max_hops: usize,
}

impl<'a> DistanceRouter<'a> {
    pub fn new(table: &'a LineTable, max_hops: usize) -> Self {
        Self { table, max_hops }
    }

    /// Best known approximation of the visible peers nearest to `target`,
    /// as seen from `vantage`.
    ///
    /// Returns an empty list for an unknown vantage. When the walk settles
    /// on the target's own line its neighbor cache is refreshed.
    pub fn nearest_to(&self, target: &Identifier, vantage: SocketAddr) -> SwitchResult<Vec<Identifier>> {
        let walk = self.walk(target, vantage)?;
        if walk.settled && walk.vantage_end.as_ref() == Some(target) && !walk.candidates.is_empty() {
            self.link(target, &walk.candidates)?;
        }
        Ok(walk.candidates)
    }

    /// Read-only greedy walk from `vantage` toward `target`.
    pub fn walk(&self, target: &Identifier, vantage: SocketAddr) -> SwitchResult<Walk> {
        let mut visited = HashSet::new();
        let mut current = vantage;
        let mut hops = 0;

        loop {
            visited.insert(current);
            match self.step(target, current)? {
                Step::UnknownVantage => return Ok(Walk::empty(None, hops)),
                Step::NoCandidates(end) => return Ok(Walk::empty(Some(end), hops)),
                Step::Settled(end, candidates) => {
                    debug!(
                        target = %target,
                        vantage = %current,
                        hops,
                        count = candidates.len(),
                        "Walk settled"
                    );
                    return Ok(Walk {
                        vantage_end: Some(end),
                        candidates,
                        settled: true,
                        hops,
                    });
                }
                Step::Forward(end, candidates, next) => {
                    // Forwarding needs a strictly closer vantage, so distances
                    // fall along the walk and a revisit cannot happen. The hop
                    // limit is the live bound; the visited set stays as a
                    // backstop.
                    if hops >= self.max_hops || visited.contains(&next) {
                        warn!(
                            target = %target,
                            vantage = %current,
                            next = %next,
                            hops,
                            "Walk cut short, returning best known candidates"
                        );
                        return Ok(Walk {
                            vantage_end: Some(end),
                            candidates,
                            settled: false,
                            hops,
                        });
                    }
                    current = next;
                    hops += 1;
                }
            }
        }
    }

    fn step(&self, target: &Identifier, vantage: SocketAddr) -> SwitchResult<Step> {
        let Some(line) = self.table.get_by_endpoint(&vantage)? else {
            return Ok(Step::UnknownVantage);
        };
        let (vantage_end, neighbors) = {
            let line = line.lock()?;
            (*line.end(), line.neighbors().to_vec())
        };

        let mut ranked: Vec<(Identifier, SocketAddr)> = Vec::with_capacity(neighbors.len());
        for id in neighbors {
            if let Some(neighbor) = self.table.get(&id)? {
                let neighbor = neighbor.lock()?;
                if neighbor.is_visible() {
                    ranked.push((id, neighbor.endpoint()));
                }
            }
        }
        ranked.sort_by_key(|(id, _)| target.distance(id));

        let Some(&(closest, closest_endpoint)) = ranked.first() else {
            return Ok(Step::NoCandidates(vantage_end));
        };
        let candidates: Vec<Identifier> = ranked.iter().map(|(id, _)| *id).collect();

        if closest == vantage_end || target.distance(&closest) >= target.distance(&vantage_end) {
            Ok(Step::Settled(vantage_end, candidates))
        } else {
            Ok(Step::Forward(vantage_end, candidates, closest_endpoint))
        }
    }

    /// Replace `target`'s neighbor cache with the best of `ranked` and
    /// insert `target` into each of those neighbors' caches.
    ///
    /// Locks one line at a time.
    pub fn link(&self, target: &Identifier, ranked: &[Identifier]) -> SwitchResult<()> {
        let Some(line) = self.table.get(target)? else {
            return Ok(());
        };
        let chosen = {
            let mut line = line.lock()?;
            let before = line.neighbors().len();
            line.neighbors.replace_with(ranked.iter().take(NEIGHBOR_CAP).copied());
            debug!(
                target = %target,
                before,
                after = line.neighbors().len(),
                "Refreshed neighbor cache"
            );
            line.neighbors().to_vec()
        };

        for id in chosen {
            if let Some(neighbor) = self.table.get(&id)? {
                let mut neighbor = neighbor.lock()?;
                if neighbor.add_neighbor(*target) {
                    debug!(target = %target, into = %neighbor.endpoint(), "Seeded target into neighbor");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Line;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn add_line(table: &LineTable, port: u16, visible: bool) -> Identifier {
        let mut line = Line::with_ring(addr(port), u32::from(port), 1);
        line.set_visible(visible);
        let id = *line.end();
        table.insert(line).unwrap();
        id
    }

    fn set_neighbors(table: &LineTable, owner: &Identifier, ids: &[Identifier]) {
        let line = table.get(owner).unwrap().unwrap();
        line.lock().unwrap().neighbors.replace_with(ids.iter().copied());
    }

    fn neighbors_of(table: &LineTable, owner: &Identifier) -> Vec<Identifier> {
        table.get(owner).unwrap().unwrap().lock().unwrap().neighbors().to_vec()
    }

    #[test]
    fn test_unknown_vantage_returns_empty_without_mutation() {
        let table = LineTable::new();
        let a = add_line(&table, 9001, true);
        let router = DistanceRouter::new(&table, DEFAULT_MAX_HOPS);

        let result = router.nearest_to(&a, addr(9999)).unwrap();
        assert!(result.is_empty());
        assert_eq!(table.len().unwrap(), 1);
        assert!(neighbors_of(&table, &a).is_empty());
    }

    #[test]
    fn test_invisible_and_missing_neighbors_are_filtered() {
        let table = LineTable::new();
        let target = add_line(&table, 9000, true);
        let visible = add_line(&table, 9001, true);
        let hidden = add_line(&table, 9002, false);
        let missing = Identifier::of(&addr(9003));
        set_neighbors(&table, &target, &[visible, hidden, missing]);

        let router = DistanceRouter::new(&table, DEFAULT_MAX_HOPS);
        let result = router.nearest_to(&target, addr(9000)).unwrap();

        assert_eq!(result, vec![visible]);
        // Querying the vantage's own identifier trims its cache.
        assert_eq!(neighbors_of(&table, &target), vec![visible]);
    }

    #[test]
    fn test_self_query_sorts_trims_and_links_back() {
        let table = LineTable::new();
        let target = add_line(&table, 9000, true);
        let peers: Vec<Identifier> = (9001..=9005).map(|p| add_line(&table, p, true)).collect();
        set_neighbors(&table, &target, &peers);

        let router = DistanceRouter::new(&table, DEFAULT_MAX_HOPS);
        let result = router.nearest_to(&target, addr(9000)).unwrap();

        let mut expected = peers.clone();
        expected.sort_by_key(|id| target.distance(id));
        assert_eq!(result, expected);
        assert!(result
            .windows(2)
            .all(|w| target.distance(&w[0]) <= target.distance(&w[1])));

        assert_eq!(neighbors_of(&table, &target), expected);
        for peer in &peers {
            assert!(neighbors_of(&table, peer).contains(&target));
        }
    }

    #[test]
    fn test_empty_neighbors_returns_empty() {
        let table = LineTable::new();
        let a = add_line(&table, 9000, true);
        let router = DistanceRouter::new(&table, DEFAULT_MAX_HOPS);

        assert!(router.nearest_to(&a, addr(9000)).unwrap().is_empty());
        let walk = router.walk(&a, addr(9000)).unwrap();
        assert_eq!(walk.vantage_end, Some(a));
        assert!(walk.settled);
    }

    #[test]
    fn test_walk_forwards_to_closer_vantage() {
        let table = LineTable::new();
        let ids: Vec<Identifier> = (9100..9140).map(|p| add_line(&table, p, true)).collect();
        let target = ids[0];

        let mut others: Vec<(Identifier, u16)> = ids[1..].iter().copied().zip(9101..9140).collect();
        others.sort_by_key(|(id, _)| target.distance(id));
        let (closer, _) = others[0];
        let (start, start_port) = others[others.len() - 1];
        assert!(target.distance(&closer) < target.distance(&start));

        // start -> closer -> target, and the target only knows `closer`.
        set_neighbors(&table, &start, &[closer]);
        set_neighbors(&table, &closer, &[target]);
        set_neighbors(&table, &target, &[closer]);

        let router = DistanceRouter::new(&table, DEFAULT_MAX_HOPS);
        let walk = router.walk(&target, addr(start_port)).unwrap();
        assert!(walk.settled);
        assert_eq!(walk.hops, 2);
        assert_eq!(walk.vantage_end, Some(target));
        assert_eq!(walk.candidates, vec![closer]);

        // The walk itself mutated nothing.
        assert_eq!(neighbors_of(&table, &start), vec![closer]);
    }

    #[test]
    fn test_walk_over_cyclic_neighbor_graph_terminates() {
        let table = LineTable::new();
        let ids: Vec<Identifier> = (9400..9410).map(|p| add_line(&table, p, true)).collect();
        // Every line lists every other line: the neighbor graph is full of
        // cycles.
        for id in &ids {
            let others: Vec<Identifier> = ids.iter().filter(|o| *o != id).copied().collect();
            set_neighbors(&table, id, &others);
        }

        let target = Identifier::of(&addr(9999));
        let router = DistanceRouter::new(&table, DEFAULT_MAX_HOPS);
        for port in 9400..9410 {
            let walk = router.walk(&target, addr(port)).unwrap();
            assert!(walk.settled);
            assert!(walk.hops < ids.len());
            let end = walk.vantage_end.unwrap();
            assert!(walk
                .candidates
                .iter()
                .all(|c| target.distance(c) >= target.distance(&end)));
        }
    }

    #[test]
    fn test_hop_limit_bounds_walk() {
        let table = LineTable::new();
        let start = add_line(&table, 9200, true);
        let target = add_line(&table, 9201, true);
        set_neighbors(&table, &start, &[target]);

        // Zero hops: the first forward is refused and the candidates of the
        // starting vantage are returned unsettled.
        let router = DistanceRouter::new(&table, 0);
        let walk = router.walk(&target, addr(9200)).unwrap();
        assert!(!walk.settled);
        assert_eq!(walk.candidates, vec![target]);
        assert_eq!(walk.hops, 0);
    }

    #[test]
    fn test_link_respects_neighbor_cap() {
        let table = LineTable::new();
        let target = add_line(&table, 9300, true);
        let peers: Vec<Identifier> = (9301..=9308).map(|p| add_line(&table, p, true)).collect();

        let router = DistanceRouter::new(&table, DEFAULT_MAX_HOPS);
        router.link(&target, &peers).unwrap();

        let cached = neighbors_of(&table, &target);
        assert_eq!(cached, peers[..NEIGHBOR_CAP].to_vec());
        for peer in &peers[NEIGHBOR_CAP..] {
            assert!(!neighbors_of(&table, peer).contains(&target));
        }
    }
}
