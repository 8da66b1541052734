//! Argument graph — arena-indexed store of claims with support/oppose
//! edges, plus the consensus math that drives deliberation exits.
//!
//! Claims may form cycles through their edges, so nodes live in a flat
//! arena keyed by dense index with a side map from claim id to index.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use qm_domain::claim::{Claim, ClaimType};

/// Per-author voting stance, kept as a reporting field only; the score
/// that drives deliberation is edge-weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DominantStance {
    Maintain,
    Adjust,
    Defer,
    Dissent,
}

/// Consensus snapshot over the current graph.
#[derive(Debug, Clone)]
pub struct ConsensusResult {
    /// [0, 1]; higher = more agreement.
    pub overall_score: f64,
    pub by_type: BTreeMap<ClaimType, f64>,
    pub claim_count: usize,
    /// Max-urgency-driven pressure to speak, [0, 1].
    pub speaking_pressure: f64,
    pub dominant_stance: DominantStance,
    pub has_critical_urgency: bool,
    pub all_deferred: bool,
}

impl ConsensusResult {
    pub fn empty() -> Self {
        Self {
            overall_score: 1.0,
            by_type: BTreeMap::new(),
            claim_count: 0,
            speaking_pressure: 0.0,
            dominant_stance: DominantStance::Maintain,
            has_critical_urgency: false,
            all_deferred: false,
        }
    }
}

struct Node {
    claim: Claim,
    /// Arena indices of claims this one supports / opposes.
    supports: BTreeSet<usize>,
    opposes: BTreeSet<usize>,
    /// Reverse edges.
    supported_by: BTreeSet<usize>,
    opposed_by: BTreeSet<usize>,
}

/// Indexed set of claims with support/oppose edges.
#[derive(Default)]
pub struct ArgumentGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl ArgumentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, claim_id: &str) -> Option<&Claim> {
        self.index.get(claim_id).map(|&i| &self.nodes[i].claim)
    }

    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.nodes.iter().map(|n| &n.claim)
    }

    /// Add a claim. Idempotent by id: re-adding merges urgency and
    /// confidence upward and unions edge lists. Edges to ids not yet in
    /// the graph resolve when the target arrives.
    pub fn add(&mut self, claim: &Claim) {
        if let Some(&i) = self.index.get(&claim.id) {
            let node = &mut self.nodes[i];
            node.claim.urgency = node.claim.urgency.max(claim.urgency);
            node.claim.confidence = node.claim.confidence.max(claim.confidence);
            for s in &claim.supports {
                if !node.claim.supports.contains(s) {
                    node.claim.supports.push(s.clone());
                }
            }
            for o in &claim.opposes {
                if !node.claim.opposes.contains(o) {
                    node.claim.opposes.push(o.clone());
                }
            }
            self.rewire(i);
            return;
        }

        let i = self.nodes.len();
        self.nodes.push(Node {
            claim: claim.clone(),
            supports: BTreeSet::new(),
            opposes: BTreeSet::new(),
            supported_by: BTreeSet::new(),
            opposed_by: BTreeSet::new(),
        });
        self.index.insert(claim.id.clone(), i);

        self.rewire(i);
        // Older claims may reference this id; resolve those edges now.
        for j in 0..self.nodes.len() - 1 {
            self.rewire(j);
        }
    }

    /// Recompute outgoing edges of node `i` from its claim's id lists.
    fn rewire(&mut self, i: usize) {
        let (supports, opposes): (Vec<usize>, Vec<usize>) = {
            let claim = &self.nodes[i].claim;
            (
                claim
                    .supports
                    .iter()
                    .filter_map(|id| self.index.get(id).copied())
                    .filter(|&j| j != i)
                    .collect(),
                claim
                    .opposes
                    .iter()
                    .filter_map(|id| self.index.get(id).copied())
                    .filter(|&j| j != i)
                    .collect(),
            )
        };
        for j in supports {
            self.nodes[i].supports.insert(j);
            self.nodes[j].supported_by.insert(i);
        }
        for j in opposes {
            self.nodes[i].opposes.insert(j);
            self.nodes[j].opposed_by.insert(i);
        }
    }

    /// Ids of claims opposing `claim_id`.
    pub fn opposers(&self, claim_id: &str) -> Vec<&str> {
        self.index
            .get(claim_id)
            .map(|&i| {
                self.nodes[i]
                    .opposed_by
                    .iter()
                    .map(|&j| self.nodes[j].claim.id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of claims supporting `claim_id`.
    pub fn supporters(&self, claim_id: &str) -> Vec<&str> {
        self.index
            .get(claim_id)
            .map(|&i| {
                self.nodes[i]
                    .supported_by
                    .iter()
                    .map(|&j| self.nodes[j].claim.id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Weighted count of opposers: Σ urgency×confidence / 9 over claims
    /// opposing this one.
    pub fn opposition_strength(&self, claim_id: &str) -> f64 {
        self.index
            .get(claim_id)
            .map(|&i| {
                self.nodes[i]
                    .opposed_by
                    .iter()
                    .map(|&j| self.nodes[j].claim.weight())
                    .sum()
            })
            .unwrap_or(0.0)
    }

    /// Per-claim salience: weight × (1 − opposition), floored at zero.
    fn salience(&self, i: usize) -> f64 {
        let claim = &self.nodes[i].claim;
        let opposition = self.opposition_strength(&claim.id).min(1.0);
        claim.weight() * (1.0 - opposition)
    }

    /// Top-N claims by salience; ties break on id.
    pub fn top_claims(&self, n: usize) -> Vec<&Claim> {
        let mut ranked: Vec<(usize, f64)> = (0..self.nodes.len())
            .map(|i| (i, self.salience(i)))
            .collect();
        ranked.sort_by(|(ia, sa), (ib, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.nodes[*ia].claim.id.cmp(&self.nodes[*ib].claim.id))
        });
        ranked
            .into_iter()
            .take(n)
            .map(|(i, _)| &self.nodes[i].claim)
            .collect()
    }

    /// Claims under strong opposition that still carry real urgency.
    pub fn contested_claims(&self) -> Vec<&Claim> {
        self.nodes
            .iter()
            .filter(|n| n.claim.urgency >= 2 && self.opposition_strength(&n.claim.id) > 0.5)
            .map(|n| &n.claim)
            .collect()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Consensus
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Edge-weighted consensus: dissent weight D is the sum over oppose
    /// edges of min(urgency, confidence) of the opposing claim; S is the
    /// total claim weight; `overall = 1 − D / max(S, 1)`.
    pub fn consensus(&self) -> ConsensusResult {
        if self.nodes.is_empty() {
            return ConsensusResult::empty();
        }

        let total_weight: f64 = self
            .nodes
            .iter()
            .map(|n| f64::from(n.claim.urgency) * f64::from(n.claim.confidence))
            .sum();

        let dissent = |target_filter: &dyn Fn(&Claim) -> bool| -> f64 {
            let mut d = 0.0;
            for node in &self.nodes {
                for &j in &node.opposes {
                    if target_filter(&self.nodes[j].claim) {
                        d += f64::from(node.claim.urgency.min(node.claim.confidence));
                    }
                }
            }
            d
        };

        let score = |d: f64, s: f64| (1.0 - d / s.max(1.0)).clamp(0.0, 1.0);
        let overall_score = score(dissent(&|_| true), total_weight);

        let mut by_type = BTreeMap::new();
        for claim_type in [
            ClaimType::Observation,
            ClaimType::Recommendation,
            ClaimType::Concern,
            ClaimType::Question,
        ] {
            let type_weight: f64 = self
                .nodes
                .iter()
                .filter(|n| n.claim.claim_type == claim_type)
                .map(|n| f64::from(n.claim.urgency) * f64::from(n.claim.confidence))
                .sum();
            if type_weight > 0.0
                || self.nodes.iter().any(|n| n.claim.claim_type == claim_type)
            {
                by_type.insert(
                    claim_type,
                    score(dissent(&|c: &Claim| c.claim_type == claim_type), type_weight),
                );
            }
        }

        // Speaking pressure: max urgency dominates, average tempers it.
        let max_urgency = self.nodes.iter().map(|n| n.claim.urgency).max().unwrap_or(0);
        let avg_urgency: f64 = self
            .nodes
            .iter()
            .map(|n| f64::from(n.claim.urgency))
            .sum::<f64>()
            / self.nodes.len() as f64;
        let speaking_pressure =
            (f64::from(max_urgency) / 3.0 * 0.7) + (avg_urgency / 3.0 * 0.3);

        // Per-author stance votes (reporting only).
        let mut authors: BTreeMap<&str, (u8, bool, bool)> = BTreeMap::new();
        for node in &self.nodes {
            let entry = authors
                .entry(node.claim.source_agent.as_str())
                .or_insert((0, false, false));
            entry.0 = entry.0.max(node.claim.urgency);
            entry.1 |= !node.opposes.is_empty();
            entry.2 |= node.claim.claim_type == ClaimType::Recommendation;
        }
        let mut votes: BTreeMap<DominantStance, usize> = BTreeMap::new();
        let mut deferred = 0usize;
        for &(max_u, dissents, recommends) in authors.values() {
            let stance = if dissents {
                DominantStance::Dissent
            } else if max_u == 0 {
                deferred += 1;
                DominantStance::Defer
            } else if recommends {
                DominantStance::Adjust
            } else {
                DominantStance::Maintain
            };
            *votes.entry(stance).or_insert(0) += 1;
        }
        let dominant_stance = [
            DominantStance::Maintain,
            DominantStance::Adjust,
            DominantStance::Defer,
            DominantStance::Dissent,
        ]
        .into_iter()
        .max_by_key(|s| votes.get(s).copied().unwrap_or(0))
        .unwrap_or(DominantStance::Maintain);

        ConsensusResult {
            overall_score,
            by_type,
            claim_count: self.nodes.len(),
            speaking_pressure: speaking_pressure.clamp(0.0, 1.0),
            dominant_stance,
            has_critical_urgency: max_urgency >= 3,
            all_deferred: !authors.is_empty() && deferred == authors.len(),
        }
    }
}

// BTreeMap<DominantStance, _> needs Ord.
impl PartialOrd for DominantStance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DominantStance {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(s: DominantStance) -> u8 {
            match s {
                DominantStance::Maintain => 0,
                DominantStance::Adjust => 1,
                DominantStance::Defer => 2,
                DominantStance::Dissent => 3,
            }
        }
        rank(*self).cmp(&rank(*other))
    }
}
