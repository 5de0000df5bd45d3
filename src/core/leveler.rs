use crate::core::network::LevelingNetwork;
use crate::types::{LineCorrections, LineId, MagError, MagResult, SkipRecord};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the zero-fixed reference line is chosen per connected component.
///
/// The crossover system observes only differences, so each component is
/// rank-deficient by exactly one degree of freedom; one line per component
/// is pinned to correction 0 before the design matrix is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReferenceLinePolicy {
    /// Line with the most incident ties (smallest id breaks ties)
    MostTies,
    /// Line with the greatest along-track length
    LongestLine,
    /// Explicit line ids; each component must contain exactly one of them,
    /// otherwise the policy falls back to MostTies for that component
    Manual(Vec<LineId>),
}

/// Parameters for the leveling solve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelerParams {
    /// Solutions with weighted residual RMS above this (nT) are rejected
    pub residual_rms_threshold: f64,
    pub reference_policy: ReferenceLinePolicy,
}

impl Default for LevelerParams {
    fn default() -> Self {
        Self {
            residual_rms_threshold: 5.0,
            reference_policy: ReferenceLinePolicy::MostTies,
        }
    }
}

/// Outcome of the solve for one connected component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSolve {
    pub lines: Vec<LineId>,
    pub reference_line: Option<LineId>,
    /// Weighted residual RMS in nT; None when the component was not solved
    pub residual_rms: Option<f64>,
    /// Set when the component's leveling failed; its lines pass through
    /// uncorrected
    pub error: Option<String>,
}

/// Complete result of a leveling solve
#[derive(Debug, Clone)]
pub struct LevelingSolution {
    /// One additive correction per line; 0 for unleveled lines
    pub corrections: LineCorrections,
    pub component_solves: Vec<ComponentSolve>,
    /// Lines excluded from leveling, with reasons
    pub skipped: Vec<SkipRecord>,
}

/// Formulates and solves the weighted least-squares leveling adjustment.
///
/// For every tie (i, j, misfit, w) one row sqrt(w)·(c_j − c_i) = sqrt(w)·misfit
/// enters the design matrix, where misfit is line i's anomaly minus line
/// j's at the crossing; the solved corrections therefore cancel the
/// observed differences when added to each line's anomalies. The inner
/// "solve Ax ≈ b" is delegated to nalgebra via the normal equations.
pub struct LeastSquaresLeveler {
    params: LevelerParams,
}

impl LeastSquaresLeveler {
    pub fn new(params: LevelerParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(LevelerParams::default())
    }

    /// Solve the adjustment over the whole network. `line_lengths` (meters)
    /// feeds the LongestLine reference policy.
    ///
    /// Per-component failures are recorded in the solution, never
    /// propagated: lines of a failed component keep correction 0.
    pub fn solve(
        &self,
        network: &LevelingNetwork,
        line_lengths: &HashMap<LineId, f64>,
    ) -> LevelingSolution {
        let mut corrections: LineCorrections = network
            .components
            .iter()
            .flatten()
            .map(|&id| (id, 0.0))
            .collect();
        let mut component_solves = Vec::new();
        let mut skipped = Vec::new();

        for component in &network.components {
            if component.len() < 2 {
                log::debug!("line {:02}: isolated, correction stays 0", component[0]);
                skipped.push(SkipRecord {
                    line_id: component[0],
                    reason: "no crossover with any other line".to_string(),
                    start_time: None,
                    end_time: None,
                });
                component_solves.push(ComponentSolve {
                    lines: component.clone(),
                    reference_line: None,
                    residual_rms: None,
                    error: None,
                });
                continue;
            }

            match self.solve_component(network, component, line_lengths) {
                Ok((reference, values, rms)) => {
                    log::info!(
                        "component {:?}: solved, reference line {:02}, residual RMS {:.3} nT",
                        component,
                        reference,
                        rms
                    );
                    for (id, c) in values {
                        corrections.insert(id, c);
                    }
                    component_solves.push(ComponentSolve {
                        lines: component.clone(),
                        reference_line: Some(reference),
                        residual_rms: Some(rms),
                        error: None,
                    });
                }
                Err(e) => {
                    log::warn!("component {:?}: leveling rejected: {}", component, e);
                    for &id in component {
                        skipped.push(SkipRecord {
                            line_id: id,
                            reason: format!("component leveling failed: {}", e),
                            start_time: None,
                            end_time: None,
                        });
                    }
                    component_solves.push(ComponentSolve {
                        lines: component.clone(),
                        reference_line: None,
                        residual_rms: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        LevelingSolution {
            corrections,
            component_solves,
            skipped,
        }
    }

    /// Solve one component. Returns the reference line, the per-line
    /// corrections, and the weighted residual RMS.
    fn solve_component(
        &self,
        network: &LevelingNetwork,
        component: &[LineId],
        line_lengths: &HashMap<LineId, f64>,
    ) -> MagResult<(LineId, Vec<(LineId, f64)>, f64)> {
        let ties = network.ties_in_component(component);
        if ties.len() < component.len() - 1 {
            return Err(MagError::PoorlyConditionedNetwork(format!(
                "{} tie(s) cannot constrain {} lines",
                ties.len(),
                component.len()
            )));
        }

        let reference = self.select_reference(network, component, line_lengths);
        log::debug!(
            "component {:?}: reference line {:02} fixed at 0",
            component,
            reference
        );

        // Column index per free (non-reference) line
        let columns: HashMap<LineId, usize> = component
            .iter()
            .filter(|&&id| id != reference)
            .enumerate()
            .map(|(col, &id)| (id, col))
            .collect();

        let n_rows = ties.len();
        let n_vars = columns.len();
        let mut a = DMatrix::<f64>::zeros(n_rows, n_vars);
        let mut b = DVector::<f64>::zeros(n_rows);

        for (row, tie) in ties.iter().enumerate() {
            let sw = tie.weight.sqrt();
            // sqrt(w) * (c_b - c_a) = sqrt(w) * misfit
            if let Some(&col) = columns.get(&tie.line_b) {
                a[(row, col)] += sw;
            }
            if let Some(&col) = columns.get(&tie.line_a) {
                a[(row, col)] -= sw;
            }
            b[row] = sw * tie.misfit;
        }

        let ata = a.transpose() * &a;
        let atb = a.transpose() * &b;
        let x = match ata.clone().cholesky() {
            Some(chol) => chol.solve(&atb),
            None => ata.lu().solve(&atb).ok_or_else(|| {
                MagError::PoorlyConditionedNetwork(
                    "normal equations are singular".to_string(),
                )
            })?,
        };

        let residual = &a * &x - &b;
        let rms = (residual.norm_squared() / n_rows as f64).sqrt();
        if rms > self.params.residual_rms_threshold {
            return Err(MagError::PoorlyConditionedNetwork(format!(
                "residual RMS {:.3} nT exceeds threshold {:.3} nT",
                rms, self.params.residual_rms_threshold
            )));
        }

        let mut values = vec![(reference, 0.0)];
        for (&id, &col) in &columns {
            values.push((id, x[col]));
        }
        Ok((reference, values, rms))
    }

    fn select_reference(
        &self,
        network: &LevelingNetwork,
        component: &[LineId],
        line_lengths: &HashMap<LineId, f64>,
    ) -> LineId {
        match &self.params.reference_policy {
            ReferenceLinePolicy::MostTies => most_ties(network, component),
            ReferenceLinePolicy::LongestLine => component
                .iter()
                .copied()
                .max_by(|a, b| {
                    let la = line_lengths.get(a).copied().unwrap_or(0.0);
                    let lb = line_lengths.get(b).copied().unwrap_or(0.0);
                    la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(component[0]),
            ReferenceLinePolicy::Manual(ids) => {
                let matches: Vec<LineId> = component
                    .iter()
                    .copied()
                    .filter(|id| ids.contains(id))
                    .collect();
                match matches.as_slice() {
                    [only] => *only,
                    _ => {
                        log::warn!(
                            "manual reference policy names {} line(s) in component {:?}; falling back to most-ties",
                            matches.len(),
                            component
                        );
                        most_ties(network, component)
                    }
                }
            }
        }
    }
}

fn most_ties(network: &LevelingNetwork, component: &[LineId]) -> LineId {
    // component is sorted ascending; strict comparison keeps the smallest
    // id among equal degrees
    let mut best = component[0];
    let mut best_degree = network.degree(best);
    for &id in &component[1..] {
        let d = network.degree(id);
        if d > best_degree {
            best = id;
            best_degree = d;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::NetworkParams;
    use crate::types::Tie;
    use approx::assert_relative_eq;

    fn tie(a: LineId, b: LineId, misfit: f64, weight: f64) -> Tie {
        Tie {
            line_a: a,
            line_b: b,
            lat: 0.0,
            lon: 0.0,
            anomaly_a: 0.0,
            anomaly_b: 0.0,
            misfit,
            weight,
        }
    }

    fn solve(ties: Vec<Tie>, lines: &[LineId], params: LevelerParams) -> LevelingSolution {
        let network = LevelingNetwork::build(ties, lines, &NetworkParams::default());
        LeastSquaresLeveler::new(params).solve(&network, &HashMap::new())
    }

    #[test]
    fn test_consistent_triangle_exact_solution() {
        // (A,B,2), (B,C,3), (A,C,5) is exactly consistent: with A fixed at
        // 0 the solve must give B=2, C=5 with residual ~ 0
        let ties = vec![tie(0, 1, 2.0, 1.0), tie(1, 2, 3.0, 1.0), tie(0, 2, 5.0, 1.0)];
        let solution = solve(ties, &[0, 1, 2], LevelerParams::default());

        assert_relative_eq!(solution.corrections[&0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(solution.corrections[&1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(solution.corrections[&2], 5.0, epsilon = 1e-9);
        let rms = solution.component_solves[0].residual_rms.unwrap();
        assert!(rms < 1e-9, "expected near-zero residual, got {rms}");
    }

    #[test]
    fn test_zero_ties_leaves_corrections_at_zero() {
        let solution = solve(Vec::new(), &[0, 1, 2], LevelerParams::default());
        for id in 0..3 {
            assert_eq!(solution.corrections[&id], 0.0);
        }
        assert!(solution.component_solves.iter().all(|c| c.error.is_none()));
        assert_eq!(solution.skipped.len(), 3);
    }

    #[test]
    fn test_inconsistent_triangle_distributes_misfit() {
        // (A,B,2), (B,C,3), (A,C,6): closure error 1, spread by least squares
        let ties = vec![tie(0, 1, 2.0, 1.0), tie(1, 2, 3.0, 1.0), tie(0, 2, 6.0, 1.0)];
        let solution = solve(ties, &[0, 1, 2], LevelerParams::default());

        let b = solution.corrections[&1];
        let c = solution.corrections[&2];
        // Normal-equation solution of the 3-row system
        assert_relative_eq!(b, 7.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(c, 17.0 / 3.0, epsilon = 1e-9);
        assert!(solution.component_solves[0].residual_rms.unwrap() > 0.0);
    }

    #[test]
    fn test_residual_threshold_rejects_component() {
        let ties = vec![tie(0, 1, 2.0, 1.0), tie(1, 2, 3.0, 1.0), tie(0, 2, 50.0, 1.0)];
        let solution = solve(
            ties,
            &[0, 1, 2],
            LevelerParams {
                residual_rms_threshold: 0.1,
                reference_policy: ReferenceLinePolicy::MostTies,
            },
        );
        assert!(solution.component_solves[0].error.is_some());
        // Failed component passes through uncorrected
        for id in 0..3 {
            assert_eq!(solution.corrections[&id], 0.0);
        }
        assert_eq!(solution.skipped.len(), 3);
    }

    #[test]
    fn test_weights_bias_the_fit() {
        // Two contradictory ties between the same pair; the heavier one wins
        let ties = vec![tie(0, 1, 10.0, 1.0), tie(0, 1, 0.0, 0.01)];
        let solution = solve(
            ties,
            &[0, 1],
            LevelerParams {
                residual_rms_threshold: 100.0,
                reference_policy: ReferenceLinePolicy::MostTies,
            },
        );
        let b = solution.corrections[&1];
        // Weighted mean: (1.0*10 + 0.01*0) / 1.01
        assert_relative_eq!(b, 10.0 / 1.01, epsilon = 1e-9);
    }

    #[test]
    fn test_independent_components_solved_separately() {
        let ties = vec![tie(0, 1, 2.0, 1.0), tie(2, 3, -4.0, 1.0)];
        let solution = solve(ties, &[0, 1, 2, 3], LevelerParams::default());
        assert_relative_eq!(solution.corrections[&1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(solution.corrections[&3], -4.0, epsilon = 1e-9);
        assert_eq!(solution.component_solves.len(), 2);
    }

    #[test]
    fn test_longest_line_reference_policy() {
        let ties = vec![tie(0, 1, 2.0, 1.0)];
        let network = LevelingNetwork::build(ties, &[0, 1], &NetworkParams::default());
        let lengths: HashMap<LineId, f64> = [(0, 1_000.0), (1, 9_000.0)].into_iter().collect();
        let solution = LeastSquaresLeveler::new(LevelerParams {
            residual_rms_threshold: 5.0,
            reference_policy: ReferenceLinePolicy::LongestLine,
        })
        .solve(&network, &lengths);

        // Line 1 is the reference; line 0 absorbs the correction
        assert_eq!(solution.component_solves[0].reference_line, Some(1));
        assert_relative_eq!(solution.corrections[&1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(solution.corrections[&0], -2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_manual_reference_policy() {
        let ties = vec![tie(0, 1, 2.0, 1.0), tie(1, 2, 3.0, 1.0)];
        let solution = solve(
            ties,
            &[0, 1, 2],
            LevelerParams {
                residual_rms_threshold: 5.0,
                reference_policy: ReferenceLinePolicy::Manual(vec![1]),
            },
        );
        assert_eq!(solution.component_solves[0].reference_line, Some(1));
        assert_relative_eq!(solution.corrections[&1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(solution.corrections[&0], -2.0, epsilon = 1e-9);
        assert_relative_eq!(solution.corrections[&2], 3.0, epsilon = 1e-9);
    }
}
