//! Column duty cycles and boost factors.
//!
//! Each column tracks a rolling estimate of how often it wins inhibition
//! (its active duty cycle). Columns that fall far behind their neighbourhood
//! get their proximal overlap multiplied by a boost factor so they re-enter
//! the competition, keeping column usage spread across the layer.

use crate::synapses::ColumnId;
use crate::topology::GridTopology;
use std::collections::BTreeSet;

/// Per-column duty-cycle estimates and boost factors.
#[derive(Debug, Clone)]
pub struct Boosting {
    duty_cycles: Vec<f32>,
    boosts: Vec<f32>,
}

impl Boosting {
    /// Fresh state: zero duty cycles, unit boosts.
    pub fn new(n_columns: usize) -> Self {
        Self {
            duty_cycles: vec![0.0; n_columns],
            boosts: vec![1.0; n_columns],
        }
    }

    /// Boost factor of one column, in [1, max_boost].
    #[inline]
    pub fn boost(&self, col: ColumnId) -> f32 {
        self.boosts[col]
    }

    /// Active duty cycle of one column.
    #[inline]
    pub fn duty_cycle(&self, col: ColumnId) -> f32 {
        self.duty_cycles[col]
    }

    /// Fold this step's active columns into the duty-cycle moving averages.
    ///
    /// The effective window ramps up with the timestep so early estimates
    /// settle quickly instead of crawling from zero.
    pub fn update_duty_cycles(
        &mut self,
        active_cols: &BTreeSet<ColumnId>,
        timestep: u64,
        period: u64,
    ) {
        let p = period.min(timestep).max(1) as f32;
        for (col, dc) in self.duty_cycles.iter_mut().enumerate() {
            let active = if active_cols.contains(&col) { 1.0 } else { 0.0 };
            *dc = (*dc * (p - 1.0) + active) / p;
        }
    }

    /// Recompute boost factors against each column's neighbourhood.
    ///
    /// A column whose duty cycle sits below `duty_ratio` times the
    /// neighbourhood maximum is boosted in proportion to its deficit, up to
    /// `max_boost`; everything else returns to 1.0.
    pub fn update_boosts(
        &mut self,
        topo: &GridTopology,
        inh_radius: usize,
        global: bool,
        max_boost: f32,
        duty_ratio: f32,
    ) {
        if max_boost <= 1.0 {
            self.boosts.fill(1.0);
            return;
        }

        let global_max = self
            .duty_cycles
            .iter()
            .fold(0.0_f32, |acc, &dc| acc.max(dc));

        for col in 0..self.boosts.len() {
            let neighbourhood_max = if global {
                global_max
            } else {
                topo.neighbours(col, inh_radius, 0)
                    .into_iter()
                    .map(|n| self.duty_cycles[n])
                    .fold(self.duty_cycles[col], f32::max)
            };

            let crit = duty_ratio * neighbourhood_max;
            self.boosts[col] = if crit > 0.0 && self.duty_cycles[col] < crit {
                (1.0 + (max_boost - 1.0) * (1.0 - self.duty_cycles[col] / crit))
                    .clamp(1.0, max_boost)
            } else {
                1.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_duty_cycle_moving_average() {
        let mut b = Boosting::new(2);
        let active: BTreeSet<ColumnId> = [0].into_iter().collect();

        // Ramp-up window: after one step with a window of 1, the estimate is
        // exactly the step's activity.
        b.update_duty_cycles(&active, 1, 1000);
        assert_relative_eq!(b.duty_cycle(0), 1.0);
        assert_relative_eq!(b.duty_cycle(1), 0.0);

        b.update_duty_cycles(&active, 2, 1000);
        assert_relative_eq!(b.duty_cycle(0), 1.0);

        let empty = BTreeSet::new();
        b.update_duty_cycles(&empty, 3, 1000);
        assert!(b.duty_cycle(0) < 1.0);
    }

    #[test]
    fn test_starved_column_boosts() {
        let mut b = Boosting::new(3);
        b.duty_cycles = vec![0.5, 0.0, 0.5];

        let topo = GridTopology::new(&[3]);
        b.update_boosts(&topo, 2, true, 1.5, 0.1);

        assert_relative_eq!(b.boost(0), 1.0);
        assert_relative_eq!(b.boost(2), 1.0);
        // Zero duty cycle against crit 0.05: full deficit, full boost.
        assert_relative_eq!(b.boost(1), 1.5);
    }

    #[test]
    fn test_boost_proportional_to_deficit() {
        let mut b = Boosting::new(2);
        b.duty_cycles = vec![1.0, 0.25];

        let topo = GridTopology::new(&[2]);
        b.update_boosts(&topo, 1, true, 2.0, 0.5);

        // crit = 0.5, deficit fraction = 0.5, boost = 1 + 1.0 * 0.5.
        assert_relative_eq!(b.boost(1), 1.5);
    }

    #[test]
    fn test_unit_max_boost_pins_boosts() {
        let mut b = Boosting::new(4);
        b.duty_cycles = vec![0.9, 0.0, 0.0, 0.0];

        let topo = GridTopology::new(&[4]);
        b.update_boosts(&topo, 2, true, 1.0, 0.5);

        assert!(b.boosts.iter().all(|&f| f == 1.0));
    }

    #[test]
    fn test_local_neighbourhood_limits_comparison() {
        let mut b = Boosting::new(5);
        // Column 4 is far from the busy column 0.
        b.duty_cycles = vec![0.9, 0.0, 0.0, 0.0, 0.0];

        let topo = GridTopology::new(&[5]);
        b.update_boosts(&topo, 1, false, 1.5, 0.5);

        // Column 1 sees the busy neighbour and boosts; column 4's
        // neighbourhood is all idle, so its crit is zero.
        assert!(b.boost(1) > 1.0);
        assert_relative_eq!(b.boost(4), 1.0);
    }
}
